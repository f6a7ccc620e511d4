//! # Tools
//!
//! Function calls the AI can make during a call. The dispatcher owns the
//! closed set of tool kinds; the activity client talks to the tracking
//! backend; the schema list is what the AI is told about.

pub mod activity;    // Activity-tracking backend client
pub mod dispatcher;  // ToolCall parsing and dispatch
pub mod schema;      // Tool schemas for session.update

pub use activity::HttpActivityTracker;
pub use dispatcher::{ToolDispatcher, ToolResult};
pub use schema::{tool_schemas, ToolSchema};
