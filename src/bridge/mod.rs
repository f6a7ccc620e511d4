//! # Call Bridge
//!
//! Per-call orchestration between the telephony media stream and the
//! realtime AI service.

pub mod orchestrator;  // SessionBridge event loop
pub mod session;       // CallSession and transcript turns

pub use orchestrator::{BridgeEvent, BridgeServices, SessionBridge};
