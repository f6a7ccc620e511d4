//! # Caller History
//!
//! Append-only per-caller records: one summary per finished call and one
//! entry per `recordUpdate` tool call.

pub mod records;  // SummaryRecord, UpdateEntry and their enums
pub mod store;    // HistoryStore / UpdateSink traits and the JSONL implementation

pub use records::{Sentiment, SummaryRecord, UpdateCategory, UpdateEntry};
pub use store::{HistoryStore, JsonlHistoryStore, UpdateSink};
