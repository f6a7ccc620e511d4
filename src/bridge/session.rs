//! # Call Session
//!
//! Per-call state owned by exactly one `SessionBridge`. Nothing outside the
//! bridge's own task can reach it, so no locking is involved.
//!
//! ## Lifecycle:
//! ```text
//! Waiting ──start()──▶ Live ──finalize()──▶ Closed
//!    └───────────────finalize()──────────────┘
//! ```
//! Once closed, the transcript is handed off and never touched again.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::telephony::events::UNKNOWN_CALLER;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Caller,
    Agent,
}

impl Speaker {
    /// Label used when the transcript is rendered for summarization.
    pub fn label(&self) -> &'static str {
        match self {
            Speaker::Caller => "CALLER",
            Speaker::Agent => "AGENT",
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptTurn {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptTurn {
    pub fn new(speaker: Speaker, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self { speaker, text: text.into(), timestamp }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Waiting,
    Live,
    Closed,
}

/// What is left of a call once it has been finalized.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedCall {
    pub caller_id: String,
    pub duration_seconds: u64,
    pub transcript: Vec<TranscriptTurn>,
}

#[derive(Debug)]
pub struct CallSession {
    caller_id: String,
    stream_sid: Option<String>,
    call_sid: Option<String>,
    started_at: Option<DateTime<Utc>>,
    transcript: Vec<TranscriptTurn>,
    state: SessionState,
}

impl Default for CallSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CallSession {
    pub fn new() -> Self {
        Self {
            caller_id: UNKNOWN_CALLER.to_string(),
            stream_sid: None,
            call_sid: None,
            started_at: None,
            transcript: Vec::new(),
            state: SessionState::Waiting,
        }
    }

    /// Record the provider identifiers. Only the first start is accepted.
    pub fn start(
        &mut self,
        stream_sid: impl Into<String>,
        call_sid: impl Into<String>,
        caller_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> bool {
        if self.state != SessionState::Waiting {
            return false;
        }
        self.stream_sid = Some(stream_sid.into());
        self.call_sid = Some(call_sid.into());
        self.caller_id = caller_id.into();
        self.started_at = Some(now);
        self.state = SessionState::Live;
        true
    }

    /// Append a completed utterance in arrival order. Blank text is skipped.
    pub fn record(&mut self, speaker: Speaker, text: &str, now: DateTime<Utc>) -> bool {
        let text = text.trim();
        if text.is_empty() || self.state == SessionState::Closed {
            return false;
        }
        self.transcript.push(TranscriptTurn::new(speaker, text, now));
        true
    }

    /// Close the session. Returns the call for summarization when it has both
    /// a start time and at least one turn; later calls always return `None`.
    pub fn finalize(&mut self, now: DateTime<Utc>) -> Option<FinishedCall> {
        if self.state == SessionState::Closed {
            return None;
        }
        self.state = SessionState::Closed;

        let started_at = self.started_at?;
        if self.transcript.is_empty() {
            return None;
        }

        let duration_seconds = (now - started_at).num_seconds().max(0) as u64;
        Some(FinishedCall {
            caller_id: self.caller_id.clone(),
            duration_seconds,
            transcript: std::mem::take(&mut self.transcript),
        })
    }

    pub fn caller_id(&self) -> &str {
        &self.caller_id
    }

    pub fn stream_sid(&self) -> Option<&str> {
        self.stream_sid.as_deref()
    }

    pub fn call_sid(&self) -> Option<&str> {
        self.call_sid.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    pub fn transcript(&self) -> &[TranscriptTurn] {
        &self.transcript
    }
}
