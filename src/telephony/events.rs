//! Media-stream events exchanged with the telephony provider.
//!
//! Inbound frames are JSON objects discriminated by `event`; field names are
//! camelCase on the wire.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Custom parameter carrying the caller id, set by the webhook markup.
pub const CALLER_PARAMETER: &str = "From";

/// Caller id used when the provider did not pass one.
pub const UNKNOWN_CALLER: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStart {
    pub stream_sid: String,
    #[serde(default)]
    pub call_sid: String,
    #[serde(default)]
    pub custom_parameters: HashMap<String, String>,
}

impl StreamStart {
    pub fn caller_id(&self) -> String {
        self.custom_parameters
            .get(CALLER_PARAMETER)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .unwrap_or(UNKNOWN_CALLER)
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MediaPayload {
    /// Base64 audio in the negotiated codec, passed through untouched
    pub payload: String,
}

/// Frames received from the provider.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyEvent {
    Connected,
    Start { start: StreamStart },
    Media { media: MediaPayload },
    Mark,
    Stop,
    #[serde(other)]
    Other,
}

impl TelephonyEvent {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// What the bridge asks the socket actor to do.
#[derive(Debug, Clone, PartialEq)]
pub enum TelephonyOutbound {
    /// Send agent audio to the caller
    Media { stream_sid: String, payload: String },
    /// Close the media stream
    Close,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutboundMediaFrame<'a> {
    event: &'static str,
    stream_sid: &'a str,
    media: OutboundMedia<'a>,
}

#[derive(Serialize)]
struct OutboundMedia<'a> {
    payload: &'a str,
}

/// Serialize an outbound audio frame.
pub fn media_frame(stream_sid: &str, payload: &str) -> Result<String, serde_json::Error> {
    serde_json::to_string(&OutboundMediaFrame {
        event: "media",
        stream_sid,
        media: OutboundMedia { payload },
    })
}
