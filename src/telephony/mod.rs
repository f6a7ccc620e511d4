//! # Telephony
//!
//! The provider-facing side of a call: the setup webhook and the per-call
//! media stream socket.

pub mod events;   // Media stream frames in both directions
pub mod socket;   // MediaStreamSocket actor and /media-stream endpoint
pub mod webhook;  // /incoming-call markup

pub use socket::media_stream;
pub use webhook::incoming_call;
