//! Realtime AI service: protocol events and the websocket client.

pub mod client;  // Websocket connection split into typed channels
pub mod events;  // ClientEvent / ServerEvent

pub use client::{AiConnection, RealtimeClient, RealtimeConnector};
pub use events::{ClientEvent, ServerEvent, SessionConfig};
