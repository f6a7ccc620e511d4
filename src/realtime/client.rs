//! # Realtime Service Connection
//!
//! Opens the authenticated websocket to the AI service and turns it into a
//! pair of typed channels. The socket itself is split into two tasks:
//!
//! ```text
//! bridge ──ClientEvent──▶ writer task ──Text──▶ AI service
//! bridge ◀──ServerEvent── reader task ◀──Text── AI service
//! ```
//!
//! Dropping the outbound sender closes the socket. The inbound channel ends
//! when the service closes the socket or a transport error occurs; the bridge
//! treats that end as a transport fault.

use crate::realtime::events::{ClientEvent, ServerEvent};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// A live connection to the AI service, as seen by the bridge.
#[derive(Debug)]
pub struct AiConnection {
    pub outbound: mpsc::UnboundedSender<ClientEvent>,
    pub inbound: mpsc::UnboundedReceiver<ServerEvent>,
}

/// Opens AI-service connections, one per call.
#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    async fn connect(&self) -> Result<AiConnection>;
}

/// `tokio-tungstenite` connector for the OpenAI realtime endpoint.
#[derive(Debug, Clone)]
pub struct RealtimeClient {
    url: String,
    api_key: String,
}

impl RealtimeClient {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self { url: url.into(), api_key: api_key.into() }
    }
}

#[async_trait]
impl RealtimeConnector for RealtimeClient {
    async fn connect(&self) -> Result<AiConnection> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .with_context(|| format!("invalid realtime URL {}", self.url))?;

        let headers = request.headers_mut();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .context("API key is not a valid header value")?,
        );
        headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        let (socket, _response) = tokio_tungstenite::connect_async(request)
            .await
            .with_context(|| format!("connecting to {}", self.url))?;
        info!(url = %self.url, "Connected to realtime service");

        let (mut sink, mut source) = socket.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ClientEvent>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<ServerEvent>();

        tokio::spawn(async move {
            while let Some(event) = outbound_rx.recv().await {
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(error = %err, "Dropping unserializable realtime event");
                        continue;
                    }
                };
                if let Err(err) = sink.send(Message::Text(text)).await {
                    error!(error = %err, "Realtime socket write failed");
                    break;
                }
            }
            // Sender dropped or write failed; either way the connection is done
            let _ = sink.close().await;
            debug!("Realtime writer finished");
        });

        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => match ServerEvent::parse(&text) {
                        Ok(event) => {
                            if inbound_tx.send(event).is_err() {
                                break;
                            }
                        }
                        Err(err) => warn!(error = %err, "Ignoring malformed realtime event"),
                    },
                    Ok(Message::Close(frame)) => {
                        info!(?frame, "Realtime service closed the connection");
                        break;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        error!(error = %err, "Realtime socket read failed");
                        break;
                    }
                }
            }
            debug!("Realtime reader finished");
        });

        Ok(AiConnection {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_rejects_bad_url() {
        let client = RealtimeClient::new("not a url", "sk-test");
        let err = client.connect().await.unwrap_err();
        assert!(format!("{:#}", err).contains("invalid realtime URL"));
    }
}
