//! # Media Stream WebSocket
//!
//! The telephony provider connects to `/media-stream` once per call and keeps
//! the socket open for the call's whole duration.
//!
//! ## Actor Model:
//! Each connection is a `MediaStreamSocket` actor. The actor does no call
//! logic of its own; it is the socket end of a `SessionBridge`:
//! - inbound text frames are parsed and forwarded to the bridge as `BridgeEvent::Telephony`
//! - `TelephonyOutbound` values from the bridge arrive as an actor stream and
//!   become outbound frames (or a close)
//! - when the actor stops for any reason the bridge is told `TelephonyClosed`
//!
//! ## Protocol faults:
//! A frame that is not valid JSON, or not a known shape, is logged and
//! dropped. The call continues.

use crate::bridge::{BridgeEvent, BridgeServices, SessionBridge};
use crate::error::AppError;
use crate::state::{AppState, CallGuard, SharedMetrics};
use crate::telephony::events::{media_frame, TelephonyEvent, TelephonyOutbound};

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// How often the idle timer checks for silence
const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Everything the bridge task needs, held until the actor starts.
struct PendingBridge {
    bridge: SessionBridge,
    events: UnboundedReceiver<BridgeEvent>,
    outbound: UnboundedReceiver<TelephonyOutbound>,
}

pub struct MediaStreamSocket {
    /// Sender into the bridge's event queue
    bridge: UnboundedSender<BridgeEvent>,
    pending: Option<PendingBridge>,
    stream_sid: Option<String>,
    last_frame: Instant,
    idle_timeout: Duration,
}

impl MediaStreamSocket {
    pub fn new(
        services: Arc<BridgeServices>,
        metrics: SharedMetrics,
        slot: CallGuard,
        idle_timeout: Duration,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let bridge = SessionBridge::new(services, metrics, Some(slot), outbound_tx, events_tx.clone());

        Self {
            bridge: events_tx,
            pending: Some(PendingBridge {
                bridge,
                events: events_rx,
                outbound: outbound_rx,
            }),
            stream_sid: None,
            last_frame: Instant::now(),
            idle_timeout,
        }
    }

    fn forward(&self, event: BridgeEvent) {
        if self.bridge.send(event).is_err() {
            debug!("Bridge already finished, dropping telephony event");
        }
    }

    fn on_text(&mut self, text: &str) {
        match TelephonyEvent::parse(text) {
            Ok(event) => {
                if let TelephonyEvent::Start { start } = &event {
                    self.stream_sid = Some(start.stream_sid.clone());
                }
                self.forward(BridgeEvent::Telephony(event));
            }
            Err(err) => warn!(error = %err, "Ignoring malformed media stream frame"),
        }
    }
}

impl Actor for MediaStreamSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let call_id = Uuid::new_v4();
        info!(%call_id, "Media stream connection opened");

        if let Some(pending) = self.pending.take() {
            let span = info_span!("call", %call_id);
            tokio::spawn(pending.bridge.run(pending.events).instrument(span));
            ctx.add_stream(UnboundedReceiverStream::new(pending.outbound));
        }

        ctx.run_interval(IDLE_CHECK_INTERVAL, |act, ctx| {
            if act.last_frame.elapsed() > act.idle_timeout {
                error!(
                    stream_sid = act.stream_sid.as_deref().unwrap_or("-"),
                    idle_secs = act.idle_timeout.as_secs(),
                    "Media stream went silent, closing"
                );
                ctx.stop();
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!(stream_sid = self.stream_sid.as_deref().unwrap_or("-"), "Media stream connection closed");
        self.forward(BridgeEvent::TelephonyClosed);
    }
}

/// Frames from the provider.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for MediaStreamSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        self.last_frame = Instant::now();

        match msg {
            Ok(ws::Message::Text(text)) => self.on_text(&text),
            Ok(ws::Message::Binary(data)) => {
                warn!(bytes = data.len(), "Ignoring binary media stream frame");
            }
            Ok(ws::Message::Ping(data)) => ctx.pong(&data),
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Close(reason)) => {
                info!(?reason, "Provider closed the media stream");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(error = %err, "Media stream protocol error");
                ctx.stop();
            }
        }
    }
}

/// Instructions from the bridge.
impl StreamHandler<TelephonyOutbound> for MediaStreamSocket {
    fn handle(&mut self, msg: TelephonyOutbound, ctx: &mut Self::Context) {
        match msg {
            TelephonyOutbound::Media { stream_sid, payload } => match media_frame(&stream_sid, &payload) {
                Ok(frame) => ctx.text(frame),
                Err(err) => warn!(error = %err, "Could not encode media frame"),
            },
            TelephonyOutbound::Close => {
                debug!("Bridge requested media stream close");
                ctx.close(Some(ws::CloseCode::Normal.into()));
                ctx.stop();
            }
        }
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        // The bridge dropped its sender, so the call is over
        ctx.stop();
    }
}

/// WebSocket endpoint handler for `GET /media-stream`.
///
/// Claims a call slot before upgrading; when every slot is taken the provider
/// gets a 503 and the call is never bridged.
pub async fn media_stream(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    let max_calls = state.config.server.max_concurrent_calls;
    let Some(slot) = state.metrics.begin_call(max_calls) else {
        warn!(max_calls, "Refusing media stream, bridge at capacity");
        return Err(AppError::Unavailable(format!("all {} call slots are in use", max_calls)).into());
    };

    info!(peer = ?req.connection_info().peer_addr(), "Media stream connection request");
    let socket = MediaStreamSocket::new(
        state.services.clone(),
        state.metrics.clone(),
        slot,
        Duration::from_secs(state.config.telephony.idle_timeout_secs),
    );

    ws::start(socket, &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use actix_web::{http::StatusCode, test, App};

    fn state_with_cap(max_calls: usize) -> AppState {
        let mut config = AppConfig::default();
        config.server.max_concurrent_calls = max_calls;
        AppState::build(config).unwrap()
    }

    #[actix_web::test]
    async fn test_rejects_when_at_capacity() {
        let state = state_with_cap(1);
        let _busy = state.metrics.begin_call(1).unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/media-stream", web::get().to(media_stream)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/media-stream").to_request()).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(state.metrics.snapshot().calls_rejected, 1);
    }

    #[actix_web::test]
    async fn test_failed_upgrade_releases_slot() {
        let state = state_with_cap(1);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/media-stream", web::get().to(media_stream)),
        )
        .await;

        // No upgrade headers, so the handshake fails after the slot was claimed
        let resp = test::call_service(&app, test::TestRequest::get().uri("/media-stream").to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.metrics.active_calls(), 0);
    }
}
