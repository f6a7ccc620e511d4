//! # Session Bridge
//!
//! One `SessionBridge` per phone call. It owns the call's `CallSession` and
//! consumes a single queue of `BridgeEvent`s, which is the only way anything
//! reaches it:
//!
//! ```text
//! telephony actor ──Telephony/TelephonyClosed──┐
//! AI reader task  ──AiConnected/Ai/AiClosed────┤
//! context task    ──ContextResolved────────────┼──▶ SessionBridge::run
//! tool tasks      ──ToolFinished───────────────┘
//! ```
//!
//! Slow work (connecting, context fetches, tool dispatch, summarization) runs
//! in spawned tasks that report back through the same queue, so audio relay
//! never waits on it.
//!
//! ## AI connection phases:
//! ```text
//! Idle ─start─▶ Connecting ─connected─▶ Configuring ─session.updated─▶ Ready
//!                                                                        │
//!                       (either side closes) ─────────────────────────▶ Closed
//! ```
//! Caller audio is only forwarded in `Ready`. The first `response.create` is
//! only sent once the context task has resolved, after the context items.

use crate::bridge::session::{CallSession, Speaker};
use crate::context::{ContextLoader, InjectedContext};
use crate::history::UpdateSink;
use crate::realtime::{AiConnection, ClientEvent, RealtimeConnector, ServerEvent, SessionConfig};
use crate::state::{CallGuard, SharedMetrics};
use crate::summarizer::Summarizer;
use crate::telephony::events::{StreamStart, TelephonyEvent, TelephonyOutbound};
use crate::tools::{ToolDispatcher, ToolResult};
use chrono::Utc;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, trace, warn};

/// Collaborators shared by every bridge.
pub struct BridgeServices {
    pub dispatcher: Arc<ToolDispatcher>,
    pub context: Arc<ContextLoader>,
    pub summarizer: Arc<Summarizer>,
    pub updates: Arc<dyn UpdateSink>,
    pub connector: Arc<dyn RealtimeConnector>,
    pub session_config: SessionConfig,
}

/// A function call received from the AI service and not yet answered.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTool {
    pub call_id: String,
    pub name: String,
    pub arguments: String,
}

/// Everything that can happen to a call.
#[derive(Debug)]
pub enum BridgeEvent {
    Telephony(TelephonyEvent),
    TelephonyClosed,
    AiConnected(UnboundedSender<ClientEvent>),
    AiConnectFailed(String),
    Ai(ServerEvent),
    AiClosed,
    ContextResolved(InjectedContext),
    ToolFinished {
        call: PendingTool,
        result: ToolResult,
        elapsed: Duration,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Which side ended the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseCause {
    ProviderStop,
    TelephonyClosed,
    AiClosed,
    AiUnreachable,
}

enum AiPhase {
    Idle,
    Connecting,
    Configuring(UnboundedSender<ClientEvent>),
    Ready(UnboundedSender<ClientEvent>),
    Closed,
}

impl AiPhase {
    fn link(&self) -> Option<&UnboundedSender<ClientEvent>> {
        match self {
            AiPhase::Configuring(link) | AiPhase::Ready(link) => Some(link),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            AiPhase::Idle => "idle",
            AiPhase::Connecting => "connecting",
            AiPhase::Configuring(_) => "configuring",
            AiPhase::Ready(_) => "ready",
            AiPhase::Closed => "closed",
        }
    }
}

pub struct SessionBridge {
    session: CallSession,
    services: Arc<BridgeServices>,
    metrics: SharedMetrics,
    telephony: Option<UnboundedSender<TelephonyOutbound>>,
    events: UnboundedSender<BridgeEvent>,
    ai: AiPhase,
    context_requested: bool,
    /// Set once context is injected and the first `response.create` is out
    first_turn_sent: bool,
    /// In-flight call ids, each with duplicates queued behind it
    tools_in_flight: HashMap<String, VecDeque<PendingTool>>,
    dropped_frames: u64,
    _slot: Option<CallGuard>,
}

impl SessionBridge {
    /// `events` must feed the receiver later passed to `run`; spawned tasks
    /// report back through it.
    pub fn new(
        services: Arc<BridgeServices>,
        metrics: SharedMetrics,
        slot: Option<CallGuard>,
        telephony: UnboundedSender<TelephonyOutbound>,
        events: UnboundedSender<BridgeEvent>,
    ) -> Self {
        Self {
            session: CallSession::new(),
            services,
            metrics,
            telephony: Some(telephony),
            events,
            ai: AiPhase::Idle,
            context_requested: false,
            first_turn_sent: false,
            tools_in_flight: HashMap::new(),
            dropped_frames: 0,
            _slot: slot,
        }
    }

    /// Process events until the call ends.
    pub async fn run(mut self, mut events: UnboundedReceiver<BridgeEvent>) {
        // `self.events` keeps the queue open, so only `Flow::Stop` ends the loop
        while let Some(event) = events.recv().await {
            if self.handle(event) == Flow::Stop {
                break;
            }
        }
        debug!(caller = %self.session.caller_id(), "Bridge finished");
    }

    pub fn handle(&mut self, event: BridgeEvent) -> Flow {
        match event {
            BridgeEvent::Telephony(event) => self.on_telephony(event),
            BridgeEvent::TelephonyClosed => {
                info!(caller = %self.session.caller_id(), "Media stream disconnected");
                self.shutdown(CloseCause::TelephonyClosed)
            }
            BridgeEvent::AiConnected(link) => {
                self.on_ai_connected(link);
                Flow::Continue
            }
            BridgeEvent::AiConnectFailed(reason) => {
                error!(caller = %self.session.caller_id(), error = %reason, "Could not connect to realtime service");
                self.shutdown(CloseCause::AiUnreachable)
            }
            BridgeEvent::Ai(event) => {
                self.on_ai_event(event);
                Flow::Continue
            }
            BridgeEvent::AiClosed => {
                error!(caller = %self.session.caller_id(), phase = self.ai.name(), "Realtime connection ended");
                self.shutdown(CloseCause::AiClosed)
            }
            BridgeEvent::ContextResolved(context) => {
                self.on_context_resolved(context);
                Flow::Continue
            }
            BridgeEvent::ToolFinished { call, result, elapsed } => {
                self.on_tool_finished(call, result, elapsed);
                Flow::Continue
            }
        }
    }

    fn on_telephony(&mut self, event: TelephonyEvent) -> Flow {
        match event {
            TelephonyEvent::Start { start } => self.on_stream_start(start),
            TelephonyEvent::Media { media } => self.relay_audio_inbound(media.payload),
            TelephonyEvent::Stop => {
                info!(caller = %self.session.caller_id(), "Provider stopped the stream");
                return self.shutdown(CloseCause::ProviderStop);
            }
            TelephonyEvent::Connected => debug!("Media stream connected"),
            TelephonyEvent::Mark => trace!("Mark event"),
            TelephonyEvent::Other => trace!("Ignoring telephony event"),
        }
        Flow::Continue
    }

    fn on_stream_start(&mut self, start: StreamStart) {
        let caller_id = start.caller_id();
        if !self.session.start(&start.stream_sid, &start.call_sid, &caller_id, Utc::now()) {
            warn!(stream_sid = %start.stream_sid, "Duplicate start event ignored");
            return;
        }
        info!(
            stream_sid = %start.stream_sid,
            call_sid = %start.call_sid,
            caller = %caller_id,
            "Stream started"
        );
        self.open_ai_connection();
    }

    fn open_ai_connection(&mut self) {
        self.ai = AiPhase::Connecting;
        let connector = self.services.connector.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            let AiConnection { outbound, mut inbound } = match connector.connect().await {
                Ok(connection) => connection,
                Err(err) => {
                    let _ = events.send(BridgeEvent::AiConnectFailed(format!("{:#}", err)));
                    return;
                }
            };
            if events.send(BridgeEvent::AiConnected(outbound)).is_err() {
                return;
            }
            while let Some(event) = inbound.recv().await {
                if events.send(BridgeEvent::Ai(event)).is_err() {
                    return;
                }
            }
            let _ = events.send(BridgeEvent::AiClosed);
        });
    }

    fn on_ai_connected(&mut self, link: UnboundedSender<ClientEvent>) {
        if !matches!(self.ai, AiPhase::Connecting) {
            debug!(phase = self.ai.name(), "Late AI connection dropped");
            return;
        }
        let update = ClientEvent::SessionUpdate {
            session: self.services.session_config.clone(),
        };
        if link.send(update).is_err() {
            warn!("Realtime writer gone before session.update");
        }
        self.ai = AiPhase::Configuring(link);
        debug!(caller = %self.session.caller_id(), "Session configuration sent");
    }

    fn on_ai_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::SessionCreated => debug!("Realtime session created"),
            ServerEvent::SessionUpdated => self.on_ai_ready(),
            ServerEvent::AudioDelta { delta } => self.relay_audio_outbound(delta),
            ServerEvent::AudioTranscriptDelta => {}
            ServerEvent::AudioTranscriptDone { transcript } => {
                self.record_turn(Speaker::Agent, &transcript)
            }
            ServerEvent::InputTranscriptionCompleted { transcript } => {
                self.record_turn(Speaker::Caller, &transcript)
            }
            ServerEvent::FunctionCallArgumentsDone { name, arguments, call_id } => {
                self.on_tool_call(PendingTool { call_id, name, arguments })
            }
            ServerEvent::SpeechStarted => debug!("Caller started speaking"),
            ServerEvent::SpeechStopped => debug!("Caller stopped speaking"),
            ServerEvent::OutputInterrupted => debug!("Agent response interrupted"),
            ServerEvent::ItemTruncated => debug!("Agent item truncated"),
            ServerEvent::ResponseDone => trace!("Response done"),
            ServerEvent::Error { error } => warn!(
                caller = %self.session.caller_id(),
                kind = ?error.kind,
                code = ?error.code,
                message = %error.message,
                "Realtime service reported an error"
            ),
            ServerEvent::Unknown => trace!("Ignoring realtime event"),
        }
    }

    fn on_ai_ready(&mut self) {
        let link = match std::mem::replace(&mut self.ai, AiPhase::Idle) {
            AiPhase::Configuring(link) | AiPhase::Ready(link) => link,
            other => {
                self.ai = other;
                warn!(phase = self.ai.name(), "session.updated outside configuration");
                return;
            }
        };
        self.ai = AiPhase::Ready(link);
        if self.dropped_frames > 0 {
            debug!(frames = self.dropped_frames, "Dropped caller audio before session was ready");
        }

        if self.context_requested {
            return;
        }
        self.context_requested = true;
        info!(caller = %self.session.caller_id(), "Realtime session ready, loading context");

        let context = self.services.context.clone();
        let caller_id = self.session.caller_id().to_string();
        let events = self.events.clone();
        tokio::spawn(async move {
            let loaded = context.load(&caller_id).await;
            let _ = events.send(BridgeEvent::ContextResolved(loaded));
        });
    }

    fn on_context_resolved(&mut self, context: InjectedContext) {
        let AiPhase::Ready(link) = &self.ai else {
            debug!("Context resolved after the AI connection closed");
            return;
        };

        let mut sent = true;
        for text in context.items() {
            sent &= link.send(ClientEvent::system_message(text)).is_ok();
        }
        sent &= link.send(ClientEvent::ResponseCreate).is_ok();
        self.first_turn_sent = true;
        if !sent {
            warn!("Realtime writer gone while injecting context");
        }
        info!(
            caller = %self.session.caller_id(),
            activity = context.activity.is_some(),
            recall = context.recall.is_some(),
            "Context injected, first response requested"
        );
    }

    fn relay_audio_inbound(&mut self, payload: String) {
        match &self.ai {
            AiPhase::Ready(link) => {
                let _ = link.send(ClientEvent::InputAudioAppend { audio: payload });
            }
            _ => self.dropped_frames += 1,
        }
    }

    fn relay_audio_outbound(&mut self, delta: String) {
        let (Some(telephony), Some(stream_sid)) = (&self.telephony, self.session.stream_sid()) else {
            return;
        };
        let frame = TelephonyOutbound::Media {
            stream_sid: stream_sid.to_string(),
            payload: delta,
        };
        if telephony.send(frame).is_err() {
            trace!("Telephony socket no longer writable");
        }
    }

    fn record_turn(&mut self, speaker: Speaker, text: &str) {
        if self.session.record(speaker, text, Utc::now()) {
            debug!(speaker = %speaker, text = %text.trim(), "Transcript turn");
        }
    }

    fn on_tool_call(&mut self, call: PendingTool) {
        info!(
            caller = %self.session.caller_id(),
            tool = %call.name,
            call_id = %call.call_id,
            "Tool call received"
        );
        match self.tools_in_flight.entry(call.call_id.clone()) {
            Entry::Occupied(mut queued) => {
                warn!(call_id = %call.call_id, "Call id already in flight, queueing");
                queued.get_mut().push_back(call);
            }
            Entry::Vacant(slot) => {
                slot.insert(VecDeque::new());
                self.spawn_tool(call);
            }
        }
    }

    fn spawn_tool(&self, call: PendingTool) {
        let dispatcher = self.services.dispatcher.clone();
        let updates = self.services.updates.clone();
        let caller_id = self.session.caller_id().to_string();
        let events = self.events.clone();

        tokio::spawn(async move {
            let started = Instant::now();
            let result = dispatcher
                .dispatch_named(&call.name, &call.arguments, &caller_id, Some(updates.as_ref()))
                .await;
            let elapsed = started.elapsed();
            if events.send(BridgeEvent::ToolFinished { call, result, elapsed }).is_err() {
                debug!("Tool finished after the call ended, result discarded");
            }
        });
    }

    fn on_tool_finished(&mut self, call: PendingTool, result: ToolResult, elapsed: Duration) {
        self.metrics.record_tool_call(&call.name, elapsed, result.success);
        info!(
            tool = %call.name,
            call_id = %call.call_id,
            success = result.success,
            elapsed_ms = elapsed.as_millis() as u64,
            "Tool call finished"
        );

        match self.ai.link() {
            Some(link) => {
                let output = link.send(ClientEvent::function_output(&call.call_id, &result));
                // Before context is in, the first turn request belongs to on_context_resolved
                let next_turn = if self.first_turn_sent {
                    link.send(ClientEvent::ResponseCreate)
                } else {
                    debug!(call_id = %call.call_id, "Holding turn request until context is injected");
                    Ok(())
                };
                if output.is_err() || next_turn.is_err() {
                    warn!(call_id = %call.call_id, "Realtime writer gone, tool result lost");
                }
            }
            None => debug!(call_id = %call.call_id, "No AI connection, tool result discarded"),
        }

        let next = self
            .tools_in_flight
            .get_mut(&call.call_id)
            .and_then(|queued| queued.pop_front());
        match next {
            Some(next) => self.spawn_tool(next),
            None => {
                self.tools_in_flight.remove(&call.call_id);
            }
        }
    }

    /// Close both sides and hand the transcript to the summarizer.
    fn shutdown(&mut self, cause: CloseCause) -> Flow {
        if self.session.is_closed() {
            return Flow::Stop;
        }

        // Dropping the sender closes the realtime socket
        self.ai = AiPhase::Closed;
        if cause != CloseCause::TelephonyClosed {
            if let Some(telephony) = self.telephony.take() {
                let _ = telephony.send(TelephonyOutbound::Close);
            }
        }
        self.telephony = None;

        let finished = self.session.finalize(Utc::now());
        info!(
            caller = %self.session.caller_id(),
            call_sid = self.session.call_sid().unwrap_or_default(),
            cause = ?cause,
            pending_tools = self.tools_in_flight.len(),
            "Call ended"
        );

        if let Some(finished) = finished {
            let summarizer = self.services.summarizer.clone();
            let metrics = self.metrics.clone();
            tokio::spawn(async move {
                match summarizer
                    .summarize(&finished.transcript, &finished.caller_id, finished.duration_seconds)
                    .await
                {
                    Ok(saved) => metrics.record_summary(saved.is_some()),
                    Err(err) => {
                        warn!(caller = %finished.caller_id, error = %format!("{:#}", err), "Conversation summary skipped");
                        metrics.record_summary(false);
                    }
                }
            });
        }

        Flow::Stop
    }
}
