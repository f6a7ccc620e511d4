//! In-memory fakes for the async-trait seams, shared by unit tests.

use crate::history::{HistoryStore, SummaryRecord, UpdateCategory, UpdateEntry, UpdateSink};
use crate::history::store::caller_key;
use crate::realtime::{AiConnection, ClientEvent, RealtimeConnector, ServerEvent};
use crate::summarizer::{SummaryClient, SummaryPayload};
use crate::tools::activity::{ActivityReply, ActivityRequest, ActivityTracker};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// History kept in vectors; caller ids are compared by their digits.
#[derive(Default)]
pub struct MemoryHistory {
    summaries: Mutex<Vec<SummaryRecord>>,
    updates: Mutex<Vec<UpdateEntry>>,
    read_delay: Option<Duration>,
}

impl MemoryHistory {
    /// Make summary reads take `delay`.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    pub fn push_summary(&self, record: SummaryRecord) {
        self.summaries.lock().unwrap().push(record);
    }

    pub fn summaries_for(&self, caller_id: &str) -> Vec<SummaryRecord> {
        let key = caller_key(caller_id);
        self.summaries
            .lock()
            .unwrap()
            .iter()
            .filter(|record| caller_key(&record.phone) == key)
            .cloned()
            .collect()
    }

    pub fn update_entries(&self) -> Vec<UpdateEntry> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn append_summary(&self, record: &SummaryRecord) -> Result<()> {
        self.push_summary(record.clone());
        Ok(())
    }

    async fn summaries(&self, caller_id: &str) -> Result<Vec<SummaryRecord>> {
        if let Some(delay) = self.read_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.summaries_for(caller_id))
    }

    async fn updates(&self, caller_id: &str) -> Result<Vec<UpdateEntry>> {
        let key = caller_key(caller_id);
        Ok(self
            .update_entries()
            .into_iter()
            .filter(|entry| caller_key(&entry.phone) == key)
            .collect())
    }
}

#[async_trait]
impl UpdateSink for MemoryHistory {
    async fn record_update(&self, caller_id: &str, update: &str, category: UpdateCategory) -> Result<()> {
        self.updates.lock().unwrap().push(UpdateEntry {
            timestamp: Utc::now(),
            phone: caller_id.to_string(),
            category,
            update: update.to_string(),
        });
        Ok(())
    }
}

/// Activity tracker that answers every request the same way.
pub struct ScriptedTracker {
    reply: std::result::Result<ActivityReply, String>,
    delay: Option<Duration>,
    requests: Mutex<Vec<ActivityRequest>>,
}

impl ScriptedTracker {
    pub fn succeeding() -> Self {
        Self::with_reply(Ok(ActivityReply { success: true, message: None, data: None }))
    }

    pub fn replying(message: &str) -> Self {
        Self::with_reply(Ok(ActivityReply {
            success: true,
            message: Some(message.to_string()),
            data: None,
        }))
    }

    pub fn failing(error: &str) -> Self {
        Self::with_reply(Err(error.to_string()))
    }

    fn with_reply(reply: std::result::Result<ActivityReply, String>) -> Self {
        Self { reply, delay: None, requests: Mutex::new(Vec::new()) }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<ActivityRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActivityTracker for ScriptedTracker {
    async fn submit(&self, request: ActivityRequest) -> Result<ActivityReply> {
        self.requests.lock().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply.clone().map_err(|err| anyhow!(err))
    }
}

/// Summary client that records every transcript it is given.
pub struct RecordingSummaryClient {
    reply: std::result::Result<SummaryPayload, String>,
    transcripts: Mutex<Vec<String>>,
}

impl RecordingSummaryClient {
    pub fn replying(payload: SummaryPayload) -> Self {
        Self { reply: Ok(payload), transcripts: Mutex::new(Vec::new()) }
    }

    pub fn failing(error: &str) -> Self {
        Self { reply: Err(error.to_string()), transcripts: Mutex::new(Vec::new()) }
    }

    pub fn transcripts(&self) -> Vec<String> {
        self.transcripts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SummaryClient for RecordingSummaryClient {
    async fn summarize(&self, transcript: &str) -> Result<SummaryPayload> {
        self.transcripts.lock().unwrap().push(transcript.to_string());
        self.reply.clone().map_err(|err| anyhow!(err))
    }
}

/// The test's end of a fake AI connection.
pub struct FakeAiPeer {
    pub from_bridge: UnboundedReceiver<ClientEvent>,
    pub to_bridge: UnboundedSender<ServerEvent>,
}

/// Connector that hands each new connection's far end to the test.
pub struct FakeConnector {
    peers: Option<UnboundedSender<FakeAiPeer>>,
}

impl FakeConnector {
    pub fn new() -> (Self, UnboundedReceiver<FakeAiPeer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { peers: Some(tx) }, rx)
    }

    pub fn unreachable() -> Self {
        Self { peers: None }
    }
}

#[async_trait]
impl RealtimeConnector for FakeConnector {
    async fn connect(&self) -> Result<AiConnection> {
        let peers = self.peers.as_ref().ok_or_else(|| anyhow!("connection refused"))?;
        let (outbound, from_bridge) = mpsc::unbounded_channel();
        let (to_bridge, inbound) = mpsc::unbounded_channel();
        peers
            .send(FakeAiPeer { from_bridge, to_bridge })
            .map_err(|_| anyhow!("test dropped the peer receiver"))?;
        Ok(AiConnection { outbound, inbound })
    }
}
