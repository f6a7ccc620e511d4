//! # Context Loader
//!
//! Gathers the two pieces of background the agent gets before it speaks:
//! a recent-activity summary from the tracking backend and the caller's last
//! conversation, if it is recent enough.
//!
//! Both fetches are best-effort. A failure is logged and the piece is simply
//! absent; the bridge always gets an answer and always proceeds to the first
//! turn.

use crate::history::store::caller_key;
use crate::history::{HistoryStore, SummaryRecord};
use crate::telephony::events::UNKNOWN_CALLER;
use crate::tools::ToolDispatcher;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A prior conversation young enough to mention in the greeting.
#[derive(Debug, Clone, PartialEq)]
pub struct RecalledConversation {
    pub record: SummaryRecord,
    pub hours_since: f64,
}

/// System texts to inject, in injection order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InjectedContext {
    pub activity: Option<String>,
    pub recall: Option<String>,
}

impl InjectedContext {
    /// Texts in the order they must reach the AI service.
    pub fn items(&self) -> impl Iterator<Item = &str> {
        self.activity.iter().chain(self.recall.iter()).map(String::as_str)
    }
}

pub struct ContextLoader {
    dispatcher: Arc<ToolDispatcher>,
    history: Arc<dyn HistoryStore>,
    lookback_hours: u32,
    recall_max_age: Duration,
}

impl ContextLoader {
    pub fn new(
        dispatcher: Arc<ToolDispatcher>,
        history: Arc<dyn HistoryStore>,
        lookback_hours: u32,
        recall_max_age_hours: i64,
    ) -> Self {
        Self {
            dispatcher,
            history,
            lookback_hours,
            recall_max_age: Duration::hours(recall_max_age_hours),
        }
    }

    /// Fetch both pieces concurrently and format them for injection.
    pub async fn load(&self, caller_id: &str) -> InjectedContext {
        let (activity, recall) = tokio::join!(
            self.load_recent_activity(self.lookback_hours, caller_id),
            self.load_recent_conversation(caller_id),
        );

        InjectedContext {
            activity: activity.map(|summary| format_activity_context(&summary)),
            recall: recall.map(|recalled| format_recall_context(&recalled)),
        }
    }

    /// Recent-activity summary through the dispatcher's query tool.
    pub async fn load_recent_activity(&self, hours: u32, caller_id: &str) -> Option<String> {
        let result = self.dispatcher.recent_activity(hours, caller_id).await;
        if result.success && !result.message.trim().is_empty() {
            info!(caller = %caller_id, hours, "Recent activity context loaded");
            Some(result.message)
        } else {
            warn!(caller = %caller_id, message = %result.message, "Recent activity unavailable");
            None
        }
    }

    /// The caller's last conversation, if one exists and is fresh enough.
    pub async fn load_recent_conversation(&self, caller_id: &str) -> Option<RecalledConversation> {
        if caller_key(caller_id) == UNKNOWN_CALLER {
            debug!("No caller id, skipping conversation recall");
            return None;
        }

        let record = match self.history.latest_summary(caller_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(caller = %caller_id, "No previous conversation");
                return None;
            }
            Err(err) => {
                warn!(caller = %caller_id, error = %format!("{:#}", err), "Could not read conversation history");
                return None;
            }
        };

        let recalled = recall_if_fresh(record, Utc::now(), self.recall_max_age);
        match &recalled {
            Some(found) => info!(caller = %caller_id, hours_since = found.hours_since, "Recalling last conversation"),
            None => debug!(caller = %caller_id, "Last conversation too old to recall"),
        }
        recalled
    }
}

/// Keep `record` only if it is no older than `max_age` at `now`.
pub fn recall_if_fresh(
    record: SummaryRecord,
    now: DateTime<Utc>,
    max_age: Duration,
) -> Option<RecalledConversation> {
    let age = (now - record.timestamp).max(Duration::zero());
    if age > max_age {
        return None;
    }
    Some(RecalledConversation {
        record,
        hours_since: age.num_seconds() as f64 / 3600.0,
    })
}

pub fn format_activity_context(summary: &str) -> String {
    format!(
        "Context about the baby's recent activity:\n{}\n\nUse this information to provide personalized responses and insights during the conversation.",
        summary
    )
}

pub fn format_recall_context(recalled: &RecalledConversation) -> String {
    let record = &recalled.record;
    let topics = if record.key_topics.is_empty() {
        "none".to_string()
    } else {
        record.key_topics.join(", ")
    };

    let mut lines = vec![
        format!("Last conversation ({:.0} hours ago):", recalled.hours_since),
        record.summary.clone(),
        format!("Topics discussed: {}", topics),
    ];
    if !record.concerns_raised.is_empty() {
        lines.push(format!("Concerns raised: {}", record.concerns_raised.join(", ")));
    }
    if !record.action_items.is_empty() {
        lines.push(format!("Follow up on: {}", record.action_items.join(", ")));
    }
    lines.push("Reference this naturally in your greeting if relevant.".to_string());

    lines.retain(|line| !line.is_empty());
    lines.join("\n")
}
