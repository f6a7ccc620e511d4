//! # Caller History Store
//!
//! Append-only history per caller: conversation summaries and free-text
//! updates. The bridge only ever appends and asks for "the most recent"
//! summary; the dashboard API reads whole sequences.
//!
//! ## On-disk layout:
//! ```text
//! <data_dir>/conversations/<digits>.jsonl   one SummaryRecord per line
//! <data_dir>/logs/<digits>.jsonl            one UpdateEntry per line
//! ```
//! The file key is the caller id with everything but digits removed, so
//! `+1 (555) 000-0000` and `15550000000` share a history.

use crate::history::records::{SummaryRecord, UpdateCategory, UpdateEntry};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Read/append access to caller history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append_summary(&self, record: &SummaryRecord) -> Result<()>;

    /// All summaries for a caller, oldest first.
    async fn summaries(&self, caller_id: &str) -> Result<Vec<SummaryRecord>>;

    /// All updates for a caller, oldest first.
    async fn updates(&self, caller_id: &str) -> Result<Vec<UpdateEntry>>;

    /// The last summary appended for a caller.
    async fn latest_summary(&self, caller_id: &str) -> Result<Option<SummaryRecord>> {
        Ok(self.summaries(caller_id).await?.pop())
    }
}

/// Destination for `recordUpdate` tool calls.
#[async_trait]
pub trait UpdateSink: Send + Sync {
    async fn record_update(&self, caller_id: &str, update: &str, category: UpdateCategory) -> Result<()>;
}

/// Reduce a caller id to the key used for its history files.
pub fn caller_key(caller_id: &str) -> String {
    let digits: String = caller_id.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        "unknown".to_string()
    } else {
        digits
    }
}

/// JSON-lines history under a data directory.
#[derive(Debug, Clone)]
pub struct JsonlHistoryStore {
    root: PathBuf,
}

impl JsonlHistoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn conversations_file(&self, caller_id: &str) -> PathBuf {
        self.root
            .join("conversations")
            .join(format!("{}.jsonl", caller_key(caller_id)))
    }

    fn updates_file(&self, caller_id: &str) -> PathBuf {
        self.root.join("logs").join(format!("{}.jsonl", caller_key(caller_id)))
    }
}

async fn append_line<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
    }

    let mut line = serde_json::to_string(value)?;
    line.push('\n');

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    // One write per record keeps concurrent appends from interleaving
    file.write_all(line.as_bytes())
        .await
        .with_context(|| format!("appending to {}", path.display()))?;
    file.flush().await?;
    Ok(())
}

async fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err).with_context(|| format!("reading {}", path.display())),
    };

    let mut records = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(record) => records.push(record),
            Err(err) => warn!(
                file = %path.display(),
                line = index + 1,
                error = %err,
                "Skipping malformed history line"
            ),
        }
    }
    Ok(records)
}

#[async_trait]
impl HistoryStore for JsonlHistoryStore {
    async fn append_summary(&self, record: &SummaryRecord) -> Result<()> {
        let path = self.conversations_file(&record.phone);
        append_line(&path, record).await?;
        debug!(file = %path.display(), "Summary appended");
        Ok(())
    }

    async fn summaries(&self, caller_id: &str) -> Result<Vec<SummaryRecord>> {
        read_lines(&self.conversations_file(caller_id)).await
    }

    async fn updates(&self, caller_id: &str) -> Result<Vec<UpdateEntry>> {
        read_lines(&self.updates_file(caller_id)).await
    }
}

#[async_trait]
impl UpdateSink for JsonlHistoryStore {
    async fn record_update(&self, caller_id: &str, update: &str, category: UpdateCategory) -> Result<()> {
        let entry = UpdateEntry {
            timestamp: Utc::now(),
            phone: caller_id.to_string(),
            category,
            update: update.to_string(),
        };
        append_line(&self.updates_file(caller_id), &entry).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::records::Sentiment;
    use chrono::Duration;

    fn record(phone: &str, summary: &str, hours_ago: i64) -> SummaryRecord {
        SummaryRecord {
            timestamp: Utc::now() - Duration::hours(hours_ago),
            phone: phone.to_string(),
            duration_seconds: 60,
            summary: summary.to_string(),
            key_topics: vec!["sleep".to_string()],
            concerns_raised: vec![],
            action_items: vec![],
            sentiment: Sentiment::Positive,
        }
    }

    #[test]
    fn test_caller_key() {
        assert_eq!(caller_key("+1 (555) 000-0000"), "15550000000");
        assert_eq!(caller_key("unknown"), "unknown");
        assert_eq!(caller_key(""), "unknown");
    }

    #[tokio::test]
    async fn test_latest_summary_is_last_appended() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlHistoryStore::new(dir.path());

        assert!(store.latest_summary("+15550000").await.unwrap().is_none());

        store.append_summary(&record("+15550000", "first", 10)).await.unwrap();
        store.append_summary(&record("+15550000", "second", 1)).await.unwrap();
        store.append_summary(&record("+15559999", "other caller", 0)).await.unwrap();

        let latest = store.latest_summary("+15550000").await.unwrap().unwrap();
        assert_eq!(latest.summary, "second");
        assert_eq!(store.summaries("15550000").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlHistoryStore::new(dir.path());
        store.append_summary(&record("+15550000", "kept", 2)).await.unwrap();

        let path = dir.path().join("conversations").join("15550000.jsonl");
        let mut contents = std::fs::read_to_string(&path).unwrap();
        contents.push_str("{not json\n\n");
        std::fs::write(&path, contents).unwrap();

        let all = store.summaries("+15550000").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].summary, "kept");
    }

    #[tokio::test]
    async fn test_record_update_appends_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlHistoryStore::new(dir.path());

        store
            .record_update("+15550000", "Rolled over for the first time", UpdateCategory::Milestone)
            .await
            .unwrap();

        let updates = store.updates("+15550000").await.unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].category, UpdateCategory::Milestone);
        assert_eq!(updates[0].update, "Rolled over for the first time");
    }
}
