//! Records persisted in a caller's history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Overall mood of a finished call, as judged by the summarizer.
///
/// Words outside the known set are read as `Neutral`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Sentiment {
    Positive,
    Neutral,
    Worried,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Worried => "worried",
        }
    }
}

impl From<String> for Sentiment {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "positive" => Sentiment::Positive,
            "worried" => Sentiment::Worried,
            _ => Sentiment::Neutral,
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The structured outcome of one finished call.
///
/// Appended once at teardown and never rewritten. Field names match the JSON
/// shape requested from the summarization service so the dashboard can read
/// the history files directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub timestamp: DateTime<Utc>,
    pub phone: String,
    pub duration_seconds: u64,
    pub summary: String,
    #[serde(default)]
    pub key_topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub concerns_raised: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub action_items: Vec<String>,
    pub sentiment: Sentiment,
}

/// Kind of free-text update a parent shared during a call.
///
/// Anything the AI sends outside the known set is filed as `General` rather
/// than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum UpdateCategory {
    Development,
    Milestone,
    Concern,
    General,
}

impl From<String> for UpdateCategory {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" => UpdateCategory::Development,
            "milestone" => UpdateCategory::Milestone,
            "concern" => UpdateCategory::Concern,
            _ => UpdateCategory::General,
        }
    }
}

impl Default for UpdateCategory {
    fn default() -> Self {
        UpdateCategory::General
    }
}

/// One `recordUpdate` tool call, as written to the caller's update log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateEntry {
    pub timestamp: DateTime<Utc>,
    pub phone: String,
    pub category: UpdateCategory,
    pub update: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentiment_parsing() {
        let parsed: Sentiment = serde_json::from_str("\"Worried\"").unwrap();
        assert_eq!(parsed, Sentiment::Worried);
        let parsed: Sentiment = serde_json::from_str("\"ecstatic\"").unwrap();
        assert_eq!(parsed, Sentiment::Neutral);
        assert_eq!(serde_json::to_string(&Sentiment::Positive).unwrap(), "\"positive\"");
    }

    #[test]
    fn test_unknown_category_falls_back_to_general() {
        let parsed: UpdateCategory = serde_json::from_str("\"health\"").unwrap();
        assert_eq!(parsed, UpdateCategory::General);
        let parsed: UpdateCategory = serde_json::from_str("\"milestone\"").unwrap();
        assert_eq!(parsed, UpdateCategory::Milestone);
    }

    #[test]
    fn test_empty_concerns_are_omitted() {
        let record = SummaryRecord {
            timestamp: Utc::now(),
            phone: "+15550000".to_string(),
            duration_seconds: 45,
            summary: "Quick check-in.".to_string(),
            key_topics: vec!["sleep".to_string()],
            concerns_raised: vec![],
            action_items: vec![],
            sentiment: Sentiment::Neutral,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("concerns_raised").is_none());
        assert!(json.get("action_items").is_none());

        let back: SummaryRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
