//! # Activity Tracker Client
//!
//! Request/response client for the baby activity-tracking backend. Every call
//! is a single HTTP exchange; nothing here retries. Failures come back as
//! `Err` and the dispatcher turns them into a negative tool result.
//!
//! ## Backend routes:
//! - `POST /log-sleep`, `/log-feeding`, `/log-diaper`, `/log-activity`, `/log-growth`
//! - `GET /recent-activity?hours=N`
//!
//! All of them answer `{"success": bool, "message": str, "data"?: any}`; errors
//! answer with a non-2xx status and `{"detail": str}`.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// One request to the activity backend.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityRequest {
    LogSleep { duration_minutes: f64, notes: String },
    LogFeeding { amount_oz: f64, feeding_type: String, notes: String },
    LogDiaper { diaper_type: String, notes: String },
    LogActivity { activity: String, notes: String },
    LogGrowth { weight_lbs: Option<f64>, height_in: Option<f64>, head_in: Option<f64> },
    RecentActivity { hours: u32 },
}

impl ActivityRequest {
    /// Route path relative to the backend base URL.
    pub fn path(&self) -> &'static str {
        match self {
            ActivityRequest::LogSleep { .. } => "/log-sleep",
            ActivityRequest::LogFeeding { .. } => "/log-feeding",
            ActivityRequest::LogDiaper { .. } => "/log-diaper",
            ActivityRequest::LogActivity { .. } => "/log-activity",
            ActivityRequest::LogGrowth { .. } => "/log-growth",
            ActivityRequest::RecentActivity { .. } => "/recent-activity",
        }
    }

    /// JSON body for the logging routes; `None` for the query route.
    pub fn body(&self) -> Option<Value> {
        match self {
            ActivityRequest::LogSleep { duration_minutes, notes } => Some(json!({
                "duration_minutes": duration_minutes.round() as i64,
                "notes": notes,
            })),
            ActivityRequest::LogFeeding { amount_oz, feeding_type, notes } => Some(json!({
                "amount_oz": amount_oz,
                "feeding_type": feeding_type,
                "notes": notes,
            })),
            ActivityRequest::LogDiaper { diaper_type, notes } => Some(json!({
                "diaper_type": diaper_type,
                "notes": notes,
            })),
            ActivityRequest::LogActivity { activity, notes } => Some(json!({
                "activity": activity,
                "notes": notes,
            })),
            ActivityRequest::LogGrowth { weight_lbs, height_in, head_in } => Some(json!({
                "weight_lbs": weight_lbs,
                "height_in": height_in,
                "head_in": head_in,
            })),
            ActivityRequest::RecentActivity { .. } => None,
        }
    }
}

/// Reply body shared by every backend route.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ActivityReply {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

fn default_success() -> bool {
    true
}

impl ActivityReply {
    /// Human-readable text for the reply, using `fallback` when the backend
    /// sent no message. Non-empty `data` is appended below the message.
    pub fn describe(&self, fallback: &str) -> String {
        let mut text = match self.message.as_deref().map(str::trim) {
            Some(message) if !message.is_empty() => message.to_string(),
            _ if self.success => fallback.to_string(),
            _ => "The activity tracker could not complete the request".to_string(),
        };

        match &self.data {
            None | Some(Value::Null) => {}
            Some(Value::Object(map)) if map.is_empty() => {}
            Some(Value::Array(items)) if items.is_empty() => {}
            Some(Value::String(extra)) => {
                text.push('\n');
                text.push_str(extra);
            }
            Some(other) => {
                text.push('\n');
                text.push_str(&serde_json::to_string_pretty(other).unwrap_or_default());
            }
        }

        text
    }
}

/// The activity-tracking backend as seen by the dispatcher.
#[async_trait]
pub trait ActivityTracker: Send + Sync {
    async fn submit(&self, request: ActivityRequest) -> Result<ActivityReply>;
}

/// HTTP implementation backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpActivityTracker {
    client: reqwest::Client,
    base_url: String,
}

impl HttpActivityTracker {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("building activity tracker HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ActivityTracker for HttpActivityTracker {
    async fn submit(&self, request: ActivityRequest) -> Result<ActivityReply> {
        let url = format!("{}{}", self.base_url, request.path());
        debug!(url = %url, "Calling activity tracker");

        let builder = match (&request, request.body()) {
            (ActivityRequest::RecentActivity { hours }, _) => {
                self.client.get(&url).query(&[("hours", hours)])
            }
            (_, Some(body)) => self.client.post(&url).json(&body),
            (_, None) => self.client.post(&url),
        };

        let response = builder
            .send()
            .await
            .with_context(|| format!("activity tracker unreachable at {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
                .unwrap_or(body);
            return Err(anyhow!("activity tracker returned {}: {}", status.as_u16(), detail));
        }

        response
            .json::<ActivityReply>()
            .await
            .context("activity tracker sent an unreadable reply")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_body_rounds_minutes() {
        let request = ActivityRequest::LogSleep { duration_minutes: 89.6, notes: String::new() };
        assert_eq!(request.path(), "/log-sleep");
        assert_eq!(request.body().unwrap()["duration_minutes"], 90);
    }

    #[test]
    fn test_recent_activity_has_no_body() {
        let request = ActivityRequest::RecentActivity { hours: 24 };
        assert_eq!(request.path(), "/recent-activity");
        assert!(request.body().is_none());
    }

    #[test]
    fn test_describe_prefers_backend_message() {
        let reply = ActivityReply {
            success: true,
            message: Some("Logged 90 minute sleep for Valya".to_string()),
            data: None,
        };
        assert_eq!(reply.describe("Sleep logged successfully"), "Logged 90 minute sleep for Valya");
    }

    #[test]
    fn test_describe_falls_back_and_appends_data() {
        let reply = ActivityReply { success: true, message: None, data: Some(json!({})) };
        assert_eq!(reply.describe("Sleep logged successfully"), "Sleep logged successfully");

        let reply = ActivityReply {
            success: true,
            message: Some("Recent activity for Valya".to_string()),
            data: Some(json!("3 naps, 6 feeds")),
        };
        assert_eq!(reply.describe("unused"), "Recent activity for Valya\n3 naps, 6 feeds");
    }

    #[test]
    fn test_reply_defaults() {
        let reply: ActivityReply = serde_json::from_str("{}").unwrap();
        assert!(reply.success);
        let reply: ActivityReply = serde_json::from_str(r#"{"success": false}"#).unwrap();
        assert_eq!(reply.describe("ok"), "The activity tracker could not complete the request");
    }
}
