//! # Tool Dispatcher
//!
//! Turns a function call issued by the AI mid-conversation into either a call
//! to the activity tracker or a local update write, and always answers with a
//! `ToolResult`. Nothing in here returns an error to the bridge: unknown tool
//! names, bad arguments and backend failures all become `success: false`
//! results the AI can talk its way around.

use crate::history::{UpdateCategory, UpdateSink};
use crate::tools::activity::{ActivityRequest, ActivityTracker};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of one tool invocation, serialized verbatim as the
/// `function_call_output` sent back to the AI service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub message: String,
}

impl ToolResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into() }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogSleepArgs {
    pub duration_minutes: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum FeedingType {
    Bottle,
    Nursing,
}

impl From<String> for FeedingType {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "nursing" | "breast" | "breastfeeding" | "breast_feeding" => FeedingType::Nursing,
            _ => FeedingType::Bottle,
        }
    }
}

impl FeedingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedingType::Bottle => "bottle",
            FeedingType::Nursing => "nursing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogFeedingArgs {
    #[serde(default)]
    pub amount_oz: Option<f64>,
    #[serde(default)]
    pub feeding_type: Option<FeedingType>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Diaper contents. Parents say "wet" and "dirty"; the tracker wants pee/poo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum DiaperMode {
    Pee,
    Poo,
    Both,
    Dry,
}

impl TryFrom<String> for DiaperMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pee" | "wet" => Ok(DiaperMode::Pee),
            "poo" | "poop" | "dirty" => Ok(DiaperMode::Poo),
            "both" | "mixed" => Ok(DiaperMode::Both),
            "dry" => Ok(DiaperMode::Dry),
            other => Err(format!("unknown diaper mode '{}'", other)),
        }
    }
}

impl DiaperMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiaperMode::Pee => "pee",
            DiaperMode::Poo => "poo",
            DiaperMode::Both => "both",
            DiaperMode::Dry => "dry",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogDiaperArgs {
    pub mode: DiaperMode,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogActivityArgs {
    pub activity: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogGrowthArgs {
    #[serde(default)]
    pub weight_lbs: Option<f64>,
    #[serde(default)]
    pub height_in: Option<f64>,
    #[serde(default)]
    pub head_in: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecentActivityArgs {
    #[serde(default = "default_lookback_hours")]
    pub hours: u32,
}

fn default_lookback_hours() -> u32 {
    24
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecordUpdateArgs {
    pub update: String,
    #[serde(default)]
    pub category: UpdateCategory,
}

/// Every tool the AI may call, each with its typed arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    LogSleep(LogSleepArgs),
    LogFeeding(LogFeedingArgs),
    LogDiaper(LogDiaperArgs),
    LogActivity(LogActivityArgs),
    LogGrowth(LogGrowthArgs),
    GetRecentActivity(RecentActivityArgs),
    RecordUpdate(RecordUpdateArgs),
}

/// Why a function-call event could not be turned into a `ToolCall`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolParseError {
    UnknownTool(String),
    InvalidArguments { tool: String, reason: String },
}

impl fmt::Display for ToolParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolParseError::UnknownTool(name) => write!(f, "Unknown function: {}", name),
            ToolParseError::InvalidArguments { tool, reason } => {
                write!(f, "Invalid arguments for {}: {}", tool, reason)
            }
        }
    }
}

impl std::error::Error for ToolParseError {}

fn parse_args<T: DeserializeOwned>(tool: &str, arguments: &str) -> Result<T, ToolParseError> {
    // The service sends "" rather than "{}" for argument-less calls
    let raw = if arguments.trim().is_empty() { "{}" } else { arguments };
    serde_json::from_str(raw).map_err(|err| ToolParseError::InvalidArguments {
        tool: tool.to_string(),
        reason: err.to_string(),
    })
}

impl ToolCall {
    pub const LOG_SLEEP: &'static str = "logSleep";
    pub const LOG_FEEDING: &'static str = "logFeeding";
    pub const LOG_DIAPER: &'static str = "logDiaper";
    pub const LOG_ACTIVITY: &'static str = "logActivity";
    pub const LOG_GROWTH: &'static str = "logGrowth";
    pub const GET_RECENT_ACTIVITY: &'static str = "getRecentActivity";
    pub const RECORD_UPDATE: &'static str = "recordUpdate";

    /// Build a typed call from the tool name and its JSON-encoded arguments.
    pub fn parse(name: &str, arguments: &str) -> Result<Self, ToolParseError> {
        match name {
            Self::LOG_SLEEP => parse_args(name, arguments).map(ToolCall::LogSleep),
            Self::LOG_FEEDING => parse_args(name, arguments).map(ToolCall::LogFeeding),
            Self::LOG_DIAPER => parse_args(name, arguments).map(ToolCall::LogDiaper),
            Self::LOG_ACTIVITY => parse_args(name, arguments).map(ToolCall::LogActivity),
            Self::LOG_GROWTH => parse_args(name, arguments).map(ToolCall::LogGrowth),
            Self::GET_RECENT_ACTIVITY => parse_args(name, arguments).map(ToolCall::GetRecentActivity),
            Self::RECORD_UPDATE => parse_args(name, arguments).map(ToolCall::RecordUpdate),
            other => Err(ToolParseError::UnknownTool(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::LogSleep(_) => Self::LOG_SLEEP,
            ToolCall::LogFeeding(_) => Self::LOG_FEEDING,
            ToolCall::LogDiaper(_) => Self::LOG_DIAPER,
            ToolCall::LogActivity(_) => Self::LOG_ACTIVITY,
            ToolCall::LogGrowth(_) => Self::LOG_GROWTH,
            ToolCall::GetRecentActivity(_) => Self::GET_RECENT_ACTIVITY,
            ToolCall::RecordUpdate(_) => Self::RECORD_UPDATE,
        }
    }
}

/// Maps tool invocations onto the activity tracker or the local update sink.
pub struct ToolDispatcher {
    tracker: Arc<dyn ActivityTracker>,
}

impl ToolDispatcher {
    pub fn new(tracker: Arc<dyn ActivityTracker>) -> Self {
        Self { tracker }
    }

    /// Parse and dispatch a raw function-call event.
    pub async fn dispatch_named(
        &self,
        name: &str,
        arguments: &str,
        caller_id: &str,
        updates: Option<&dyn UpdateSink>,
    ) -> ToolResult {
        match ToolCall::parse(name, arguments) {
            Ok(call) => self.dispatch(call, caller_id, updates).await,
            Err(err) => {
                warn!(tool = %name, caller = %caller_id, error = %err, "Rejected tool call");
                ToolResult::failure(err.to_string())
            }
        }
    }

    /// Execute one typed tool call.
    pub async fn dispatch(
        &self,
        call: ToolCall,
        caller_id: &str,
        updates: Option<&dyn UpdateSink>,
    ) -> ToolResult {
        let tool = call.name();
        info!(tool, caller = %caller_id, "Dispatching tool call");

        let (request, fallback) = match call {
            ToolCall::LogSleep(args) => (
                ActivityRequest::LogSleep {
                    duration_minutes: args.duration_minutes,
                    notes: args.notes.unwrap_or_default(),
                },
                "Sleep logged successfully",
            ),
            ToolCall::LogFeeding(args) => (
                ActivityRequest::LogFeeding {
                    amount_oz: args.amount_oz.unwrap_or(0.0),
                    feeding_type: args.feeding_type.unwrap_or(FeedingType::Bottle).as_str().to_string(),
                    notes: args.notes.unwrap_or_default(),
                },
                "Feeding logged successfully",
            ),
            ToolCall::LogDiaper(args) => (
                ActivityRequest::LogDiaper {
                    diaper_type: args.mode.as_str().to_string(),
                    notes: args.notes.unwrap_or_default(),
                },
                "Diaper change logged successfully",
            ),
            ToolCall::LogActivity(args) => (
                ActivityRequest::LogActivity {
                    activity: args.activity,
                    notes: args.notes.unwrap_or_default(),
                },
                "Activity logged successfully",
            ),
            ToolCall::LogGrowth(args) => {
                if args.weight_lbs.is_none() && args.height_in.is_none() && args.head_in.is_none() {
                    return ToolResult::failure("Invalid arguments for logGrowth: no measurement given");
                }
                (
                    ActivityRequest::LogGrowth {
                        weight_lbs: args.weight_lbs,
                        height_in: args.height_in,
                        head_in: args.head_in,
                    },
                    "Growth measurements logged successfully",
                )
            }
            ToolCall::GetRecentActivity(args) => (
                ActivityRequest::RecentActivity { hours: args.hours },
                "No recent activity recorded",
            ),
            ToolCall::RecordUpdate(args) => {
                return Self::record_update(args, caller_id, updates).await;
            }
        };

        match self.tracker.submit(request).await {
            Ok(reply) => ToolResult {
                success: reply.success,
                message: reply.describe(fallback),
            },
            Err(err) => {
                warn!(tool, caller = %caller_id, error = %format!("{:#}", err), "Activity tracker call failed");
                ToolResult::failure(format!("Error: {:#}", err))
            }
        }
    }

    /// Fetch the recent-activity summary through the same path the AI uses.
    pub async fn recent_activity(&self, hours: u32, caller_id: &str) -> ToolResult {
        self.dispatch(ToolCall::GetRecentActivity(RecentActivityArgs { hours }), caller_id, None)
            .await
    }

    async fn record_update(
        args: RecordUpdateArgs,
        caller_id: &str,
        updates: Option<&dyn UpdateSink>,
    ) -> ToolResult {
        let Some(sink) = updates else {
            return ToolResult::failure("Updates cannot be recorded on this call");
        };

        match sink.record_update(caller_id, &args.update, args.category).await {
            Ok(()) => ToolResult::ok("Update recorded successfully"),
            Err(err) => {
                warn!(caller = %caller_id, error = %format!("{:#}", err), "Failed to write update");
                ToolResult::failure(format!("Error: {:#}", err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryHistory, ScriptedTracker};

    fn dispatcher(tracker: &Arc<ScriptedTracker>) -> ToolDispatcher {
        ToolDispatcher::new(tracker.clone())
    }

    #[tokio::test]
    async fn test_log_sleep_reports_success() {
        let tracker = Arc::new(ScriptedTracker::succeeding());
        let result = dispatcher(&tracker)
            .dispatch_named("logSleep", r#"{"duration_minutes": 90}"#, "+15550000", None)
            .await;

        assert_eq!(result, ToolResult::ok("Sleep logged successfully"));
        assert_eq!(
            tracker.requests(),
            vec![ActivityRequest::LogSleep { duration_minutes: 90.0, notes: String::new() }]
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_is_a_failure_result() {
        let tracker = Arc::new(ScriptedTracker::succeeding());
        let result = dispatcher(&tracker)
            .dispatch_named("doThing", "{}", "+15550000", None)
            .await;

        assert_eq!(result, ToolResult::failure("Unknown function: doThing"));
        assert!(tracker.requests().is_empty());
    }

    #[tokio::test]
    async fn test_tracker_failure_never_escapes() {
        let tracker = Arc::new(ScriptedTracker::failing("connection refused"));
        let result = dispatcher(&tracker)
            .dispatch_named("logDiaper", r#"{"mode": "wet"}"#, "+15550000", None)
            .await;

        assert!(!result.success);
        assert!(result.message.contains("connection refused"));
        assert_eq!(
            tracker.requests(),
            vec![ActivityRequest::LogDiaper { diaper_type: "pee".to_string(), notes: String::new() }]
        );
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let tracker = Arc::new(ScriptedTracker::succeeding());
        let d = dispatcher(&tracker);

        let missing = d.dispatch_named("logSleep", "{}", "+15550000", None).await;
        assert!(!missing.success);
        assert!(missing.message.starts_with("Invalid arguments for logSleep"));

        let bad_mode = d.dispatch_named("logDiaper", r#"{"mode": "purple"}"#, "+15550000", None).await;
        assert!(!bad_mode.success);

        let garbage = d.dispatch_named("logActivity", "{not json", "+15550000", None).await;
        assert!(!garbage.success);

        let no_measurement = d.dispatch_named("logGrowth", "", "+15550000", None).await;
        assert!(!no_measurement.success);

        assert!(tracker.requests().is_empty());
    }

    #[tokio::test]
    async fn test_record_update_requires_sink() {
        let tracker = Arc::new(ScriptedTracker::succeeding());
        let d = dispatcher(&tracker);
        let args = r#"{"update": "First smile today", "category": "milestone"}"#;

        let without = d.dispatch_named("recordUpdate", args, "+15550000", None).await;
        assert!(!without.success);

        let history = MemoryHistory::default();
        let with = d.dispatch_named("recordUpdate", args, "+15550000", Some(&history)).await;
        assert_eq!(with, ToolResult::ok("Update recorded successfully"));

        let updates = history.update_entries();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].category, UpdateCategory::Milestone);
        assert!(tracker.requests().is_empty());
    }

    #[tokio::test]
    async fn test_feeding_defaults() {
        let tracker = Arc::new(ScriptedTracker::succeeding());
        let result = dispatcher(&tracker)
            .dispatch_named("logFeeding", r#"{"feeding_type": "breast"}"#, "+15550000", None)
            .await;

        assert!(result.success);
        assert_eq!(
            tracker.requests(),
            vec![ActivityRequest::LogFeeding {
                amount_oz: 0.0,
                feeding_type: "nursing".to_string(),
                notes: String::new(),
            }]
        );
    }

    #[tokio::test]
    async fn test_recent_activity_uses_lookback() {
        let tracker = Arc::new(ScriptedTracker::succeeding());
        let result = dispatcher(&tracker).recent_activity(12, "+15550000").await;

        assert!(result.success);
        assert_eq!(tracker.requests(), vec![ActivityRequest::RecentActivity { hours: 12 }]);
    }

    #[test]
    fn test_parse_round_trips_names() {
        let call = ToolCall::parse("getRecentActivity", "").unwrap();
        assert_eq!(call, ToolCall::GetRecentActivity(RecentActivityArgs { hours: 24 }));
        assert_eq!(call.name(), "getRecentActivity");
    }
}
