//! # Application State Management
//!
//! State shared by every HTTP handler and every call bridge.
//!
//! ## What is shared, and how:
//! - **config**: read-only after startup, so a plain `Arc<AppConfig>`
//! - **metrics**: counters updated by every call, behind `Arc<RwLock<T>>`
//! - **services**: the collaborators each bridge needs (dispatcher, context
//!   loader, summarizer, AI connector), built once and shared through `Arc`
//! - **history**: the store behind the history read API
//!
//! Per-call state is absent: each `SessionBridge` owns its
//! `CallSession` outright and nothing here can reach it.
//!
//! ## Lock poisoning:
//! Poisoned metrics guards are recovered with `into_inner()`. The counters are
//! plain numbers, so a half-applied update only skews a count.

use crate::bridge::BridgeServices;
use crate::config::AppConfig;
use crate::context::ContextLoader;
use crate::history::{HistoryStore, JsonlHistoryStore, UpdateSink};
use crate::realtime::{RealtimeClient, SessionConfig};
use crate::summarizer::{OpenAiSummaryClient, Summarizer};
use crate::tools::{tool_schemas, HttpActivityTracker, ToolDispatcher};
use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// The state handed to every request handler through `web::Data`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub metrics: SharedMetrics,
    pub start_time: Instant,
    pub services: Arc<BridgeServices>,
    pub history: Arc<dyn HistoryStore>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        services: Arc<BridgeServices>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            metrics: SharedMetrics::default(),
            start_time: Instant::now(),
            services,
            history,
        }
    }

    /// Wire the production collaborators from configuration.
    ///
    /// ## Dependency graph:
    /// ```text
    /// HttpActivityTracker ──▶ ToolDispatcher ──▶ ContextLoader ◀── JsonlHistoryStore
    ///                                                                   │
    /// OpenAiSummaryClient ──────────────────────▶ Summarizer ◀──────────┘
    /// ```
    /// The JSONL store is shared three ways: summaries, recall, and the
    /// `recordUpdate` sink.
    pub fn build(config: AppConfig) -> Result<Self> {
        let history = Arc::new(JsonlHistoryStore::new(&config.history.data_dir));
        let tracker = Arc::new(HttpActivityTracker::new(
            &config.activity.base_url,
            config.activity.timeout_secs,
        )?);
        let dispatcher = Arc::new(ToolDispatcher::new(tracker));

        let context = Arc::new(ContextLoader::new(
            dispatcher.clone(),
            history.clone(),
            config.activity.lookback_hours,
            config.history.recall_max_age_hours,
        ));

        let summary_client = Arc::new(OpenAiSummaryClient::new(
            &config.openai.chat_url,
            &config.openai.api_key,
            &config.openai.summary_model,
            config.openai.timeout_secs,
        )?);
        let summarizer = Arc::new(Summarizer::new(summary_client, history.clone()));

        let connector = Arc::new(RealtimeClient::new(
            config.openai.realtime_url.clone(),
            config.openai.api_key.clone(),
        ));

        let updates: Arc<dyn UpdateSink> = history.clone();
        let services = Arc::new(BridgeServices {
            dispatcher,
            context,
            summarizer,
            updates,
            connector,
            session_config: SessionConfig::from_settings(&config.session, tool_schemas()),
        });

        Ok(Self::new(config, services, history))
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// Counters for calls, tools and summaries since startup.
#[derive(Debug, Default, Clone, Serialize)]
pub struct AppMetrics {
    pub calls_started: u64,
    pub calls_completed: u64,
    /// Streams refused because the bridge was at capacity
    pub calls_rejected: u64,
    pub active_calls: usize,
    pub summaries_saved: u64,
    pub summary_failures: u64,
    /// Keyed by tool name, e.g. `logSleep`
    pub tool_metrics: HashMap<String, ToolMetric>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ToolMetric {
    pub invocation_count: u64,
    pub total_duration_ms: u64,
    pub failure_count: u64,
}

impl ToolMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.invocation_count > 0 {
            self.total_duration_ms as f64 / self.invocation_count as f64
        } else {
            0.0
        }
    }

    /// Share of invocations that returned `success: false`, 0.0 to 1.0.
    pub fn failure_rate(&self) -> f64 {
        if self.invocation_count > 0 {
            self.failure_count as f64 / self.invocation_count as f64
        } else {
            0.0
        }
    }
}

/// Cloneable handle to the metrics lock.
#[derive(Debug, Default, Clone)]
pub struct SharedMetrics {
    inner: Arc<RwLock<AppMetrics>>,
}

impl SharedMetrics {
    fn read(&self) -> RwLockReadGuard<'_, AppMetrics> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, AppMetrics> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy of the current counters, taken under one read lock.
    pub fn snapshot(&self) -> AppMetrics {
        self.read().clone()
    }

    pub fn active_calls(&self) -> usize {
        self.read().active_calls
    }

    /// Claim a call slot, or `None` when `max_calls` are already active.
    /// The slot is released when the returned guard is dropped.
    pub fn begin_call(&self, max_calls: usize) -> Option<CallGuard> {
        let mut metrics = self.write();
        if metrics.active_calls >= max_calls {
            metrics.calls_rejected += 1;
            return None;
        }
        metrics.active_calls += 1;
        metrics.calls_started += 1;
        Some(CallGuard { metrics: self.clone() })
    }

    pub fn record_tool_call(&self, tool: &str, elapsed: Duration, success: bool) {
        let mut metrics = self.write();
        let entry = metrics.tool_metrics.entry(tool.to_string()).or_default();
        entry.invocation_count += 1;
        entry.total_duration_ms += elapsed.as_millis() as u64;
        if !success {
            entry.failure_count += 1;
        }
    }

    pub fn record_summary(&self, saved: bool) {
        let mut metrics = self.write();
        if saved {
            metrics.summaries_saved += 1;
        } else {
            metrics.summary_failures += 1;
        }
    }
}

/// One occupied call slot.
#[derive(Debug)]
pub struct CallGuard {
    metrics: SharedMetrics,
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        let mut metrics = self.metrics.write();
        metrics.active_calls = metrics.active_calls.saturating_sub(1);
        metrics.calls_completed += 1;
    }
}
