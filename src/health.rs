use crate::state::{AppMetrics, AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.metrics.snapshot();
    let config = &state.config;
    let uptime_seconds = state.get_uptime_seconds();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "service": {
            "name": "call-bridge",
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "calls": {
            "active": metrics.active_calls,
            "started": metrics.calls_started,
            "completed": metrics.calls_completed,
            "rejected": metrics.calls_rejected
        },
        "realtime": {
            "api_key_configured": config.has_api_key()
        },
        "system": load_status(config.server.max_concurrent_calls, &metrics)
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.metrics.snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let mut tool_stats: Vec<_> = metrics.tool_metrics.iter().collect();
    tool_stats.sort_by(|a, b| a.0.cmp(b.0));
    let tool_stats: Vec<_> = tool_stats
        .into_iter()
        .map(|(tool, metric)| {
            json!({
                "tool": tool,
                "invocation_count": metric.invocation_count,
                "failure_count": metric.failure_count,
                "failure_rate": metric.failure_rate(),
                "average_duration_ms": metric.average_duration_ms(),
                "total_duration_ms": metric.total_duration_ms
            })
        })
        .collect();

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "calls": {
            "active": metrics.active_calls,
            "started": metrics.calls_started,
            "completed": metrics.calls_completed,
            "rejected": metrics.calls_rejected,
            "calls_per_hour": if uptime_seconds > 0 {
                metrics.calls_started as f64 * 3600.0 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "tools": tool_stats,
        "summaries": {
            "saved": metrics.summaries_saved,
            "failed": metrics.summary_failures
        },
        "limits": {
            "max_concurrent_calls": state.config.server.max_concurrent_calls,
            "idle_timeout_secs": state.config.telephony.idle_timeout_secs
        }
    }))
}

fn load_status(max_calls: usize, metrics: &AppMetrics) -> serde_json::Value {
    let usage = if max_calls > 0 {
        metrics.active_calls as f64 / max_calls as f64
    } else {
        0.0
    };

    let status = if usage >= 1.0 {
        "at_capacity"
    } else if usage > 0.7 {
        "high_load"
    } else {
        "normal"
    };

    json!({
        "status": status,
        "call_usage_percent": (usage * 100.0).round(),
        "max_calls": max_calls,
        "current_calls": metrics.active_calls,
        "load_warnings": if usage > 0.8 {
            vec!["Call slots nearly exhausted - consider increasing max_concurrent_calls"]
        } else {
            vec![]
        }
    })
}
