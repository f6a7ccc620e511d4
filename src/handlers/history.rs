//! Dashboard read API over caller history. Lists are returned newest first.

use crate::history::store::caller_key;
use crate::history::SummaryRecord;
use crate::telephony::events::UNKNOWN_CALLER;
use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;

/// Most concerns listed by the stats endpoint.
const MAX_RECENT_CONCERNS: usize = 10;

#[derive(Debug, Default, PartialEq, Serialize)]
pub struct ConversationStats {
    pub total_conversations: usize,
    /// Seconds across all calls
    pub total_duration: u64,
    pub topics: BTreeMap<String, u64>,
    pub sentiments: BTreeMap<String, u64>,
    pub recent_concerns: Vec<String>,
}

/// Aggregate a caller's summaries, oldest first as stored.
pub fn conversation_stats(records: &[SummaryRecord]) -> ConversationStats {
    let mut stats = ConversationStats {
        total_conversations: records.len(),
        ..Default::default()
    };

    for record in records {
        stats.total_duration += record.duration_seconds;
        for topic in &record.key_topics {
            *stats.topics.entry(topic.clone()).or_default() += 1;
        }
        *stats.sentiments.entry(record.sentiment.to_string()).or_default() += 1;
        for concern in &record.concerns_raised {
            if !stats.recent_concerns.contains(concern) {
                stats.recent_concerns.push(concern.clone());
            }
        }
    }

    stats.recent_concerns.truncate(MAX_RECENT_CONCERNS);
    stats
}

fn require_phone(phone: &str) -> Result<&str, AppError> {
    if caller_key(phone) == UNKNOWN_CALLER {
        return Err(AppError::BadRequest(format!(
            "Phone number must contain digits: {}",
            phone
        )));
    }
    Ok(phone)
}

/// `GET /api/conversations/{phone}`
pub async fn get_conversations(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let phone = require_phone(&path)?;
    let mut records = state.history.summaries(phone).await?;
    records.reverse();

    Ok(HttpResponse::Ok().json(json!({ "success": true, "data": records })))
}

/// `GET /api/logs/{phone}`
pub async fn get_logs(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let phone = require_phone(&path)?;
    let mut entries = state.history.updates(phone).await?;
    entries.reverse();

    Ok(HttpResponse::Ok().json(json!({ "success": true, "data": entries })))
}

/// `GET /api/stats/{phone}`
pub async fn get_stats(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let phone = require_phone(&path)?;
    let records = state.history.summaries(phone).await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": conversation_stats(&records)
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::history::{HistoryStore, JsonlHistoryStore, Sentiment, UpdateCategory, UpdateSink};
    use actix_web::{http::StatusCode, test as actix_test, App};
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    fn record(summary: &str, topics: &[&str], concerns: &[&str], sentiment: Sentiment) -> SummaryRecord {
        SummaryRecord {
            timestamp: Utc::now() - Duration::minutes(5),
            phone: "+15550000".to_string(),
            duration_seconds: 60,
            summary: summary.to_string(),
            key_topics: topics.iter().map(|s| s.to_string()).collect(),
            concerns_raised: concerns.iter().map(|s| s.to_string()).collect(),
            action_items: vec![],
            sentiment,
        }
    }

    #[test]
    fn test_stats_aggregation() {
        let stats = conversation_stats(&[
            record("a", &["sleep", "feeding"], &["short naps"], Sentiment::Worried),
            record("b", &["sleep"], &["short naps", "spit up"], Sentiment::Positive),
        ]);

        assert_eq!(stats.total_conversations, 2);
        assert_eq!(stats.total_duration, 120);
        assert_eq!(stats.topics["sleep"], 2);
        assert_eq!(stats.sentiments["worried"], 1);
        assert_eq!(stats.recent_concerns, vec!["short naps", "spit up"]);
        assert_eq!(conversation_stats(&[]), ConversationStats::default());
    }

    #[actix_web::test]
    async fn test_history_endpoints() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonlHistoryStore::new(dir.path()));
        store.append_summary(&record("older", &["sleep"], &[], Sentiment::Neutral)).await.unwrap();
        store.append_summary(&record("newer", &["feeding"], &[], Sentiment::Positive)).await.unwrap();
        store.record_update("+15550000", "Held her head up", UpdateCategory::Milestone).await.unwrap();

        let mut state = AppState::build(AppConfig::default()).unwrap();
        state.history = store;
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/api/conversations/{phone}", web::get().to(get_conversations))
                .route("/api/logs/{phone}", web::get().to(get_logs))
                .route("/api/stats/{phone}", web::get().to(get_stats)),
        )
        .await;

        let body: serde_json::Value = actix_test::call_and_read_body_json(
            &app,
            actix_test::TestRequest::get().uri("/api/conversations/15550000").to_request(),
        )
        .await;
        assert_eq!(body["data"][0]["summary"], "newer");
        assert_eq!(body["data"][1]["summary"], "older");

        let body: serde_json::Value =
            actix_test::call_and_read_body_json(&app, actix_test::TestRequest::get().uri("/api/logs/15550000").to_request()).await;
        assert_eq!(body["data"][0]["category"], "milestone");

        let body: serde_json::Value =
            actix_test::call_and_read_body_json(&app, actix_test::TestRequest::get().uri("/api/stats/15550000").to_request()).await;
        assert_eq!(body["data"]["total_conversations"], 2);

        let resp = actix_test::call_service(&app, actix_test::TestRequest::get().uri("/api/stats/nobody").to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
