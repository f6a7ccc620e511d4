//! # Conversation Summarizer
//!
//! Runs once per finished call, off the call's own task. The transcript is
//! rendered as `SPEAKER: text` lines, sent to a chat-completions model that
//! must answer with a fixed JSON object, and the result is appended to the
//! caller's history as a `SummaryRecord`.
//!
//! A failed or malformed summarization is reported as `Err` and nothing is
//! appended; the caller logs it. There is no retry.

use crate::bridge::session::TranscriptTurn;
use crate::history::{HistoryStore, Sentiment, SummaryRecord};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// The JSON object the summarization model is asked to produce.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SummaryPayload {
    pub summary: String,
    #[serde(default)]
    pub key_topics: Vec<String>,
    #[serde(default)]
    pub concerns_raised: Vec<String>,
    #[serde(default)]
    pub action_items: Vec<String>,
    #[serde(default = "default_sentiment")]
    pub sentiment: Sentiment,
}

fn default_sentiment() -> Sentiment {
    Sentiment::Neutral
}

/// Text summarization service.
#[async_trait]
pub trait SummaryClient: Send + Sync {
    async fn summarize(&self, transcript: &str) -> Result<SummaryPayload>;
}

pub fn summary_prompt(transcript: &str) -> String {
    format!(
        r#"Summarize this conversation between a parent and Abby (baby coach):

{}

Extract and return as JSON:
{{
  "summary": "2-3 sentence summary of the conversation",
  "key_topics": ["topic1", "topic2"],
  "concerns_raised": ["concern1", "concern2"],
  "action_items": ["item1", "item2"],
  "sentiment": "worried|positive|neutral"
}}

Only include concerns and action items if they were actually mentioned."#,
        transcript
    )
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client in JSON mode.
#[derive(Debug, Clone)]
pub struct OpenAiSummaryClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiSummaryClient {
    pub fn new(base_url: &str, api_key: &str, model: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("building summarization HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl SummaryClient for OpenAiSummaryClient {
    async fn summarize(&self, transcript: &str) -> Result<SummaryPayload> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": summary_prompt(transcript) }],
            "response_format": { "type": "json_object" },
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("summarization request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("summarization service returned {}: {}", status.as_u16(), detail);
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .context("summarization service sent an unreadable reply")?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("summarization reply had no content"))?;

        serde_json::from_str(&content).context("summary is not the requested JSON shape")
    }
}

/// Render turns as `SPEAKER: text` lines, in arrival order.
pub fn format_transcript(turns: &[TranscriptTurn]) -> String {
    turns
        .iter()
        .map(|turn| format!("{}: {}", turn.speaker.label(), turn.text))
        .collect::<Vec<_>>()
        .join("\n")
}

fn clean_list(items: Vec<String>, dedupe: bool) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let item = item.trim();
        if item.is_empty() || (dedupe && cleaned.iter().any(|seen| seen == item)) {
            continue;
        }
        cleaned.push(item.to_string());
    }
    cleaned
}

pub struct Summarizer {
    client: Arc<dyn SummaryClient>,
    history: Arc<dyn HistoryStore>,
}

impl Summarizer {
    pub fn new(client: Arc<dyn SummaryClient>, history: Arc<dyn HistoryStore>) -> Self {
        Self { client, history }
    }

    /// Summarize a finished call and append the record. Returns `Ok(None)`
    /// for an empty transcript.
    pub async fn summarize(
        &self,
        transcript: &[TranscriptTurn],
        caller_id: &str,
        duration_seconds: u64,
    ) -> Result<Option<SummaryRecord>> {
        if transcript.is_empty() {
            debug!(caller = %caller_id, "Empty transcript, nothing to summarize");
            return Ok(None);
        }

        let payload = self.client.summarize(&format_transcript(transcript)).await?;
        if payload.summary.trim().is_empty() {
            bail!("summary text was empty");
        }

        let record = SummaryRecord {
            timestamp: Utc::now(),
            phone: caller_id.to_string(),
            duration_seconds,
            summary: payload.summary.trim().to_string(),
            key_topics: clean_list(payload.key_topics, true),
            concerns_raised: clean_list(payload.concerns_raised, false),
            action_items: clean_list(payload.action_items, false),
            sentiment: payload.sentiment,
        };

        self.history
            .append_summary(&record)
            .await
            .context("saving conversation summary")?;
        info!(
            caller = %caller_id,
            duration_seconds,
            sentiment = %record.sentiment,
            "Conversation summary saved"
        );
        Ok(Some(record))
    }
}
