//! # Configuration Management
//!
//! Loads the bridge configuration from several layered sources:
//! - Default values (built into the code)
//! - TOML configuration file (config.toml, optional)
//! - Environment variables with the `APP_` prefix (`APP_OPENAI__SUMMARY_MODEL`)
//! - Platform variables (`HOST`, `PORT`, `OPENAI_API_KEY`, `ACTIVITY_SERVICE_URL`)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Platform variables
//! 2. `APP_` environment variables
//! 3. Configuration file
//! 4. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
///
/// Each section maps to one collaborator of the bridge: the HTTP server, the
/// realtime AI service, the per-call session parameters, the activity tracker,
/// the history store and the telephony socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub openai: OpenAiConfig,
    pub session: SessionSettings,
    pub activity: ActivityConfig,
    pub history: HistoryConfig,
    pub telephony: TelephonyConfig,
}

/// Server-specific configuration settings.
///
/// ## Fields:
/// - `host`: IP address or hostname to bind the server to
/// - `port`: TCP port number to listen on
/// - `public_host`: host name the telephony provider should dial back for the
///   media stream; when empty the webhook request's `Host` header is used
/// - `max_concurrent_calls`: calls bridged at once before new streams are refused
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub public_host: String,
    pub max_concurrent_calls: usize,
}

/// Credentials and endpoints for the AI provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub api_key: String,
    /// Realtime websocket URL, model included as a query parameter
    pub realtime_url: String,
    /// Base URL for the chat completions API used by the summarizer
    pub chat_url: String,
    pub summary_model: String,
    pub timeout_secs: u64,
}

/// Parameters sent in the `session.update` event at the start of every call.
///
/// ## Turn detection:
/// The provider runs voice-activity detection on the caller audio. A lower
/// `vad_threshold` reacts to quieter speech; `silence_duration_ms` is how long
/// the caller must pause before the agent answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    pub voice: String,
    pub input_audio_format: String,
    pub output_audio_format: String,
    pub transcription_model: String,
    pub vad_threshold: f32,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
    pub instructions: String,
}

/// Activity-tracking backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Look-back window for the recent-activity context injected at call start
    pub lookback_hours: u32,
}

/// Where caller history lives and how far back recall reaches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    pub data_dir: String,
    pub recall_max_age_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelephonyConfig {
    /// Close a media stream that has been silent (no frames at all) this long
    pub idle_timeout_secs: u64,
}

const DEFAULT_INSTRUCTIONS: &str = "You are Abby, a warm and knowledgeable newborn baby coach \
speaking with a parent over the phone. Keep answers short and friendly. When the parent \
mentions sleep, feeding, diaper changes or other activities, log them with the matching tool \
and confirm briefly. Use recordUpdate for milestones and concerns.";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3002,
                public_host: String::new(),
                max_concurrent_calls: 10,
            },
            openai: OpenAiConfig {
                api_key: String::new(),
                realtime_url: "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview-2024-12-17"
                    .to_string(),
                chat_url: "https://api.openai.com/v1".to_string(),
                summary_model: "gpt-4o-mini".to_string(),
                timeout_secs: 30,
            },
            session: SessionSettings {
                voice: "alloy".to_string(),
                input_audio_format: "g711_ulaw".to_string(),  // Telephony codec, passed through untouched
                output_audio_format: "g711_ulaw".to_string(),
                transcription_model: "whisper-1".to_string(),
                vad_threshold: 0.4,
                prefix_padding_ms: 300,
                silence_duration_ms: 800,
                instructions: DEFAULT_INSTRUCTIONS.to_string(),
            },
            activity: ActivityConfig {
                base_url: "http://127.0.0.1:8081".to_string(),
                timeout_secs: 10,
                lookback_hours: 24,
            },
            history: HistoryConfig {
                data_dir: "data".to_string(),
                recall_max_age_hours: 48,
            },
            telephony: TelephonyConfig {
                idle_timeout_secs: 60,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from all sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: Override server port
    /// - `APP_SESSION__VOICE=shimmer`: Override the agent voice
    /// - `OPENAI_API_KEY=sk-...`: API key for realtime and summarization
    /// - `ACTIVITY_SERVICE_URL=http://tracker:8081`: Activity backend location
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            // Double underscore separates sections so keys may keep their own underscores
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if let Ok(key) = env::var("OPENAI_API_KEY") {
            settings = settings.set_override("openai.api_key", key)?;
        }

        if let Ok(url) = env::var("ACTIVITY_SERVICE_URL") {
            settings = settings.set_override("activity.base_url", url)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// A missing API key is not an error here; `main` only warns about it.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.server.max_concurrent_calls == 0 {
            return Err(anyhow::anyhow!("Max concurrent calls must be greater than 0"));
        }

        if !(0.0..=1.0).contains(&self.session.vad_threshold) {
            return Err(anyhow::anyhow!(
                "VAD threshold must be between 0.0 and 1.0, got {}",
                self.session.vad_threshold
            ));
        }

        if self.openai.timeout_secs == 0 || self.activity.timeout_secs == 0 {
            return Err(anyhow::anyhow!("Upstream timeouts must be greater than 0"));
        }

        if self.history.recall_max_age_hours <= 0 {
            return Err(anyhow::anyhow!("Recall window must be at least one hour"));
        }

        if !self.openai.realtime_url.starts_with("ws://") && !self.openai.realtime_url.starts_with("wss://") {
            return Err(anyhow::anyhow!(
                "Realtime URL must use ws:// or wss://: {}",
                self.openai.realtime_url
            ));
        }

        for url in [&self.openai.chat_url, &self.activity.base_url] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(anyhow::anyhow!("Service URL must use http:// or https://: {}", url));
            }
        }

        Ok(())
    }

    /// Whether an API key has been provided for the AI provider.
    pub fn has_api_key(&self) -> bool {
        !self.openai.api_key.trim().is_empty()
    }
}
