use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Shown instead of secrets in the config endpoint.
const REDACTED: &str = "***";

pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = &state.config;

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": {
            "server": {
                "host": config.server.host,
                "port": config.server.port,
                "public_host": config.server.public_host,
                "max_concurrent_calls": config.server.max_concurrent_calls
            },
            "openai": {
                "api_key": if config.has_api_key() { REDACTED } else { "" },
                "realtime_url": config.openai.realtime_url,
                "chat_url": config.openai.chat_url,
                "summary_model": config.openai.summary_model,
                "timeout_secs": config.openai.timeout_secs
            },
            "session": {
                "voice": config.session.voice,
                "input_audio_format": config.session.input_audio_format,
                "output_audio_format": config.session.output_audio_format,
                "transcription_model": config.session.transcription_model,
                "vad_threshold": config.session.vad_threshold,
                "prefix_padding_ms": config.session.prefix_padding_ms,
                "silence_duration_ms": config.session.silence_duration_ms
            },
            "activity": {
                "base_url": config.activity.base_url,
                "timeout_secs": config.activity.timeout_secs,
                "lookback_hours": config.activity.lookback_hours
            },
            "history": {
                "data_dir": config.history.data_dir,
                "recall_max_age_hours": config.history.recall_max_age_hours
            },
            "telephony": {
                "idle_timeout_secs": config.telephony.idle_timeout_secs
            }
        }
    })))
}
