//! # Realtime Protocol Events
//!
//! Typed views of the JSON events exchanged with the realtime AI service.
//! Every event is an object with a `type` discriminator, which maps directly
//! onto serde's internally tagged enums.
//!
//! Only the events the bridge acts on get their own variant. Anything else the
//! service sends lands in `ServerEvent::Unknown` and is ignored, so new event
//! types on the provider side never break a live call.

use crate::config::SessionSettings;
use crate::tools::{ToolResult, ToolSchema};
use serde::{Deserialize, Serialize};

/// Events sent from the bridge to the AI service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },

    #[serde(rename = "input_audio_buffer.append")]
    InputAudioAppend { audio: String },

    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },

    #[serde(rename = "response.create")]
    ResponseCreate,
}

impl ClientEvent {
    /// A system-authored message item carrying background context.
    pub fn system_message(text: impl Into<String>) -> Self {
        ClientEvent::ConversationItemCreate {
            item: ConversationItem::Message {
                role: "system".to_string(),
                content: vec![ContentPart::InputText { text: text.into() }],
            },
        }
    }

    /// The answer to one function call, tagged with its correlation id.
    pub fn function_output(call_id: impl Into<String>, result: &ToolResult) -> Self {
        // ToolResult is two plain fields; serialization cannot fail
        let output = serde_json::to_string(result).unwrap_or_default();
        ClientEvent::ConversationItemCreate {
            item: ConversationItem::FunctionCallOutput {
                call_id: call_id.into(),
                output,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationItem {
    Message { role: String, content: Vec<ContentPart> },
    FunctionCallOutput { call_id: String, output: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    InputText { text: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptionConfig {
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    pub kind: String,
    pub threshold: f32,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
}

/// Body of the `session.update` event, the first thing sent on every call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionConfig {
    pub modalities: Vec<String>,
    pub instructions: String,
    pub voice: String,
    pub input_audio_format: String,
    pub output_audio_format: String,
    pub input_audio_transcription: TranscriptionConfig,
    pub turn_detection: TurnDetection,
    pub tools: Vec<ToolSchema>,
    pub tool_choice: String,
}

impl SessionConfig {
    pub fn from_settings(settings: &SessionSettings, tools: Vec<ToolSchema>) -> Self {
        Self {
            modalities: vec!["text".to_string(), "audio".to_string()],
            instructions: settings.instructions.clone(),
            voice: settings.voice.clone(),
            input_audio_format: settings.input_audio_format.clone(),
            output_audio_format: settings.output_audio_format.clone(),
            input_audio_transcription: TranscriptionConfig {
                model: settings.transcription_model.clone(),
            },
            turn_detection: TurnDetection {
                kind: "server_vad".to_string(),
                threshold: settings.vad_threshold,
                prefix_padding_ms: settings.prefix_padding_ms,
                silence_duration_ms: settings.silence_duration_ms,
            },
            tools,
            tool_choice: "auto".to_string(),
        }
    }
}

/// Error payload of the service's `error` event.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RealtimeError {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// Events received from the AI service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "session.created")]
    SessionCreated,

    #[serde(rename = "session.updated")]
    SessionUpdated,

    #[serde(rename = "response.audio.delta")]
    AudioDelta { delta: String },

    /// Streaming agent transcript; only the `done` event is recorded
    #[serde(rename = "response.audio_transcript.delta")]
    AudioTranscriptDelta,

    #[serde(rename = "response.audio_transcript.done")]
    AudioTranscriptDone {
        #[serde(default)]
        transcript: String,
    },

    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputTranscriptionCompleted {
        #[serde(default)]
        transcript: String,
    },

    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        #[serde(default)]
        name: String,
        #[serde(default)]
        arguments: String,
        call_id: String,
    },

    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,

    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped,

    #[serde(rename = "response.output_item.interrupted")]
    OutputInterrupted,

    #[serde(rename = "conversation.item.truncated")]
    ItemTruncated,

    #[serde(rename = "response.done")]
    ResponseDone,

    #[serde(rename = "error")]
    Error { error: RealtimeError },

    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::tools::tool_schemas;
    use serde_json::json;

    #[test]
    fn test_session_update_shape() {
        let settings = AppConfig::default().session;
        let event = ClientEvent::SessionUpdate {
            session: SessionConfig::from_settings(&settings, tool_schemas()),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "session.update");
        assert_eq!(value["session"]["modalities"], json!(["text", "audio"]));
        assert_eq!(value["session"]["input_audio_format"], "g711_ulaw");
        assert_eq!(value["session"]["turn_detection"]["type"], "server_vad");
        assert_eq!(value["session"]["input_audio_transcription"]["model"], "whisper-1");
        assert_eq!(value["session"]["tool_choice"], "auto");
        assert_eq!(value["session"]["tools"].as_array().unwrap().len(), 7);
    }

    #[test]
    fn test_outbound_items() {
        let value = serde_json::to_value(ClientEvent::system_message("hello")).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "conversation.item.create",
                "item": {
                    "type": "message",
                    "role": "system",
                    "content": [{ "type": "input_text", "text": "hello" }]
                }
            })
        );

        let output = ClientEvent::function_output("call_1", &ToolResult::ok("Sleep logged successfully"));
        let value = serde_json::to_value(output).unwrap();
        assert_eq!(value["item"]["type"], "function_call_output");
        assert_eq!(value["item"]["call_id"], "call_1");
        let payload: ToolResult = serde_json::from_str(value["item"]["output"].as_str().unwrap()).unwrap();
        assert_eq!(payload, ToolResult::ok("Sleep logged successfully"));

        assert_eq!(
            serde_json::to_value(ClientEvent::ResponseCreate).unwrap(),
            json!({ "type": "response.create" })
        );
    }

    #[test]
    fn test_parse_known_events() {
        let event = ServerEvent::parse(r#"{"type":"session.updated","event_id":"e1","session":{}}"#).unwrap();
        assert_eq!(event, ServerEvent::SessionUpdated);

        let event = ServerEvent::parse(
            r#"{"type":"response.function_call_arguments.done","name":"logSleep","arguments":"{\"duration_minutes\":90}","call_id":"c1","item_id":"i1"}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ServerEvent::FunctionCallArgumentsDone {
                name: "logSleep".to_string(),
                arguments: r#"{"duration_minutes":90}"#.to_string(),
                call_id: "c1".to_string(),
            }
        );

        let event = ServerEvent::parse(r#"{"type":"error","error":{"type":"invalid_request_error","message":"bad"}}"#).unwrap();
        assert!(matches!(event, ServerEvent::Error { error } if error.message == "bad"));
    }

    #[test]
    fn test_unknown_event_types_are_tolerated() {
        let event = ServerEvent::parse(r#"{"type":"rate_limits.updated","rate_limits":[]}"#).unwrap();
        assert_eq!(event, ServerEvent::Unknown);

        assert!(ServerEvent::parse("not json").is_err());
        assert!(ServerEvent::parse(r#"{"type":"response.audio.delta"}"#).is_err());
    }
}
