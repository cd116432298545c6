use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of event emitted by the pipeline engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineEventKind {
    SttEnd,
    IntentEnd,
    TtsEnd,
    Error,
    RunEnd,
    /// Anything this endpoint does not act on
    #[serde(other)]
    Other,
}

/// Event emitted by the pipeline engine during a run
///
/// Payload fields are read leniently: a missing or mistyped field reads as `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    #[serde(rename = "type")]
    pub kind: PipelineEventKind,

    #[serde(default)]
    pub data: Map<String, Value>,
}

impl PipelineEvent {
    pub fn new(kind: PipelineEventKind, data: Value) -> Self {
        let data = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self { kind, data }
    }

    fn field(&self, section: &str, key: &str) -> Option<&str> {
        self.data.get(section)?.get(key)?.as_str()
    }

    /// Recognized text of an `stt-end` event
    pub fn stt_text(&self) -> Option<&str> {
        self.field("stt_output", "text")
    }

    /// Conversation id of an `intent-end` event
    pub fn conversation_id(&self) -> Option<&str> {
        self.field("intent_output", "conversation_id")
    }

    /// Media id of a `tts-end` event, if it carries audio
    pub fn tts_media_id(&self) -> Option<&str> {
        self.field("tts_output", "media_id")
            .filter(|media_id| !media_id.is_empty())
    }

    pub fn error_code(&self) -> Option<&str> {
        self.data.get("code")?.as_str()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.data.get("message")?.as_str()
    }
}
