//! Downstream frame schemas for the Cartesia STT and TTS WebSocket
//! dialects. Both are JSON tagged by `type`.

use serde::Deserialize;

/// STT frames: `transcript`, `flush_done`, `done`, `error`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum SttEvent {
    Transcript(TranscriptEvent),
    FlushDone,
    Done,
    Error(ErrorEvent),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TranscriptEvent {
    #[serde(default)]
    pub text: String,
    /// Both `is_final` and the camelCase `isFinal` variant are accepted.
    #[serde(default, alias = "isFinal")]
    pub is_final: bool,
    #[serde(default)]
    pub words: Vec<CartesiaWord>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CartesiaWord {
    #[serde(default)]
    pub word: String,
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub end: f64,
}

/// TTS frames: `chunk` (base64 audio), `done`, `error`. Binary frames are
/// the legacy audio path and are handled outside this enum.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum TtsEvent {
    Chunk(ChunkEvent),
    Done,
    Error(ErrorEvent),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ChunkEvent {
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorEvent {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorEvent {
    /// Prefers `message` over `error`, matching the STT dialect.
    pub(crate) fn stt_message(&self) -> String {
        self.message
            .clone()
            .filter(|m| !m.is_empty())
            .or_else(|| self.error.clone().filter(|e| !e.is_empty()))
            .unwrap_or_else(|| "unknown STT error".to_string())
    }

    /// Prefers `error` over `message`, matching the TTS dialect.
    pub(crate) fn tts_message(&self) -> String {
        self.error
            .clone()
            .filter(|e| !e.is_empty())
            .or_else(|| self.message.clone().filter(|m| !m.is_empty()))
            .unwrap_or_else(|| "unknown TTS error".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_accepts_both_final_spellings() {
        let snake: SttEvent =
            serde_json::from_str(r#"{"type":"transcript","text":"hi","is_final":true}"#).unwrap();
        let camel: SttEvent =
            serde_json::from_str(r#"{"type":"transcript","text":"hi","isFinal":true}"#).unwrap();

        for event in [snake, camel] {
            match event {
                SttEvent::Transcript(t) => assert!(t.is_final),
                other => panic!("expected transcript, got {other:?}"),
            }
        }
    }

    #[test]
    fn unknown_types_do_not_fail() {
        let event: SttEvent = serde_json::from_str(r#"{"type":"hint","x":1}"#).unwrap();
        assert!(matches!(event, SttEvent::Unknown));
    }

    #[test]
    fn error_extraction_prefers_dialect_field() {
        let event = ErrorEvent {
            message: Some("m".to_string()),
            error: Some("e".to_string()),
        };
        assert_eq!(event.stt_message(), "m");
        assert_eq!(event.tts_message(), "e");

        let empty = ErrorEvent::default();
        assert_eq!(empty.stt_message(), "unknown STT error");
    }
}
