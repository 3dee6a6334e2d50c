use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parameters for a speech-to-text request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SttConfig {
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub sample_rate: u32,
    #[serde(default)]
    pub encoding: String,
    #[serde(default)]
    pub channels: u16,
    #[serde(default)]
    pub interim_results: bool,
    #[serde(default)]
    pub punctuation: bool,
    /// Provider-specific request options (`multichannel`, `smart_format`,
    /// `diarize`, `utterance_end_ms`, `vad_events`, `min_volume`,
    /// `max_silence_duration_secs`, ...).
    #[serde(default)]
    pub options: HashMap<String, Value>,
}

/// Parameters for a text-to-speech request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(default)]
    pub voice: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub sample_rate: u32,
    #[serde(default)]
    pub encoding: String,
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub pitch: f64,
    /// Provider-specific request options (`role`,
    /// `loudness_normalization`, ...).
    #[serde(default)]
    pub options: HashMap<String, Value>,
}

/// Timing and confidence for a single recognized word.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WordInfo {
    pub word: String,
    pub start_time: f64,
    pub end_time: f64,
    pub confidence: f64,
}

/// One transcription result emitted by a streaming STT client.
///
/// Results are emitted in transport-arrival order. A `is_final == true`
/// result for a segment strictly precedes any result for the next
/// segment; a later `normalized == true` refinement (flagged through
/// `metadata`) is the only thing allowed to supersede a final.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SttResult {
    pub text: String,
    pub is_final: bool,
    /// Confidence in [0, 1].
    pub confidence: f64,
    #[serde(default)]
    pub start_time: f64,
    #[serde(default)]
    pub end_time: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub words: Vec<WordInfo>,
    /// Provider-specific fields: `speech_final`, `duration`, `eou`,
    /// `normalized`, end-of-utterance timestamps, status messages.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl SttResult {
    pub fn new(text: String, is_final: bool, confidence: f64) -> Self {
        Self {
            text,
            is_final,
            confidence: confidence.clamp(0.0, 1.0),
            ..Default::default()
        }
    }
}

/// A voice offered by a TTS provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Voice {
    pub id: String,
    pub name: String,
    pub language: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub gender: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub styles: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_clamped() {
        let result = SttResult::new("hi".to_string(), true, 1.5);
        assert_eq!(result.confidence, 1.0);

        let result = SttResult::new("hi".to_string(), true, -0.5);
        assert_eq!(result.confidence, 0.0);
    }
}
