//! SpeechKit STT v3 wire types (`speechkit.stt.v3`), maintained in-tree
//! against the published Yandex Cloud protos. Only the subset exercised
//! by the streaming client is defined; unknown response fields are
//! skipped by prost during decode.

/// First message of a streaming session: recognition model, audio
/// format, normalization, language restriction, and EOU classification.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StreamingOptions {
    #[prost(message, optional, tag = "1")]
    pub recognition_model: Option<RecognitionModelOptions>,
    #[prost(message, optional, tag = "2")]
    pub eou_classifier: Option<EouClassifierOptions>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RecognitionModelOptions {
    #[prost(string, tag = "1")]
    pub model: String,
    #[prost(message, optional, tag = "2")]
    pub audio_format: Option<AudioFormatOptions>,
    #[prost(message, optional, tag = "3")]
    pub text_normalization: Option<TextNormalizationOptions>,
    #[prost(message, optional, tag = "4")]
    pub language_restriction: Option<LanguageRestrictionOptions>,
    #[prost(
        enumeration = "recognition_model_options::AudioProcessingType",
        tag = "5"
    )]
    pub audio_processing_type: i32,
}

pub mod recognition_model_options {
    #[derive(
        Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
    )]
    #[repr(i32)]
    pub enum AudioProcessingType {
        Unspecified = 0,
        RealTime = 1,
        FullData = 2,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AudioFormatOptions {
    #[prost(oneof = "audio_format_options::AudioFormat", tags = "1")]
    pub audio_format: Option<audio_format_options::AudioFormat>,
}

pub mod audio_format_options {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum AudioFormat {
        #[prost(message, tag = "1")]
        RawAudio(super::RawAudio),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RawAudio {
    #[prost(enumeration = "raw_audio::AudioEncoding", tag = "1")]
    pub audio_encoding: i32,
    #[prost(int64, tag = "2")]
    pub sample_rate_hertz: i64,
    #[prost(int64, tag = "3")]
    pub audio_channel_count: i64,
}

pub mod raw_audio {
    #[derive(
        Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
    )]
    #[repr(i32)]
    pub enum AudioEncoding {
        Unspecified = 0,
        Linear16Pcm = 1,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TextNormalizationOptions {
    #[prost(
        enumeration = "text_normalization_options::TextNormalization",
        tag = "1"
    )]
    pub text_normalization: i32,
    #[prost(bool, tag = "2")]
    pub profanity_filter: bool,
    #[prost(bool, tag = "3")]
    pub literature_text: bool,
}

pub mod text_normalization_options {
    #[derive(
        Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
    )]
    #[repr(i32)]
    pub enum TextNormalization {
        Unspecified = 0,
        Enabled = 1,
        Disabled = 2,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LanguageRestrictionOptions {
    #[prost(
        enumeration = "language_restriction_options::LanguageRestrictionType",
        tag = "1"
    )]
    pub restriction_type: i32,
    #[prost(string, repeated, tag = "2")]
    pub language_code: Vec<String>,
}

pub mod language_restriction_options {
    #[derive(
        Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
    )]
    #[repr(i32)]
    pub enum LanguageRestrictionType {
        Unspecified = 0,
        Whitelist = 1,
        Blacklist = 2,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EouClassifierOptions {
    #[prost(oneof = "eou_classifier_options::Classifier", tags = "1")]
    pub classifier: Option<eou_classifier_options::Classifier>,
}

pub mod eou_classifier_options {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Classifier {
        #[prost(message, tag = "1")]
        DefaultClassifier(super::DefaultEouClassifier),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DefaultEouClassifier {
    #[prost(enumeration = "default_eou_classifier::EouSensitivity", tag = "1")]
    pub r#type: i32,
    #[prost(int64, tag = "2")]
    pub max_pause_between_words_hint_ms: i64,
}

pub mod default_eou_classifier {
    #[derive(
        Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
    )]
    #[repr(i32)]
    pub enum EouSensitivity {
        Unspecified = 0,
        Default = 1,
        High = 2,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AudioChunk {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StreamingRequest {
    #[prost(oneof = "streaming_request::Event", tags = "1, 2")]
    pub event: Option<streaming_request::Event>,
}

pub mod streaming_request {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Event {
        #[prost(message, tag = "1")]
        SessionOptions(super::StreamingOptions),
        #[prost(message, tag = "2")]
        Chunk(super::AudioChunk),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Word {
    #[prost(string, tag = "1")]
    pub text: String,
    #[prost(int64, tag = "2")]
    pub start_time_ms: i64,
    #[prost(int64, tag = "3")]
    pub end_time_ms: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Alternative {
    #[prost(message, repeated, tag = "1")]
    pub words: Vec<Word>,
    #[prost(string, tag = "2")]
    pub text: String,
    #[prost(int64, tag = "3")]
    pub start_time_ms: i64,
    #[prost(int64, tag = "4")]
    pub end_time_ms: i64,
    #[prost(double, tag = "5")]
    pub confidence: f64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AlternativeUpdate {
    #[prost(message, repeated, tag = "1")]
    pub alternatives: Vec<Alternative>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EouUpdate {
    #[prost(int64, tag = "1")]
    pub time_ms: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FinalRefinement {
    #[prost(int64, tag = "1")]
    pub final_index: i64,
    #[prost(oneof = "final_refinement::Type", tags = "2")]
    pub r#type: Option<final_refinement::Type>,
}

pub mod final_refinement {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Type {
        #[prost(message, tag = "2")]
        NormalizedText(super::AlternativeUpdate),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StatusCode {
    #[prost(int32, tag = "1")]
    pub code_type: i32,
    #[prost(string, tag = "2")]
    pub message: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StreamingResponse {
    #[prost(oneof = "streaming_response::Event", tags = "4, 5, 6, 7, 8")]
    pub event: Option<streaming_response::Event>,
}

pub mod streaming_response {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Event {
        #[prost(message, tag = "4")]
        Partial(super::AlternativeUpdate),
        #[prost(message, tag = "5")]
        Final(super::AlternativeUpdate),
        #[prost(message, tag = "6")]
        EouUpdate(super::EouUpdate),
        #[prost(message, tag = "7")]
        FinalRefinement(super::FinalRefinement),
        #[prost(message, tag = "8")]
        StatusCode(super::StatusCode),
    }
}
