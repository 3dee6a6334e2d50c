//! SpeechKit TTS v3 wire types (`speechkit.tts.v3`), maintained in-tree
//! against the published Yandex Cloud protos. Covers both synthesis
//! paths: the single-shot `UtteranceSynthesis` RPC and the bidirectional
//! `StreamSynthesis` RPC.

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

/// Loudness-normalization regime selecting the interpretation of the
/// volume scalar.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum LoudnessNormalizationType {
    Unspecified = 0,
    MaxPeak = 1,
    Lufs = 2,
}

/// Hint-style synthesis parameters used by the single-shot path.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Hints {
    #[prost(oneof = "hints::Hint", tags = "1, 3, 4, 5, 6")]
    pub hint: Option<hints::Hint>,
}

pub mod hints {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Hint {
        #[prost(string, tag = "1")]
        Voice(String),
        #[prost(double, tag = "3")]
        Speed(f64),
        #[prost(double, tag = "4")]
        Volume(f64),
        #[prost(string, tag = "5")]
        Role(String),
        #[prost(double, tag = "6")]
        PitchShift(f64),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UtteranceSynthesisRequest {
    #[prost(string, tag = "1")]
    pub model: String,
    #[prost(oneof = "utterance_synthesis_request::Utterance", tags = "2")]
    pub utterance: Option<utterance_synthesis_request::Utterance>,
    #[prost(message, repeated, tag = "4")]
    pub hints: Vec<Hints>,
    #[prost(message, optional, tag = "5")]
    pub output_audio_spec: Option<AudioFormatOptions>,
    #[prost(enumeration = "LoudnessNormalizationType", tag = "6")]
    pub loudness_normalization_type: i32,
    #[prost(bool, tag = "7")]
    pub unsafe_mode: bool,
}

pub mod utterance_synthesis_request {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Utterance {
        #[prost(string, tag = "2")]
        Text(String),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AudioChunk {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UtteranceSynthesisResponse {
    #[prost(message, optional, tag = "1")]
    pub audio_chunk: Option<AudioChunk>,
}

/// Session options, the first frame of a bidirectional stream.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SynthesisOptions {
    #[prost(string, tag = "1")]
    pub model: String,
    #[prost(string, tag = "2")]
    pub voice: String,
    #[prost(string, tag = "3")]
    pub role: String,
    #[prost(double, tag = "4")]
    pub speed: f64,
    #[prost(double, tag = "5")]
    pub volume: f64,
    #[prost(double, tag = "6")]
    pub pitch_shift: f64,
    #[prost(message, optional, tag = "7")]
    pub output_audio_spec: Option<AudioFormatOptions>,
    #[prost(enumeration = "LoudnessNormalizationType", tag = "8")]
    pub loudness_normalization_type: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SynthesisInput {
    #[prost(string, tag = "1")]
    pub text: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StreamSynthesisRequest {
    #[prost(oneof = "stream_synthesis_request::Event", tags = "1, 2")]
    pub event: Option<stream_synthesis_request::Event>,
}

pub mod stream_synthesis_request {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Event {
        #[prost(message, tag = "1")]
        Options(super::SynthesisOptions),
        #[prost(message, tag = "2")]
        SynthesisInput(super::SynthesisInput),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StreamSynthesisResponse {
    #[prost(message, optional, tag = "1")]
    pub audio_chunk: Option<AudioChunk>,
}
