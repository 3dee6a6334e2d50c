//! Yandex SpeechKit v3: streaming speech-to-text and text-to-speech over
//! bidirectional gRPC, with single-capability provider wrappers.

pub mod proto;

mod provider;
mod stt;
mod tts;

pub use provider::{YandexPlugin, YandexProvider};
pub use stt::{YandexSttService, YandexSttStream};
pub use tts::{YandexTtsService, YandexTtsStream};
