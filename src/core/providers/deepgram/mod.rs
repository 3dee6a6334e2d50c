//! Deepgram: streaming speech-to-text over the Listen v1 WebSocket API.

mod provider;
mod stt;

pub use provider::{DeepgramPlugin, DeepgramProvider};
pub use stt::{DeepgramSttService, DeepgramSttStream};
