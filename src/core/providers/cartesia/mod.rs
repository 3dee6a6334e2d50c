//! Cartesia: streaming speech-to-text and text-to-speech over two
//! WebSocket dialects, with single-capability provider wrappers.

mod messages;
mod provider;
mod stt;
mod tts;

pub use provider::{CartesiaPlugin, CartesiaProvider};
pub use stt::{CartesiaSttService, CartesiaSttStream};
pub use tts::{CartesiaTtsService, CartesiaTtsStream};
