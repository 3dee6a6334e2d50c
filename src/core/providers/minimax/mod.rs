//! Minimax: streaming text-to-speech over the T2A v2 WebSocket protocol.

mod provider;
mod tts;

pub use provider::{MinimaxPlugin, MinimaxProvider};
pub use tts::{MinimaxTtsService, MinimaxTtsStream};
