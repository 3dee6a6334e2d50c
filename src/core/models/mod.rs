//! Value objects shared across the gateway: provider metadata, speech
//! request/result types, and chat message envelopes.

mod chat;
mod provider;
mod speech;

pub use chat::{ChatMessage, ChatOptions};
pub use provider::{
    DEFAULT_REQUEST_TIMEOUT, HealthStatus, Model, ModelPricing, ProviderConfig, ProviderInfo,
    ProviderType, RetryPolicy,
};
pub use speech::{SttConfig, SttResult, TtsConfig, Voice, WordInfo};
