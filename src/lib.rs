//! # Omnivox
//!
//! Multi-provider AI capability gateway: a pluggable registry and
//! streaming-client layer presenting a uniform interface — chat,
//! embeddings, speech-to-text, text-to-speech — across heterogeneous
//! cloud providers (OpenAI-compatible HTTP, gRPC, and WebSocket
//! dialects).
//!
//! The main pieces:
//!
//! - [`core::registry`]: provider lifecycle, capability indexing,
//!   parallel health checks.
//! - [`core::factory`]: cached capability-typed resolution with
//!   single-step fallback.
//! - [`core::providers`]: one module per vendor, each bridging its
//!   native transport onto the uniform `send`/`receive`/`close`
//!   streaming contract.
//! - [`core::supabase`]: source validation, vector search, and
//!   ingestion over the Supabase REST/RPC surface.

pub mod config;
pub mod core;
pub mod init;

pub use config::GatewayConfig;
pub use core::capability::Capability;
pub use core::error::ProviderError;
pub use core::factory::{FactoryError, FallbackFactory, FallbackPolicy, ProviderFactory};
pub use core::models::{
    ChatMessage, ChatOptions, HealthStatus, Model, ProviderConfig, ProviderInfo, ProviderType,
    SttConfig, SttResult, TtsConfig, Voice, WordInfo,
};
pub use core::registry::{
    DiscoveryConfig, PluginRegistry, ProviderDiscovery, ProviderPlugin, ProviderRegistry,
    RegistryError,
};
pub use core::services::{
    ChatService, EmbeddingService, Provider, SttService, SttStream, TtsService, TtsStream,
};
