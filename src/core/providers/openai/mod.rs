//! OpenAI-compatible chat and embedding providers.
//!
//! A single adapter drives every OpenAI-compatible endpoint — OpenAI
//! proper, OpenRouter, Minimax's LLM surface, and Yandex's
//! OpenAI-compatible gateway. Vendors differ only in base URL, an extra
//! per-request header, and a model-id transform.

mod api;
mod chat;
mod embedding;
mod provider;

pub use provider::OpenAiCompatProvider;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::capability::Capability;
use crate::core::error::ProviderError;
use crate::core::models::{Model, ProviderConfig, ProviderType};
use crate::core::registry::ProviderPlugin;
use crate::core::services::Provider;

/// Static description of one OpenAI-compatible vendor.
#[derive(Debug, Clone, Copy)]
pub struct VendorPreset {
    pub name: &'static str,
    pub provider_type: ProviderType,
    pub base_url: &'static str,
    pub default_model: &'static str,
}

pub const OPENAI_PRESET: VendorPreset = VendorPreset {
    name: "openai",
    provider_type: ProviderType::OpenAi,
    base_url: "https://api.openai.com/v1",
    default_model: "gpt-4o-mini",
};

pub const OPENROUTER_PRESET: VendorPreset = VendorPreset {
    name: "openrouter",
    provider_type: ProviderType::OpenRouter,
    base_url: "https://openrouter.ai/api/v1",
    default_model: "openai/gpt-4o-mini",
};

pub const YANDEX_LLM_PRESET: VendorPreset = VendorPreset {
    name: "yandex",
    provider_type: ProviderType::Yandex,
    base_url: "https://llm.api.cloud.yandex.net/v1",
    default_model: "yandexgpt/latest",
};

pub const MINIMAX_LLM_PRESET: VendorPreset = VendorPreset {
    name: "minimax-llm",
    provider_type: ProviderType::Minimax,
    base_url: "https://api.minimax.chat/v1",
    default_model: "abab6.5s-chat",
};

fn chat_model(id: &str, name: &str, description: &str, context: u32, max_tokens: u32) -> Model {
    Model {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        capability: Some(Capability::Chat),
        context_size: context,
        max_tokens,
        ..Default::default()
    }
}

fn embedding_model(id: &str, name: &str, description: &str, dimensions: u32) -> Model {
    let mut metadata = HashMap::new();
    metadata.insert("dimensions".to_string(), Value::from(dimensions));
    Model {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        capability: Some(Capability::Embedding),
        metadata,
        ..Default::default()
    }
}

/// Static model catalog for a vendor preset.
pub fn catalog_for(preset_name: &str) -> Vec<Model> {
    match preset_name {
        "openai" => vec![
            chat_model(
                "gpt-4o-mini",
                "GPT-4o Mini",
                "Fast and affordable model",
                128_000,
                16_384,
            ),
            chat_model(
                "gpt-4o",
                "GPT-4o",
                "High-intelligence flagship model",
                128_000,
                16_384,
            ),
            embedding_model(
                "text-embedding-3-small",
                "Text Embedding 3 Small",
                "Small embedding model",
                1536,
            ),
        ],
        "openrouter" => vec![
            chat_model(
                "openai/gpt-4o-mini",
                "GPT-4o Mini",
                "OpenAI GPT-4o Mini via OpenRouter",
                128_000,
                16_384,
            ),
            chat_model(
                "openai/gpt-4o",
                "GPT-4o",
                "OpenAI GPT-4o via OpenRouter",
                128_000,
                16_384,
            ),
            chat_model(
                "anthropic/claude-3.5-sonnet",
                "Claude 3.5 Sonnet",
                "Anthropic Claude 3.5 Sonnet via OpenRouter",
                200_000,
                8192,
            ),
            chat_model(
                "google/gemini-pro-1.5",
                "Gemini Pro 1.5",
                "Google Gemini Pro 1.5 via OpenRouter",
                1_000_000,
                8192,
            ),
        ],
        "yandex" => vec![
            chat_model(
                "yandexgpt/latest",
                "YandexGPT Latest",
                "Latest YandexGPT model",
                8000,
                2000,
            ),
            chat_model(
                "yandexgpt-lite/latest",
                "YandexGPT Lite Latest",
                "Latest lightweight YandexGPT model",
                8000,
                2000,
            ),
            chat_model(
                "yandexgpt-32k/latest",
                "YandexGPT 32K Latest",
                "Latest YandexGPT with extended context",
                32_000,
                2000,
            ),
            embedding_model(
                "text-search-doc/latest",
                "Text Search Doc Latest",
                "Latest embedding model for document search",
                256,
            ),
            embedding_model(
                "text-search-query/latest",
                "Text Search Query Latest",
                "Latest embedding model for search queries",
                256,
            ),
        ],
        "minimax-llm" => vec![chat_model(
            "abab6.5s-chat",
            "MiniMax abab6.5s",
            "MiniMax chat model",
            245_760,
            8192,
        )],
        _ => Vec::new(),
    }
}

/// Plugin producing an [`OpenAiCompatProvider`] for one vendor preset.
pub struct OpenAiCompatPlugin {
    preset: VendorPreset,
}

impl OpenAiCompatPlugin {
    pub fn new(preset: VendorPreset) -> Self {
        Self { preset }
    }

    pub fn openai() -> Self {
        Self::new(OPENAI_PRESET)
    }

    pub fn openrouter() -> Self {
        Self::new(OPENROUTER_PRESET)
    }

    pub fn yandex_llm() -> Self {
        Self::new(YANDEX_LLM_PRESET)
    }

    pub fn minimax_llm() -> Self {
        Self::new(MINIMAX_LLM_PRESET)
    }
}

#[async_trait]
impl ProviderPlugin for OpenAiCompatPlugin {
    fn name(&self) -> &str {
        self.preset.name
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::Chat, Capability::Embedding]
    }

    fn metadata(&self) -> HashMap<String, Value> {
        let mut metadata = HashMap::new();
        metadata.insert("base_url".to_string(), Value::from(self.preset.base_url));
        metadata.insert(
            "default_model".to_string(),
            Value::from(self.preset.default_model),
        );
        metadata
    }

    async fn initialize(
        &self,
        mut config: ProviderConfig,
    ) -> Result<Arc<dyn Provider>, ProviderError> {
        if config.model.is_empty() {
            config.model = self.preset.default_model.to_string();
        }
        let provider = OpenAiCompatProvider::initialize(&self.preset, config).await?;
        Ok(Arc::new(provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogs_cover_all_presets() {
        for preset in [
            OPENAI_PRESET,
            OPENROUTER_PRESET,
            YANDEX_LLM_PRESET,
            MINIMAX_LLM_PRESET,
        ] {
            assert!(
                !catalog_for(preset.name).is_empty(),
                "missing catalog for {}",
                preset.name
            );
        }
    }

    #[test]
    fn yandex_catalog_includes_embeddings() {
        let models = catalog_for("yandex");
        assert!(models
            .iter()
            .any(|m| m.capability == Some(Capability::Embedding)));
    }
}
