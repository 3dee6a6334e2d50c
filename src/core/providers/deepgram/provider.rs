use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::capability::Capability;
use crate::core::error::ProviderError;
use crate::core::models::{ProviderConfig, ProviderType};
use crate::core::registry::ProviderPlugin;
use crate::core::services::{Provider, SttService};

pub(crate) const DEFAULT_BASE_URL: &str = "wss://api.deepgram.com";

pub(crate) struct DeepgramInner {
    pub config: ProviderConfig,
    pub base_url: String,
    pub initialized: AtomicBool,
}

impl DeepgramInner {
    pub(crate) fn ensure_initialized(&self) -> Result<(), ProviderError> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(ProviderError::NotInitialized)
        }
    }

    pub(crate) fn api_key(&self) -> &str {
        &self.config.api_key
    }
}

/// Deepgram speech-to-text provider over the Listen v1 WebSocket API.
pub struct DeepgramProvider {
    pub(crate) inner: Arc<DeepgramInner>,
}

impl DeepgramProvider {
    pub fn initialize(config: ProviderConfig) -> Result<Self, ProviderError> {
        if config.api_key.is_empty() {
            return Err(ProviderError::Configuration(
                "Deepgram API key is required".to_string(),
            ));
        }

        let base_url = config
            .base_url
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            inner: Arc::new(DeepgramInner {
                config,
                base_url,
                initialized: AtomicBool::new(true),
            }),
        })
    }
}

#[async_trait]
impl Provider for DeepgramProvider {
    fn name(&self) -> &str {
        "deepgram"
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Deepgram
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::Stt]
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        self.inner.ensure_initialized()?;
        if self.inner.config.api_key.is_empty() {
            return Err(ProviderError::Configuration(
                "health check failed: invalid configuration".to_string(),
            ));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), ProviderError> {
        self.inner.initialized.store(false, Ordering::Release);
        Ok(())
    }

    fn stt(&self) -> Option<Arc<dyn SttService>> {
        Some(Arc::new(super::stt::DeepgramSttService {
            inner: self.inner.clone(),
        }))
    }
}

/// Plugin producing the Deepgram provider.
pub struct DeepgramPlugin;

#[async_trait]
impl ProviderPlugin for DeepgramPlugin {
    fn name(&self) -> &str {
        "deepgram"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::Stt]
    }

    fn metadata(&self) -> HashMap<String, Value> {
        let mut metadata = HashMap::new();
        metadata.insert("transport".to_string(), Value::from("websocket"));
        metadata
    }

    async fn initialize(
        &self,
        config: ProviderConfig,
    ) -> Result<Arc<dyn Provider>, ProviderError> {
        Ok(Arc::new(DeepgramProvider::initialize(config)?))
    }
}
