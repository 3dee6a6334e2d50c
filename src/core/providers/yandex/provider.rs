use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tonic::transport::{Channel, ClientTlsConfig};

use crate::core::capability::Capability;
use crate::core::error::ProviderError;
use crate::core::models::{ProviderConfig, ProviderType};
use crate::core::registry::ProviderPlugin;
use crate::core::services::{Provider, SttService, TtsService};

pub(crate) const DEFAULT_STT_ENDPOINT: &str = "https://stt.api.cloud.yandex.net:443";
pub(crate) const DEFAULT_TTS_ENDPOINT: &str = "https://tts.api.cloud.yandex.net:443";

/// Recognized provider-level options for Yandex SpeechKit. Unknown keys
/// are rejected at initialize time.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct YandexOptions {
    folder_id: String,
}

pub(crate) struct YandexInner {
    pub config: ProviderConfig,
    pub folder_id: String,
    pub initialized: AtomicBool,
}

impl YandexInner {
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

    /// The STT endpoint; `base_url` overrides both SpeechKit endpoints.
    pub(crate) fn stt_endpoint(&self) -> String {
        self.config
            .base_url
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_STT_ENDPOINT.to_string())
    }

    pub(crate) fn tts_endpoint(&self) -> String {
        self.config
            .base_url
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_TTS_ENDPOINT.to_string())
    }
}

/// Opens a gRPC channel to a SpeechKit endpoint, with TLS for `https`.
pub(crate) async fn connect_channel(endpoint: &str) -> Result<Channel, ProviderError> {
    let mut builder = Channel::from_shared(endpoint.to_string())
        .map_err(|e| ProviderError::Configuration(format!("invalid endpoint {endpoint}: {e}")))?;

    if endpoint.starts_with("https://") {
        builder = builder
            .tls_config(ClientTlsConfig::new().with_native_roots())
            .map_err(|e| ProviderError::Configuration(format!("TLS configuration failed: {e}")))?;
    }

    builder.connect().await.map_err(|e| {
        ProviderError::ConnectionFailed(format!("failed to connect to {endpoint}: {e}"))
    })
}

/// Builds authorization metadata: `Api-Key` auth plus the tenant header.
pub(crate) fn authorize_request<T>(
    request: &mut tonic::Request<T>,
    api_key: &str,
    folder_id: Option<&str>,
) -> Result<(), ProviderError> {
    let auth = format!("Api-Key {api_key}")
        .parse()
        .map_err(|_| ProviderError::Configuration("invalid API key characters".to_string()))?;
    request.metadata_mut().insert("authorization", auth);

    if let Some(folder_id) = folder_id {
        let folder = folder_id
            .parse()
            .map_err(|_| ProviderError::Configuration("invalid folder_id characters".to_string()))?;
        request.metadata_mut().insert("x-folder-id", folder);
    }
    Ok(())
}

/// Yandex SpeechKit provider: streaming STT and TTS over gRPC.
pub struct YandexProvider {
    pub(crate) inner: Arc<YandexInner>,
}

impl YandexProvider {
    pub fn initialize(config: ProviderConfig) -> Result<Self, ProviderError> {
        if config.api_key.is_empty() {
            return Err(ProviderError::Configuration(
                "Yandex API key is required".to_string(),
            ));
        }

        let options: YandexOptions = if config.options.is_empty() {
            return Err(ProviderError::Configuration(
                "Yandex folder_id is required in options".to_string(),
            ));
        } else {
            let value = serde_json::to_value(&config.options)
                .map_err(|e| ProviderError::Configuration(e.to_string()))?;
            serde_json::from_value(value).map_err(|e| {
                ProviderError::Configuration(format!("invalid options for provider yandex: {e}"))
            })?
        };
        if options.folder_id.is_empty() {
            return Err(ProviderError::Configuration(
                "Yandex folder_id is required in options".to_string(),
            ));
        }

        Ok(Self {
            inner: Arc::new(YandexInner {
                config,
                folder_id: options.folder_id,
                initialized: AtomicBool::new(true),
            }),
        })
    }

    /// A provider handle exposing only the STT capability.
    pub fn stt_provider(&self) -> Arc<dyn Provider> {
        Arc::new(YandexSttProvider {
            inner: self.inner.clone(),
        })
    }

    /// A provider handle exposing only the TTS capability.
    pub fn tts_provider(&self) -> Arc<dyn Provider> {
        Arc::new(YandexTtsProvider {
            inner: self.inner.clone(),
        })
    }
}

async fn probe(inner: &YandexInner) -> Result<(), ProviderError> {
    inner.ensure_initialized()?;
    if inner.config.api_key.is_empty() || inner.folder_id.is_empty() {
        return Err(ProviderError::Configuration(
            "health check failed: invalid configuration".to_string(),
        ));
    }
    Ok(())
}

#[async_trait]
impl Provider for YandexProvider {
    fn name(&self) -> &str {
        "yandex"
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Yandex
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::Stt, Capability::Tts]
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        probe(&self.inner).await
    }

    async fn close(&self) -> Result<(), ProviderError> {
        self.inner.initialized.store(false, Ordering::Release);
        Ok(())
    }

    fn stt(&self) -> Option<Arc<dyn SttService>> {
        Some(Arc::new(super::stt::YandexSttService {
            inner: self.inner.clone(),
        }))
    }

    fn tts(&self) -> Option<Arc<dyn TtsService>> {
        Some(Arc::new(super::tts::YandexTtsService {
            inner: self.inner.clone(),
        }))
    }
}

/// STT-only wrapper with a non-owning back-reference to the provider.
struct YandexSttProvider {
    inner: Arc<YandexInner>,
}

#[async_trait]
impl Provider for YandexSttProvider {
    fn name(&self) -> &str {
        "yandex-stt"
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Speech
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::Stt]
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        probe(&self.inner).await
    }

    async fn close(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    fn stt(&self) -> Option<Arc<dyn SttService>> {
        Some(Arc::new(super::stt::YandexSttService {
            inner: self.inner.clone(),
        }))
    }
}

/// TTS-only wrapper.
struct YandexTtsProvider {
    inner: Arc<YandexInner>,
}

#[async_trait]
impl Provider for YandexTtsProvider {
    fn name(&self) -> &str {
        "yandex-tts"
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Speech
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::Tts]
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        probe(&self.inner).await
    }

    async fn close(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    fn tts(&self) -> Option<Arc<dyn TtsService>> {
        Some(Arc::new(super::tts::YandexTtsService {
            inner: self.inner.clone(),
        }))
    }
}

/// Plugin producing the Yandex SpeechKit provider.
pub struct YandexPlugin;

#[async_trait]
impl ProviderPlugin for YandexPlugin {
    fn name(&self) -> &str {
        "yandex"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::Stt, Capability::Tts]
    }

    fn metadata(&self) -> HashMap<String, Value> {
        let mut metadata = HashMap::new();
        metadata.insert("transport".to_string(), Value::from("grpc"));
        metadata.insert("api_version".to_string(), Value::from("v3"));
        metadata
    }

    async fn initialize(
        &self,
        config: ProviderConfig,
    ) -> Result<Arc<dyn Provider>, ProviderError> {
        Ok(Arc::new(YandexProvider::initialize(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_id_is_required() {
        let config = ProviderConfig::new("yandex", ProviderType::Yandex).with_api_key("key");
        assert!(matches!(
            YandexProvider::initialize(config),
            Err(ProviderError::Configuration(_))
        ));

        let config = ProviderConfig::new("yandex", ProviderType::Yandex)
            .with_api_key("key")
            .with_option("folder_id", Value::from(""));
        assert!(matches!(
            YandexProvider::initialize(config),
            Err(ProviderError::Configuration(_))
        ));

        let config = ProviderConfig::new("yandex", ProviderType::Yandex)
            .with_api_key("key")
            .with_option("folder_id", Value::from("b1gfolder"));
        let provider = YandexProvider::initialize(config).unwrap();
        assert_eq!(provider.inner.folder_id, "b1gfolder");
    }

    #[test]
    fn wrappers_expose_single_capabilities() {
        let config = ProviderConfig::new("yandex", ProviderType::Yandex)
            .with_api_key("key")
            .with_option("folder_id", Value::from("b1gfolder"));
        let provider = YandexProvider::initialize(config).unwrap();

        let stt = provider.stt_provider();
        assert_eq!(stt.name(), "yandex-stt");
        assert_eq!(stt.capabilities(), vec![Capability::Stt]);
        assert!(stt.stt().is_some());
        assert!(stt.tts().is_none());

        let tts = provider.tts_provider();
        assert_eq!(tts.name(), "yandex-tts");
        assert_eq!(tts.capabilities(), vec![Capability::Tts]);
        assert!(tts.tts().is_some());
        assert!(tts.stt().is_none());
    }
}
