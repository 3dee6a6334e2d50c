//! The shared core of every OpenAI-compatible provider. Per-vendor
//! differences live in three slots only: the base URL, an extra header
//! applied to each request, and a model-id transform.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use tracing::debug;

use crate::core::capability::Capability;
use crate::core::error::ProviderError;
use crate::core::models::{Model, ProviderConfig, ProviderType};
use crate::core::providers::openai::api::ModelsResponse;
use crate::core::providers::openai::{VendorPreset, catalog_for};
use crate::core::services::{ChatService, EmbeddingService, Provider};

/// API-key validation deadline at initialize time.
pub(crate) const VALIDATE_KEY_TIMEOUT: Duration = Duration::from_secs(10);
/// Health probe deadline.
pub(crate) const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Recognized provider-level options for OpenAI-compatible vendors.
/// Unknown keys are rejected at initialize time.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct LlmOptions {
    /// Yandex tenant id; injected as the `OpenAI-Project` header and into
    /// `gpt://` / `emb://` model ids.
    pub folder_id: Option<String>,
    /// Embedding vector size override.
    pub dimensions: Option<u32>,
    /// Embedding encoding format (`float` or `base64`).
    pub encoding_format: Option<String>,
}

impl LlmOptions {
    pub(crate) fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        if config.options.is_empty() {
            return Ok(Self::default());
        }
        let value = serde_json::to_value(&config.options)
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;
        serde_json::from_value(value).map_err(|e| {
            ProviderError::Configuration(format!(
                "invalid options for provider {}: {e}",
                config.name
            ))
        })
    }
}

pub(crate) struct OpenAiCompatInner {
    pub name: String,
    pub provider_type: ProviderType,
    pub base_url: String,
    pub http: reqwest::Client,
    pub config: ProviderConfig,
    pub options: LlmOptions,
    pub catalog: Vec<Model>,
    pub initialized: AtomicBool,
}

impl OpenAiCompatInner {
    pub(crate) fn ensure_initialized(&self) -> Result<(), ProviderError> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(ProviderError::NotInitialized)
        }
    }

    /// Resolves the model for a chat request, applying the vendor's
    /// model-id transform.
    pub(crate) fn chat_model(&self, requested: Option<&str>) -> String {
        let model = requested
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.config.model)
            .to_string();
        if self.provider_type == ProviderType::Yandex {
            if let Some(folder) = self.options.folder_id.as_deref().filter(|f| !f.is_empty()) {
                return format!("gpt://{folder}/{model}");
            }
        }
        model
    }

    /// Resolves the model for an embedding request. The Yandex gateway
    /// defaults to `text-search-query/latest` and wraps the id in
    /// `emb://<folder>/`.
    pub(crate) fn embedding_model(&self) -> Result<String, ProviderError> {
        let mut model = self.config.model.clone();
        if self.provider_type == ProviderType::Yandex {
            if model.is_empty() {
                model = "text-search-query/latest".to_string();
            }
            if let Some(folder) = self.options.folder_id.as_deref().filter(|f| !f.is_empty()) {
                model = format!("emb://{folder}/{model}");
            }
            return Ok(model);
        }
        if model.is_empty() {
            return Err(ProviderError::Configuration(format!(
                "no embedding model configured for provider {}",
                self.name
            )));
        }
        Ok(model)
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    pub(crate) async fn list_model_ids(
        &self,
        deadline: Duration,
    ) -> Result<Vec<String>, ProviderError> {
        let url = self.endpoint("/models");
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.config.api_key)
            .timeout(deadline)
            .send()
            .await
            .map_err(request_error)?;
        let response = error_for_status(response).await?;
        let models: ModelsResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Protocol(format!("failed to decode model list: {e}")))?;
        Ok(models.data.into_iter().map(|m| m.id).collect())
    }
}

/// Maps a reqwest transport error onto the taxonomy.
pub(crate) fn request_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(err.to_string())
    } else if err.is_connect() {
        ProviderError::ConnectionFailed(err.to_string())
    } else {
        ProviderError::Network(err.to_string())
    }
}

/// Converts a non-success HTTP response into an error carrying the status
/// and a body snippet.
pub(crate) async fn error_for_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(1024).collect();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        Err(ProviderError::AuthenticationFailed(format!(
            "status {status}: {snippet}"
        )))
    } else {
        Err(ProviderError::Upstream(format!(
            "status {status}: {snippet}"
        )))
    }
}

/// A provider driving one OpenAI-compatible endpoint, exposing chat and
/// embedding capabilities.
pub struct OpenAiCompatProvider {
    pub(crate) inner: Arc<OpenAiCompatInner>,
}

impl OpenAiCompatProvider {
    /// Builds and initializes the provider. Validates the API key by
    /// listing models, except for the Yandex gateway which uses a
    /// different catalog surface.
    pub async fn initialize(
        preset: &VendorPreset,
        config: ProviderConfig,
    ) -> Result<Self, ProviderError> {
        if config.api_key.is_empty() {
            return Err(ProviderError::Configuration(format!(
                "{} API key is required",
                preset.name
            )));
        }

        let options = LlmOptions::from_config(&config)?;

        let mut headers = HeaderMap::new();
        if preset.provider_type == ProviderType::Yandex {
            if let Some(folder) = options.folder_id.as_deref().filter(|f| !f.is_empty()) {
                headers.insert(
                    "OpenAI-Project",
                    HeaderValue::from_str(folder).map_err(|e| {
                        ProviderError::Configuration(format!("invalid folder_id: {e}"))
                    })?,
                );
            }
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;

        let base_url = config
            .base_url
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| preset.base_url.to_string());

        let inner = Arc::new(OpenAiCompatInner {
            name: preset.name.to_string(),
            provider_type: preset.provider_type,
            base_url,
            http,
            config,
            options,
            catalog: catalog_for(preset.name),
            initialized: AtomicBool::new(false),
        });

        if preset.provider_type != ProviderType::Yandex {
            inner
                .list_model_ids(VALIDATE_KEY_TIMEOUT)
                .await
                .map_err(|e| match e {
                    ProviderError::AuthenticationFailed(msg) => {
                        ProviderError::AuthenticationFailed(msg)
                    }
                    other => ProviderError::Configuration(format!(
                        "failed to validate {} API key: {other}",
                        inner.name
                    )),
                })?;
        }

        inner.initialized.store(true, Ordering::Release);
        debug!(provider = %inner.name, base_url = %inner.base_url, "initialized OpenAI-compatible provider");
        Ok(Self { inner })
    }
}

#[async_trait::async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn provider_type(&self) -> ProviderType {
        self.inner.provider_type
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::Chat, Capability::Embedding]
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        self.inner.ensure_initialized()?;
        self.inner
            .list_model_ids(HEALTH_PROBE_TIMEOUT)
            .await
            .map(|_| ())
    }

    async fn close(&self) -> Result<(), ProviderError> {
        self.inner.initialized.store(false, Ordering::Release);
        Ok(())
    }

    fn chat(&self) -> Option<Arc<dyn ChatService>> {
        Some(Arc::new(super::chat::OpenAiChatService {
            inner: self.inner.clone(),
        }))
    }

    fn embedding(&self) -> Option<Arc<dyn EmbeddingService>> {
        Some(Arc::new(super::embedding::OpenAiEmbeddingService {
            inner: self.inner.clone(),
        }))
    }
}
