use std::sync::Arc;

use async_trait::async_trait;

use crate::core::error::ProviderError;
use crate::core::models::ProviderType;
use crate::core::services::EmbeddingService;

use super::api::{EmbeddingRequest, EmbeddingResponse};
use super::provider::{error_for_status, request_error, OpenAiCompatInner};

pub(crate) struct OpenAiEmbeddingService {
    pub(crate) inner: Arc<OpenAiCompatInner>,
}

#[async_trait]
impl EmbeddingService for OpenAiEmbeddingService {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.inner.ensure_initialized()?;

        let mut encoding_format = self.inner.options.encoding_format.clone();
        // The Yandex gateway requires an explicit encoding; default to float.
        if self.inner.provider_type == ProviderType::Yandex && encoding_format.is_none() {
            encoding_format = Some("float".to_string());
        }

        let request = EmbeddingRequest {
            input: vec![text.to_string()],
            model: self.inner.embedding_model()?,
            dimensions: self.inner.options.dimensions,
            encoding_format,
        };

        let url = self.inner.endpoint("/embeddings");
        let response = self
            .inner
            .http
            .post(&url)
            .bearer_auth(&self.inner.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(request_error)?;
        let response = error_for_status(response).await?;

        let embeddings: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Protocol(format!("failed to decode embeddings: {e}")))?;

        embeddings
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ProviderError::Upstream("no embeddings returned".to_string()))
    }
}
