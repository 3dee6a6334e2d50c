use std::sync::Arc;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::core::error::ProviderError;
use crate::core::models::{ChatMessage, ChatOptions, Model};
use crate::core::services::ChatService;

use super::api::{
    ApiChatMessage, ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse,
};
use super::provider::{error_for_status, request_error, OpenAiCompatInner};

/// Buffer for streamed content deltas.
const STREAM_CONTENT_BUFFER: usize = 10;

pub(crate) struct OpenAiChatService {
    pub(crate) inner: Arc<OpenAiCompatInner>,
}

impl OpenAiChatService {
    fn build_request(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
        stream: bool,
    ) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.inner.chat_model(options.model.as_deref()),
            messages: messages
                .iter()
                .map(|m| ApiChatMessage {
                    role: m.role.clone(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            top_p: options.top_p,
            stream,
        }
    }
}

#[async_trait]
impl ChatService for OpenAiChatService {
    async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<String, ProviderError> {
        self.inner.ensure_initialized()?;

        let request = self.build_request(messages, options, false);
        let url = self.inner.endpoint("/chat/completions");
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

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Protocol(format!("failed to decode completion: {e}")))?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::Upstream("no response from model".to_string()))
    }

    async fn stream_chat_completion(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<(mpsc::Receiver<String>, mpsc::Receiver<ProviderError>), ProviderError> {
        self.inner.ensure_initialized()?;

        let request = self.build_request(messages, options, true);
        let url = self.inner.endpoint("/chat/completions");
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

        let (content_tx, content_rx) = mpsc::channel::<String>(STREAM_CONTENT_BUFFER);
        let (err_tx, err_rx) = mpsc::channel::<ProviderError>(1);
        let model = request.model.clone();

        tokio::spawn(async move {
            let mut events = response.bytes_stream().eventsource();
            while let Some(event) = events.next().await {
                match event {
                    Ok(event) => {
                        if event.data == "[DONE]" {
                            debug!(model = %model, "chat stream finished");
                            break;
                        }
                        let chunk: ChatCompletionChunk = match serde_json::from_str(&event.data) {
                            Ok(chunk) => chunk,
                            Err(e) => {
                                warn!(error = %e, "skipping malformed stream chunk");
                                continue;
                            }
                        };
                        let Some(choice) = chunk.choices.into_iter().next() else {
                            continue;
                        };
                        if let Some(content) = choice.delta.content {
                            if !content.is_empty() && content_tx.send(content).await.is_err() {
                                // Consumer dropped the channel.
                                break;
                            }
                        }
                        if choice.finish_reason.is_some() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = err_tx
                            .try_send(ProviderError::Network(format!("stream error: {e}")));
                        break;
                    }
                }
            }
            // Dropping the senders closes both channels.
        });

        Ok((content_rx, err_rx))
    }

    async fn models(&self) -> Result<Vec<Model>, ProviderError> {
        self.inner.ensure_initialized()?;
        match self
            .inner
            .list_model_ids(self.inner.config.timeout())
            .await
        {
            Ok(ids) => Ok(ids
                .into_iter()
                .map(|id| Model {
                    name: id.clone(),
                    id,
                    ..Default::default()
                })
                .collect()),
            // The static vendor catalog stands in when the live listing
            // is unavailable.
            Err(err) if !self.inner.catalog.is_empty() => {
                debug!(error = %err, "model listing failed, serving static catalog");
                Ok(self.inner.catalog.clone())
            }
            Err(err) => Err(err),
        }
    }
}
