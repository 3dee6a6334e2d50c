//! Capability contracts: the `Provider` trait, the four capability
//! service traits, and the uniform streaming client contracts.
//!
//! Every provider implements [`Provider`] and exposes the capabilities it
//! supports through the `chat` / `embedding` / `stt` / `tts` accessors.
//! Multi-capability vendors export additional single-capability wrapper
//! providers so the registry's capability index treats them
//! independently.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::core::capability::Capability;
use crate::core::error::ProviderError;
use crate::core::models::{
    ChatMessage, ChatOptions, Model, ProviderType, SttConfig, SttResult, TtsConfig, Voice,
};

/// A configured, initialized vendor client with a stable name and a
/// declared capability set.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Unique identifier for this provider within a registry.
    fn name(&self) -> &str;

    fn provider_type(&self) -> ProviderType;

    /// The capabilities this provider supports. Must be non-empty.
    fn capabilities(&self) -> Vec<Capability>;

    /// Probes the provider. Callers bound this with a deadline.
    async fn health_check(&self) -> Result<(), ProviderError>;

    /// Releases underlying resources. Idempotent.
    async fn close(&self) -> Result<(), ProviderError>;

    /// Chat capability handle, if this provider implements it.
    fn chat(&self) -> Option<Arc<dyn ChatService>> {
        None
    }

    /// Embedding capability handle, if this provider implements it.
    fn embedding(&self) -> Option<Arc<dyn EmbeddingService>> {
        None
    }

    /// STT capability handle, if this provider implements it.
    fn stt(&self) -> Option<Arc<dyn SttService>> {
        None
    }

    /// TTS capability handle, if this provider implements it.
    fn tts(&self) -> Option<Arc<dyn TtsService>> {
        None
    }
}

impl std::fmt::Debug for dyn ChatService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn ChatService")
    }
}

/// Chat completion over a request/response or streaming transport.
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Runs a chat completion and returns the first choice's message text.
    async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<String, ProviderError>;

    /// Streams a chat completion as a pair of channels: content deltas and
    /// errors. Both close when the upstream returns EOF or a terminal
    /// error.
    async fn stream_chat_completion(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<(mpsc::Receiver<String>, mpsc::Receiver<ProviderError>), ProviderError>;

    /// Lists the models available through this provider.
    async fn models(&self) -> Result<Vec<Model>, ProviderError>;
}

/// Embedding generation.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// Speech-to-text: one-shot transcription and per-call streaming clients.
#[async_trait]
pub trait SttService: Send + Sync {
    /// Transcribes a complete audio buffer. Implemented on top of the
    /// streaming client; final segments are joined with trailing spaces.
    async fn transcribe(&self, audio: &[u8], config: SttConfig) -> Result<String, ProviderError>;

    /// Opens a streaming transcription session.
    async fn new_stt_stream(&self, config: SttConfig)
        -> Result<Arc<dyn SttStream>, ProviderError>;

    /// Lists the recognition models this provider offers.
    async fn models(&self) -> Result<Vec<Model>, ProviderError>;
}

/// Text-to-speech: one-shot synthesis and per-call streaming clients.
#[async_trait]
pub trait TtsService: Send + Sync {
    /// Synthesizes a complete utterance and returns the audio bytes.
    async fn synthesize(&self, text: &str, config: TtsConfig) -> Result<Vec<u8>, ProviderError>;

    /// Opens a streaming synthesis session.
    async fn new_tts_stream(&self, config: TtsConfig)
        -> Result<Arc<dyn TtsStream>, ProviderError>;

    /// Lists the voices this provider offers.
    async fn voices(&self) -> Result<Vec<Voice>, ProviderError>;
}

/// Streaming speech-to-text session.
///
/// `send` and `receive` are safe to call from separate tasks. `close` is
/// idempotent and safe to call concurrently with `receive`; after `close`
/// returns, no further `send` succeeds and `receive` drains any queued
/// results before returning `Ok(None)` (EOF). When a result and an error
/// are both queued, queued results are delivered first, then the error,
/// then EOF; callers must treat any error as fatal to the stream.
#[async_trait]
pub trait SttStream: Send + Sync {
    /// Submits an audio frame. Sends are serialized internally.
    async fn send(&self, audio: &[u8]) -> Result<(), ProviderError>;

    /// Receives the next result; `Ok(None)` signals end of stream.
    async fn receive(&self) -> Result<Option<SttResult>, ProviderError>;

    /// Signals end of audio without closing the session; remaining
    /// results can still be drained with `receive`.
    async fn finalize(&self) -> Result<(), ProviderError>;

    /// Closes the session and releases the transport. Idempotent.
    async fn close(&self) -> Result<(), ProviderError>;
}

impl std::fmt::Debug for dyn TtsStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn TtsStream")
    }
}

/// Streaming text-to-speech session, same concurrency contract as
/// [`SttStream`].
#[async_trait]
pub trait TtsStream: Send + Sync {
    /// Submits text for synthesis.
    async fn send(&self, text: &str) -> Result<(), ProviderError>;

    /// Receives the next audio chunk; `Ok(None)` signals end of stream.
    async fn receive(&self) -> Result<Option<Bytes>, ProviderError>;

    /// Closes the session. Idempotent. Providers with a drain protocol
    /// (Minimax) keep the transport open until the peer confirms
    /// completion so trailing audio is still delivered through `receive`.
    async fn close(&self) -> Result<(), ProviderError>;
}

/// Audio chunk size used when feeding one-shot transcription through a
/// streaming client.
pub(crate) const TRANSCRIBE_CHUNK_SIZE: usize = 4096;

/// Drives a one-shot transcription over a streaming client: drains
/// results in a background task, sends the audio in chunks, finalizes,
/// and joins final segments with trailing spaces.
pub(crate) async fn collect_transcript(
    stream: Arc<dyn SttStream>,
    audio: &[u8],
) -> Result<String, ProviderError> {
    let reader = {
        let stream = stream.clone();
        tokio::spawn(async move {
            let mut full_text = String::new();
            loop {
                match stream.receive().await {
                    Ok(Some(result)) => {
                        if result.is_final {
                            full_text.push_str(&result.text);
                            full_text.push(' ');
                        }
                    }
                    Ok(None) => return Ok(full_text),
                    Err(err) => return Err(err),
                }
            }
        })
    };

    let feed = async {
        for chunk in audio.chunks(TRANSCRIBE_CHUNK_SIZE) {
            stream.send(chunk).await?;
        }
        stream.finalize().await
    };
    if let Err(err) = feed.await {
        reader.abort();
        let _ = stream.close().await;
        return Err(err);
    }

    let text = reader
        .await
        .map_err(|e| ProviderError::Upstream(format!("transcript reader task failed: {e}")))
        .and_then(|result| result);
    let _ = stream.close().await;
    text
}

/// Drains a TTS stream to completion, concatenating all audio chunks.
pub(crate) async fn collect_audio(stream: &Arc<dyn TtsStream>) -> Result<Vec<u8>, ProviderError> {
    let mut audio = Vec::new();
    while let Some(chunk) = stream.receive().await? {
        audio.extend_from_slice(&chunk);
    }
    Ok(audio)
}
