//! Streaming text-to-speech over the Cartesia WebSocket API.
//!
//! Each `send` emits one JSON synthesis request with a unique
//! `context_id`. Downstream audio arrives either as legacy binary frames
//! or as JSON `chunk` frames carrying base64 data.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::core::error::ProviderError;
use crate::core::models::{TtsConfig, Voice};
use crate::core::providers::ws::{self, ClientState, WsStream};
use crate::core::services::{collect_audio, TtsService, TtsStream};

use super::messages::TtsEvent;
use super::provider::{CartesiaInner, TTS_API_VERSION};

const AUDIO_BUFFER: usize = 10;

fn apply_defaults(config: &mut TtsConfig) {
    if config.model.is_empty() {
        config.model = "sonic-3".to_string();
    }
    if config.voice.is_empty() {
        // Default Sonic voice.
        config.voice = "694f9389-aac1-45b6-b726-9d9369183238".to_string();
    }
    if config.language.is_empty() {
        config.language = "en".to_string();
    }
    if config.sample_rate == 0 {
        config.sample_rate = 16_000;
    }
    if config.encoding.is_empty() {
        config.encoding = "pcm_s16le".to_string();
    }
}

/// Streaming client for one Cartesia TTS session.
pub struct CartesiaTtsStream {
    writer: tokio::sync::Mutex<SplitSink<WsStream, Message>>,
    config: TtsConfig,
    state: Arc<Mutex<ClientState>>,
    audio_rx: tokio::sync::Mutex<mpsc::Receiver<Bytes>>,
    err_rx: tokio::sync::Mutex<mpsc::Receiver<ProviderError>>,
    done: CancellationToken,
}

impl CartesiaTtsStream {
    pub(crate) async fn connect(
        base_url: &str,
        api_key: &str,
        mut config: TtsConfig,
    ) -> Result<Self, ProviderError> {
        apply_defaults(&mut config);

        let url = url::Url::parse(base_url)
            .and_then(|u| u.join("/tts/websocket"))
            .map_err(|e| {
                ProviderError::Configuration(format!("invalid base URL {base_url}: {e}"))
            })?;

        let stream = ws::connect(
            url.as_str(),
            &[
                ("X-API-Key", api_key.to_string()),
                ("Cartesia-Version", TTS_API_VERSION.to_string()),
            ],
        )
        .await?;
        debug!(model = %config.model, voice = %config.voice, "connected to Cartesia TTS");

        let (writer, reader) = stream.split();
        let (audio_tx, audio_rx) = mpsc::channel(AUDIO_BUFFER);
        let (err_tx, err_rx) = mpsc::channel(1);
        let state = Arc::new(Mutex::new(ClientState::Open));
        let done = CancellationToken::new();

        tokio::spawn(read_loop(
            reader,
            audio_tx,
            err_tx,
            state.clone(),
            done.clone(),
        ));

        Ok(Self {
            writer: tokio::sync::Mutex::new(writer),
            config,
            state,
            audio_rx: tokio::sync::Mutex::new(audio_rx),
            err_rx: tokio::sync::Mutex::new(err_rx),
            done,
        })
    }
}

async fn read_loop(
    mut reader: SplitStream<WsStream>,
    audio_tx: mpsc::Sender<Bytes>,
    err_tx: mpsc::Sender<ProviderError>,
    state: Arc<Mutex<ClientState>>,
    done: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            _ = done.cancelled() => break,
            message = reader.next() => message,
        };

        match message {
            Some(Ok(Message::Binary(data))) => {
                // Legacy: raw audio frames.
                tokio::select! {
                    _ = done.cancelled() => break,
                    sent = audio_tx.send(data) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            Some(Ok(Message::Text(text))) => {
                let event: TtsEvent = match serde_json::from_str(text.as_str()) {
                    Ok(event) => event,
                    Err(_) => continue,
                };
                match event {
                    TtsEvent::Chunk(chunk) => {
                        let audio = match base64::engine::general_purpose::STANDARD
                            .decode(&chunk.data)
                        {
                            Ok(audio) => audio,
                            Err(e) => {
                                debug!(error = %e, "skipping undecodable audio chunk");
                                continue;
                            }
                        };
                        debug!(size = audio.len(), "received audio chunk");
                        tokio::select! {
                            _ = done.cancelled() => break,
                            sent = audio_tx.send(Bytes::from(audio)) => {
                                if sent.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    TtsEvent::Done => break,
                    TtsEvent::Error(error) => {
                        let _ = err_tx.try_send(ProviderError::Upstream(format!(
                            "TTS error: {}",
                            error.tts_message()
                        )));
                        break;
                    }
                    TtsEvent::Unknown => {}
                }
            }
            Some(Ok(Message::Close(_))) => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                let was_closed = *state.lock() == ClientState::Closed;
                if !was_closed {
                    let _ =
                        err_tx.try_send(ProviderError::Network(format!("TTS read error: {e}")));
                }
                break;
            }
            None => break,
        }
    }

    *state.lock() = ClientState::Closed;
    done.cancel();
}

#[async_trait]
impl TtsStream for CartesiaTtsStream {
    async fn send(&self, text: &str) -> Result<(), ProviderError> {
        match *self.state.lock() {
            ClientState::Draining | ClientState::Closed => return Err(ProviderError::Closed),
            ClientState::Init | ClientState::Open => {}
        }

        let context_id = format!("ctx_{}", Uuid::new_v4().simple());
        let mut request = json!({
            "model_id": self.config.model,
            "transcript": text,
            "voice": { "mode": "id", "id": self.config.voice },
            "output_format": {
                "container": "raw",
                "encoding": self.config.encoding,
                "sample_rate": self.config.sample_rate,
            },
            "language": self.config.language,
            "context_id": context_id,
        });
        if self.config.speed > 0.0 {
            request["speed"] = json!(self.config.speed);
        }

        debug!(
            model = %self.config.model,
            voice = %self.config.voice,
            text_length = text.len(),
            context_id = %context_id,
            "sent TTS request"
        );

        self.writer
            .lock()
            .await
            .send(Message::Text(request.to_string().into()))
            .await
            .map_err(|e| ProviderError::Network(format!("failed to send TTS request: {e}")))
    }

    async fn receive(&self) -> Result<Option<Bytes>, ProviderError> {
        let mut audio = self.audio_rx.lock().await;
        let mut errors = self.err_rx.lock().await;
        tokio::select! {
            biased;
            Some(chunk) = audio.recv() => Ok(Some(chunk)),
            Some(err) = errors.recv() => Err(err),
            _ = self.done.cancelled() => Ok(None),
        }
    }

    async fn close(&self) -> Result<(), ProviderError> {
        {
            let mut state = self.state.lock();
            if *state == ClientState::Closed {
                return Ok(());
            }
            *state = ClientState::Closed;
        }

        self.done.cancel();
        if let Err(e) = self.writer.lock().await.close().await {
            debug!(error = %e, "error closing Cartesia TTS writer");
        }
        Ok(())
    }
}

/// Cartesia TTS service facade.
pub struct CartesiaTtsService {
    pub(crate) inner: Arc<CartesiaInner>,
}

#[async_trait]
impl TtsService for CartesiaTtsService {
    async fn synthesize(&self, text: &str, config: TtsConfig) -> Result<Vec<u8>, ProviderError> {
        let stream = self.new_tts_stream(config).await?;
        if let Err(err) = stream.send(text).await {
            let _ = stream.close().await;
            return Err(err);
        }
        let audio = collect_audio(&stream).await;
        let _ = stream.close().await;
        audio
    }

    async fn new_tts_stream(
        &self,
        config: TtsConfig,
    ) -> Result<Arc<dyn TtsStream>, ProviderError> {
        self.inner.ensure_initialized()?;
        let stream =
            CartesiaTtsStream::connect(&self.inner.base_url, self.inner.api_key(), config).await?;
        Ok(Arc::new(stream))
    }

    async fn voices(&self) -> Result<Vec<Voice>, ProviderError> {
        Ok(vec![
            Voice {
                id: "694f9389-aac1-45b6-b726-9d9369183238".to_string(),
                name: "Sonic (Default)".to_string(),
                language: "en".to_string(),
                gender: "neutral".to_string(),
                description: "Default Sonic voice with natural tone".to_string(),
                ..Default::default()
            },
            Voice {
                id: "a0e99841-438c-4a64-b679-ae501e7d6091".to_string(),
                name: "Barbershop Man".to_string(),
                language: "en".to_string(),
                gender: "male".to_string(),
                description: "Friendly male voice".to_string(),
                ..Default::default()
            },
            Voice {
                id: "79a125e8-cd45-4c13-8a67-188112f4dd22".to_string(),
                name: "British Lady".to_string(),
                language: "en".to_string(),
                gender: "female".to_string(),
                description: "British accent female voice".to_string(),
                ..Default::default()
            },
            Voice {
                id: "2ee87190-8f84-4925-97da-e52547f9462c".to_string(),
                name: "Calm Lady".to_string(),
                language: "en".to_string(),
                gender: "female".to_string(),
                description: "Calm and soothing female voice".to_string(),
                ..Default::default()
            },
        ])
    }
}
