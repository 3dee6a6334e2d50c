//! Streaming text-to-speech over the Minimax T2A v2 WebSocket protocol.
//!
//! The session is a three-step handshake (`connected_success` →
//! `task_start`/`task_started`), then `task_continue` frames carry text
//! upstream and `task_continued` frames carry hex-encoded audio
//! downstream. `close` sends `task_finish` but defers tearing down the
//! transport until the peer's `task_finished` arrives, so trailing audio
//! is still drained through `receive`.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::error::ProviderError;
use crate::core::models::{TtsConfig, Voice};
use crate::core::providers::ws::{self, ClientState, WsStream};
use crate::core::services::{collect_audio, TtsService, TtsStream};

use super::provider::MinimaxInner;

const AUDIO_BUFFER: usize = 10;

/// One downstream frame, dispatched on `event`.
#[derive(Debug, Deserialize)]
struct TaskEvent {
    #[serde(default)]
    event: String,
    #[serde(default)]
    data: Option<TaskData>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TaskData {
    #[serde(default)]
    audio: String,
}

impl TaskEvent {
    fn failure_message(&self) -> String {
        self.error
            .clone()
            .filter(|e| !e.is_empty())
            .or_else(|| self.message.clone().filter(|m| !m.is_empty()))
            .unwrap_or_else(|| "unknown TTS error".to_string())
    }
}

fn apply_defaults(inner: &MinimaxInner, config: &mut TtsConfig) {
    if config.model.is_empty() {
        config.model = if inner.config.model.is_empty() {
            "speech-2.6-hd".to_string()
        } else {
            inner.config.model.clone()
        };
    }
    if config.language.is_empty() {
        config.language = "en".to_string();
    }
    if config.voice.is_empty() {
        config.voice = inner.default_voice_for_language(&config.language);
    }
    if config.sample_rate == 0 {
        config.sample_rate = inner.options.sample_rate.unwrap_or(32_000);
    }
    if config.encoding.is_empty() {
        config.encoding = inner
            .options
            .format
            .clone()
            .unwrap_or_else(|| "mp3".to_string());
    }
    if config.speed == 0.0 {
        config.speed = inner.options.speed.unwrap_or(1.0);
    }
    if config.volume == 0.0 {
        config.volume = inner.options.volume.unwrap_or(1.0);
    }
}

/// Streaming client for one T2A session.
pub struct MinimaxTtsStream {
    writer: tokio::sync::Mutex<SplitSink<WsStream, Message>>,
    state: Arc<Mutex<ClientState>>,
    audio_rx: tokio::sync::Mutex<mpsc::Receiver<Bytes>>,
    err_rx: tokio::sync::Mutex<mpsc::Receiver<ProviderError>>,
    done: CancellationToken,
}

impl MinimaxTtsStream {
    pub(crate) async fn connect(
        inner: &MinimaxInner,
        mut config: TtsConfig,
    ) -> Result<Self, ProviderError> {
        apply_defaults(inner, &mut config);

        let url = url::Url::parse(&inner.base_url)
            .and_then(|u| u.join("/ws/v1/t2a_v2"))
            .map_err(|e| {
                ProviderError::Configuration(format!(
                    "invalid base URL {}: {e}",
                    inner.base_url
                ))
            })?;

        let mut stream = ws::connect(
            url.as_str(),
            &[("Authorization", format!("Bearer {}", inner.api_key()))],
        )
        .await?;

        // Step 1: the server confirms the connection.
        expect_event(&mut stream, "connected_success").await?;

        // Step 2: open the synthesis task.
        let task_start = json!({
            "event": "task_start",
            "model": config.model,
            "voice_setting": {
                "voice_id": config.voice,
                "speed": config.speed,
                "vol": config.volume,
                "pitch": config.pitch,
                "english_normalization": false,
            },
            "audio_setting": {
                "sample_rate": config.sample_rate,
                "bitrate": 128_000,
                "format": config.encoding,
                "channel": 1,
            },
        });
        stream
            .send(Message::Text(task_start.to_string().into()))
            .await
            .map_err(|e| ProviderError::Network(format!("failed to send task_start: {e}")))?;

        // Step 3: the server acknowledges the task.
        expect_event(&mut stream, "task_started").await?;

        debug!(model = %config.model, voice = %config.voice, "Minimax TTS task started");

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
            state,
            audio_rx: tokio::sync::Mutex::new(audio_rx),
            err_rx: tokio::sync::Mutex::new(err_rx),
            done,
        })
    }
}

/// Reads one frame and checks its `event` tag.
async fn expect_event(stream: &mut WsStream, expected: &str) -> Result<(), ProviderError> {
    loop {
        let message = stream.next().await.ok_or_else(|| {
            ProviderError::ConnectionFailed(format!(
                "connection closed while waiting for {expected}"
            ))
        })?;
        let message =
            message.map_err(|e| ProviderError::Network(format!("handshake read error: {e}")))?;

        match message {
            Message::Text(text) => {
                let event: TaskEvent = serde_json::from_str(text.as_str()).map_err(|e| {
                    ProviderError::Protocol(format!("malformed handshake frame: {e}"))
                })?;
                if event.event == expected {
                    return Ok(());
                }
                if event.event == "task_failed" {
                    return Err(ProviderError::Upstream(format!(
                        "TTS task failed: {}",
                        event.failure_message()
                    )));
                }
                return Err(ProviderError::Protocol(format!(
                    "unexpected event {:?} while waiting for {expected}",
                    event.event
                )));
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            other => {
                return Err(ProviderError::Protocol(format!(
                    "unexpected frame while waiting for {expected}: {other:?}"
                )));
            }
        }
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
            Some(Ok(Message::Text(text))) => {
                let event: TaskEvent = match serde_json::from_str(text.as_str()) {
                    Ok(event) => event,
                    Err(_) => continue,
                };
                match event.event.as_str() {
                    "task_continued" => {
                        let Some(data) = &event.data else { continue };
                        if data.audio.is_empty() {
                            continue;
                        }
                        let audio = match hex::decode(&data.audio) {
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
                    "task_finished" => break,
                    "task_failed" => {
                        let _ = err_tx.try_send(ProviderError::Upstream(format!(
                            "TTS task failed: {}",
                            event.failure_message()
                        )));
                        break;
                    }
                    _ => {}
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
impl TtsStream for MinimaxTtsStream {
    async fn send(&self, text: &str) -> Result<(), ProviderError> {
        match *self.state.lock() {
            ClientState::Draining | ClientState::Closed => return Err(ProviderError::Closed),
            ClientState::Init | ClientState::Open => {}
        }

        let request = json!({ "event": "task_continue", "text": text });
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

    /// Sends `task_finish` and leaves the transport open: the consumer
    /// keeps delivering `task_continued` audio until the peer's
    /// `task_finished` arrives, which is what actually ends the session.
    async fn close(&self) -> Result<(), ProviderError> {
        {
            let mut state = self.state.lock();
            match *state {
                ClientState::Closed | ClientState::Draining => return Ok(()),
                _ => *state = ClientState::Draining,
            }
        }

        let finish = json!({ "event": "task_finish" });
        let write_result = self
            .writer
            .lock()
            .await
            .send(Message::Text(finish.to_string().into()))
            .await;

        if let Err(e) = write_result {
            // Could not ask the peer to finish; tear down immediately.
            *self.state.lock() = ClientState::Closed;
            self.done.cancel();
            if let Err(close_err) = self.writer.lock().await.close().await {
                debug!(error = %close_err, "error closing Minimax writer");
            }
            return Err(ProviderError::Network(format!(
                "failed to send task_finish: {e}"
            )));
        }

        Ok(())
    }
}

/// Minimax TTS service facade.
pub struct MinimaxTtsService {
    pub(crate) inner: Arc<MinimaxInner>,
}

#[async_trait]
impl TtsService for MinimaxTtsService {
    async fn synthesize(&self, text: &str, config: TtsConfig) -> Result<Vec<u8>, ProviderError> {
        let stream = self.new_tts_stream(config).await?;
        stream.send(text).await?;
        // The peer only reports completion after task_finish, so close
        // before draining; trailing audio still arrives through receive.
        stream.close().await?;
        collect_audio(&stream).await
    }

    async fn new_tts_stream(
        &self,
        config: TtsConfig,
    ) -> Result<Arc<dyn TtsStream>, ProviderError> {
        self.inner.ensure_initialized()?;
        let stream = MinimaxTtsStream::connect(&self.inner, config).await?;
        Ok(Arc::new(stream))
    }

    async fn voices(&self) -> Result<Vec<Voice>, ProviderError> {
        Ok(self.inner.voice_catalog())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_message_prefers_error_field() {
        let event: TaskEvent = serde_json::from_str(
            r#"{"event":"task_failed","error":"quota exceeded","message":"other"}"#,
        )
        .unwrap();
        assert_eq!(event.failure_message(), "quota exceeded");

        let event: TaskEvent =
            serde_json::from_str(r#"{"event":"task_failed","message":"only message"}"#).unwrap();
        assert_eq!(event.failure_message(), "only message");
    }

    #[test]
    fn audio_frames_parse() {
        let event: TaskEvent =
            serde_json::from_str(r#"{"event":"task_continued","data":{"audio":"deadbeef"}}"#)
                .unwrap();
        assert_eq!(event.data.unwrap().audio, "deadbeef");
    }
}
