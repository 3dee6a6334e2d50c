//! Streaming speech-to-text over the Cartesia WebSocket API.
//!
//! Upstream: binary audio frames plus two text control frames — the
//! literal `"finalize"` (flush buffered audio, connection stays open) and
//! `"done"` (end the session). Downstream: JSON frames tagged by `type`.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::error::ProviderError;
use crate::core::models::{Model, SttConfig, SttResult, WordInfo};
use crate::core::providers::ws::{self, ClientState, WsStream};
use crate::core::services::{collect_transcript, SttService, SttStream};

use super::messages::{SttEvent, TranscriptEvent};
use super::provider::{CartesiaInner, STT_API_VERSION};

const RESULT_BUFFER: usize = 10;

fn apply_defaults(config: &mut SttConfig) {
    if config.model.is_empty() {
        config.model = "ink-whisper".to_string();
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

fn build_stt_url(base_url: &str, config: &SttConfig) -> Result<String, ProviderError> {
    // Defaults: 5% volume threshold, one second of trailing silence.
    let min_volume = config
        .options
        .get("min_volume")
        .and_then(Value::as_f64)
        .unwrap_or(0.05);
    let max_silence = config
        .options
        .get("max_silence_duration_secs")
        .and_then(Value::as_f64)
        .unwrap_or(1.0);

    let mut url = url::Url::parse(base_url)
        .and_then(|u| u.join("/stt/websocket"))
        .map_err(|e| ProviderError::Configuration(format!("invalid base URL {base_url}: {e}")))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("model", &config.model);
        query.append_pair("language", &config.language);
        query.append_pair("encoding", &config.encoding);
        query.append_pair("sample_rate", &config.sample_rate.to_string());
        query.append_pair("min_volume", &min_volume.to_string());
        query.append_pair("max_silence_duration_secs", &max_silence.to_string());
    }
    Ok(url.to_string())
}

fn transcript_to_result(event: TranscriptEvent) -> SttResult {
    SttResult {
        text: event.text,
        is_final: event.is_final,
        words: event
            .words
            .into_iter()
            .map(|w| WordInfo {
                word: w.word,
                start_time: w.start,
                end_time: w.end,
                confidence: 0.0,
            })
            .collect(),
        ..Default::default()
    }
}

/// Streaming client for one Cartesia STT session.
pub struct CartesiaSttStream {
    writer: tokio::sync::Mutex<SplitSink<WsStream, Message>>,
    state: Arc<Mutex<ClientState>>,
    result_rx: tokio::sync::Mutex<mpsc::Receiver<SttResult>>,
    err_rx: tokio::sync::Mutex<mpsc::Receiver<ProviderError>>,
    done: CancellationToken,
}

impl CartesiaSttStream {
    pub(crate) async fn connect(
        base_url: &str,
        api_key: &str,
        mut config: SttConfig,
    ) -> Result<Self, ProviderError> {
        apply_defaults(&mut config);
        let url = build_stt_url(base_url, &config)?;

        let stream = ws::connect(
            &url,
            &[
                ("X-API-Key", api_key.to_string()),
                ("Cartesia-Version", STT_API_VERSION.to_string()),
            ],
        )
        .await?;
        debug!(model = %config.model, language = %config.language, "connected to Cartesia STT");

        let (writer, reader) = stream.split();
        let (result_tx, result_rx) = mpsc::channel(RESULT_BUFFER);
        let (err_tx, err_rx) = mpsc::channel(1);
        let state = Arc::new(Mutex::new(ClientState::Open));
        let done = CancellationToken::new();

        tokio::spawn(read_loop(
            reader,
            result_tx,
            err_tx,
            state.clone(),
            done.clone(),
        ));

        Ok(Self {
            writer: tokio::sync::Mutex::new(writer),
            state,
            result_rx: tokio::sync::Mutex::new(result_rx),
            err_rx: tokio::sync::Mutex::new(err_rx),
            done,
        })
    }

    /// Signals end of audio by sending the `"done"` control frame and
    /// marks the client closed; remaining results drain through
    /// `receive`.
    pub async fn flush(&self) -> Result<(), ProviderError> {
        {
            let mut state = self.state.lock();
            if *state == ClientState::Closed {
                return Ok(());
            }
            *state = ClientState::Closed;
        }

        self.writer
            .lock()
            .await
            .send(Message::Text("done".into()))
            .await
            .map_err(|e| ProviderError::Network(format!("failed to send done command: {e}")))
    }
}

async fn read_loop(
    mut reader: SplitStream<WsStream>,
    result_tx: mpsc::Sender<SttResult>,
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
                let event: SttEvent = match serde_json::from_str(text.as_str()) {
                    Ok(event) => event,
                    Err(_) => continue,
                };
                match event {
                    SttEvent::Transcript(transcript) => {
                        let result = transcript_to_result(transcript);
                        tokio::select! {
                            _ = done.cancelled() => break,
                            sent = result_tx.send(result) => {
                                if sent.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    SttEvent::FlushDone => {
                        // Connection stays open; nothing to surface.
                    }
                    SttEvent::Done => break,
                    SttEvent::Error(error) => {
                        let _ = err_tx.try_send(ProviderError::Upstream(format!(
                            "Cartesia STT error: {}",
                            error.stt_message()
                        )));
                        break;
                    }
                    SttEvent::Unknown => {}
                }
            }
            Some(Ok(Message::Close(_))) => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                let was_closed = *state.lock() == ClientState::Closed;
                if !was_closed {
                    let _ =
                        err_tx.try_send(ProviderError::Network(format!("STT read error: {e}")));
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
impl SttStream for CartesiaSttStream {
    async fn send(&self, audio: &[u8]) -> Result<(), ProviderError> {
        match *self.state.lock() {
            ClientState::Draining | ClientState::Closed => return Err(ProviderError::Closed),
            ClientState::Init | ClientState::Open => {}
        }

        self.writer
            .lock()
            .await
            .send(Message::Binary(audio.to_vec().into()))
            .await
            .map_err(|e| ProviderError::Network(format!("failed to send audio: {e}")))
    }

    async fn receive(&self) -> Result<Option<SttResult>, ProviderError> {
        let mut results = self.result_rx.lock().await;
        let mut errors = self.err_rx.lock().await;
        tokio::select! {
            biased;
            Some(result) = results.recv() => Ok(Some(result)),
            Some(err) = errors.recv() => Err(err),
            _ = self.done.cancelled() => Ok(None),
        }
    }

    /// Sends the `"finalize"` control frame: the server flushes buffered
    /// audio and emits a transcript while the connection stays open.
    async fn finalize(&self) -> Result<(), ProviderError> {
        {
            let mut state = self.state.lock();
            match *state {
                ClientState::Closed => return Ok(()),
                ClientState::Draining => return Ok(()),
                _ => *state = ClientState::Draining,
            }
        }

        self.writer
            .lock()
            .await
            .send(Message::Text("finalize".into()))
            .await
            .map_err(|e| ProviderError::Network(format!("failed to send finalize command: {e}")))
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
            debug!(error = %e, "error closing Cartesia STT writer");
        }
        Ok(())
    }
}

/// Cartesia STT service facade.
pub struct CartesiaSttService {
    pub(crate) inner: Arc<CartesiaInner>,
}

#[async_trait]
impl SttService for CartesiaSttService {
    async fn transcribe(&self, audio: &[u8], config: SttConfig) -> Result<String, ProviderError> {
        let stream = self.new_stt_stream(config).await?;
        collect_transcript(stream, audio).await
    }

    async fn new_stt_stream(
        &self,
        config: SttConfig,
    ) -> Result<Arc<dyn SttStream>, ProviderError> {
        self.inner.ensure_initialized()?;
        let stream =
            CartesiaSttStream::connect(&self.inner.base_url, self.inner.api_key(), config).await?;
        Ok(Arc::new(stream))
    }

    async fn models(&self) -> Result<Vec<Model>, ProviderError> {
        Ok(vec![Model {
            id: "ink-whisper".to_string(),
            name: "Ink Whisper".to_string(),
            description: "Fast and accurate streaming speech recognition model".to_string(),
            ..Default::default()
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_carries_silence_knobs() {
        let mut config = SttConfig::default();
        apply_defaults(&mut config);
        config
            .options
            .insert("min_volume".to_string(), Value::from(0.2));
        config
            .options
            .insert("max_silence_duration_secs".to_string(), Value::from(2.5));

        let url = build_stt_url("wss://api.cartesia.ai", &config).unwrap();
        assert!(url.starts_with("wss://api.cartesia.ai/stt/websocket?"));
        assert!(url.contains("model=ink-whisper"));
        assert!(url.contains("min_volume=0.2"));
        assert!(url.contains("max_silence_duration_secs=2.5"));
    }

    #[test]
    fn transcript_words_have_unit_confidence_absent() {
        let event = TranscriptEvent {
            text: "hello".to_string(),
            is_final: true,
            words: vec![super::super::messages::CartesiaWord {
                word: "hello".to_string(),
                start: 0.0,
                end: 0.4,
            }],
        };
        let result = transcript_to_result(event);
        assert_eq!(result.words.len(), 1);
        assert!(result.is_final);
    }
}
