//! Text-to-speech over SpeechKit v3 gRPC.
//!
//! Two paths are kept on purpose: `synthesize` uses the single-shot
//! `UtteranceSynthesis` RPC and concatenates the streamed chunks, while
//! the streaming client uses the bidirectional `StreamSynthesis` RPC —
//! they target different latency/quality trade-offs on the wire.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::error::ProviderError;
use crate::core::models::{TtsConfig, Voice};
use crate::core::providers::ws::ClientState;
use crate::core::services::{TtsService, TtsStream};

use super::proto::tts as pb;
use super::proto::SynthesizerClient;
use super::provider::{authorize_request, connect_channel, YandexInner};

/// Audio channel depth between the consumer task and `receive`.
const AUDIO_BUFFER: usize = 16;
const REQUEST_BUFFER: usize = 16;
/// Cap on forwarding one chunk to a stuck consumer.
const CHANNEL_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Selects the interpretation of the `volume` scalar from request
/// options; LUFS is the default regime.
pub(crate) fn loudness_from_options(
    options: &HashMap<String, Value>,
) -> pb::LoudnessNormalizationType {
    match options
        .get("loudness_normalization")
        .and_then(Value::as_str)
    {
        Some("max_peak") => pb::LoudnessNormalizationType::MaxPeak,
        _ => pb::LoudnessNormalizationType::Lufs,
    }
}

/// Applies the volume policy once, before any wire frame is emitted:
/// LUFS clamps to [-145, 0) with default -19 (positive inputs
/// re-defaulted); max-peak clamps to (0, 1] with default 0.7
/// (non-positive inputs re-defaulted).
pub(crate) fn apply_loudness_policy(volume: f64, loudness: pb::LoudnessNormalizationType) -> f64 {
    match loudness {
        pb::LoudnessNormalizationType::Lufs => {
            let mut volume = volume;
            if volume > 0.0 {
                volume = -19.0;
            }
            if volume < -145.0 {
                volume = -145.0;
            }
            volume
        }
        _ => {
            let mut volume = volume;
            if volume <= 0.0 {
                volume = 0.7;
            }
            if volume > 1.0 {
                volume = 1.0;
            }
            volume
        }
    }
}

fn role_from_options(options: &HashMap<String, Value>) -> String {
    options
        .get("role")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn raw_audio_spec(sample_rate: u32) -> pb::AudioFormatOptions {
    pb::AudioFormatOptions {
        audio_format: Some(pb::audio_format_options::AudioFormat::RawAudio(
            pb::RawAudio {
                audio_encoding: pb::raw_audio::AudioEncoding::Linear16Pcm as i32,
                sample_rate_hertz: i64::from(sample_rate),
            },
        )),
    }
}

fn apply_stream_defaults(config: &mut TtsConfig) {
    if config.voice.is_empty() {
        config.voice = "ermil".to_string();
    }
    if config.language.is_empty() {
        config.language = "ru-RU".to_string();
    }
    apply_shared_defaults(config);
}

fn apply_synthesize_defaults(config: &mut TtsConfig) {
    if config.voice.is_empty() {
        config.voice = "alena".to_string();
    }
    apply_shared_defaults(config);
}

fn apply_shared_defaults(config: &mut TtsConfig) {
    if config.sample_rate == 0 {
        config.sample_rate = 22_050;
    }
    if config.encoding.is_empty() {
        config.encoding = "linear16".to_string();
    }
    if config.speed == 0.0 {
        config.speed = 1.0;
    }
    if config.volume == 0.0 {
        // LUFS default.
        config.volume = -19.0;
    }
}

fn build_synthesis_options(config: &TtsConfig) -> pb::SynthesisOptions {
    let loudness = loudness_from_options(&config.options);
    pb::SynthesisOptions {
        model: config.model.clone(),
        voice: config.voice.clone(),
        role: role_from_options(&config.options),
        speed: config.speed,
        volume: apply_loudness_policy(config.volume, loudness),
        pitch_shift: config.pitch,
        output_audio_spec: Some(raw_audio_spec(config.sample_rate)),
        loudness_normalization_type: loudness as i32,
    }
}

fn build_utterance_request(text: &str, config: &TtsConfig) -> pb::UtteranceSynthesisRequest {
    let loudness = loudness_from_options(&config.options);
    let volume = apply_loudness_policy(config.volume, loudness);

    let mut hints = vec![
        pb::Hints {
            hint: Some(pb::hints::Hint::Voice(config.voice.clone())),
        },
        pb::Hints {
            hint: Some(pb::hints::Hint::Speed(config.speed)),
        },
        pb::Hints {
            hint: Some(pb::hints::Hint::Volume(volume)),
        },
    ];
    if config.pitch != 0.0 {
        hints.push(pb::Hints {
            hint: Some(pb::hints::Hint::PitchShift(config.pitch)),
        });
    }
    let role = role_from_options(&config.options);
    if !role.is_empty() {
        hints.push(pb::Hints {
            hint: Some(pb::hints::Hint::Role(role)),
        });
    }

    pb::UtteranceSynthesisRequest {
        model: config.model.clone(),
        utterance: Some(pb::utterance_synthesis_request::Utterance::Text(
            text.to_string(),
        )),
        hints,
        output_audio_spec: Some(raw_audio_spec(config.sample_rate)),
        loudness_normalization_type: loudness as i32,
        unsafe_mode: false,
    }
}

/// Streaming client for one synthesis session. The RPC is opened lazily
/// on the first `send`, which emits the `SynthesisOptions` frame.
pub struct YandexTtsStream {
    inner: Arc<YandexInner>,
    config: TtsConfig,
    session: tokio::sync::Mutex<Option<mpsc::Sender<pb::StreamSynthesisRequest>>>,
    audio_tx: mpsc::Sender<Bytes>,
    state: Arc<Mutex<ClientState>>,
    audio_rx: tokio::sync::Mutex<mpsc::Receiver<Bytes>>,
    err_rx: tokio::sync::Mutex<mpsc::Receiver<ProviderError>>,
    err_tx: mpsc::Sender<ProviderError>,
    done: CancellationToken,
}

impl YandexTtsStream {
    pub(crate) fn new(inner: Arc<YandexInner>, mut config: TtsConfig) -> Self {
        apply_stream_defaults(&mut config);
        let (audio_tx, audio_rx) = mpsc::channel(AUDIO_BUFFER);
        let (err_tx, err_rx) = mpsc::channel(1);
        Self {
            inner,
            config,
            session: tokio::sync::Mutex::new(None),
            audio_tx,
            state: Arc::new(Mutex::new(ClientState::Init)),
            audio_rx: tokio::sync::Mutex::new(audio_rx),
            err_rx: tokio::sync::Mutex::new(err_rx),
            err_tx,
            done: CancellationToken::new(),
        }
    }

    async fn init_session(&self) -> Result<mpsc::Sender<pb::StreamSynthesisRequest>, ProviderError> {
        let channel = connect_channel(&self.inner.tts_endpoint()).await?;
        let mut client = SynthesizerClient::new(channel);

        let options = build_synthesis_options(&self.config);
        debug!(
            voice = %options.voice,
            speed = options.speed,
            volume = options.volume,
            "initializing Yandex TTS stream"
        );

        let (request_tx, mut request_rx) =
            mpsc::channel::<pb::StreamSynthesisRequest>(REQUEST_BUFFER);
        let request_stream = async_stream::stream! {
            yield pb::StreamSynthesisRequest {
                event: Some(pb::stream_synthesis_request::Event::Options(options)),
            };
            while let Some(request) = request_rx.recv().await {
                yield request;
            }
        };

        let mut request = tonic::Request::new(request_stream);
        authorize_request(
            &mut request,
            self.inner.api_key(),
            Some(&self.inner.folder_id),
        )?;

        let response = client
            .stream_synthesis(request)
            .await
            .map_err(|status| ProviderError::from_grpc_status(&status))?;

        tokio::spawn(read_loop(
            response.into_inner(),
            self.audio_tx.clone(),
            self.err_tx.clone(),
            self.state.clone(),
            self.done.clone(),
        ));

        Ok(request_tx)
    }
}

async fn read_loop(
    mut responses: tonic::codec::Streaming<pb::StreamSynthesisResponse>,
    audio_tx: mpsc::Sender<Bytes>,
    err_tx: mpsc::Sender<ProviderError>,
    state: Arc<Mutex<ClientState>>,
    done: CancellationToken,
) {
    let mut chunk_count = 0u64;
    let mut total_bytes = 0usize;

    loop {
        let message = tokio::select! {
            _ = done.cancelled() => break,
            message = responses.message() => message,
        };

        match message {
            Ok(Some(response)) => {
                let Some(chunk) = response.audio_chunk else {
                    continue;
                };
                if chunk.data.is_empty() {
                    continue;
                }
                chunk_count += 1;
                total_bytes += chunk.data.len();

                let forwarded = tokio::select! {
                    _ = done.cancelled() => break,
                    sent = audio_tx.send_timeout(Bytes::from(chunk.data), CHANNEL_SEND_TIMEOUT) => sent,
                };
                match forwarded {
                    Ok(()) => {}
                    Err(SendTimeoutError::Timeout(_)) => {
                        warn!(chunk_number = chunk_count, "timeout sending TTS chunk to channel");
                        break;
                    }
                    Err(SendTimeoutError::Closed(_)) => break,
                }
            }
            Ok(None) => {
                debug!(chunks = chunk_count, total_bytes, "TTS stream ended");
                break;
            }
            Err(status) => {
                let was_closed = *state.lock() == ClientState::Closed;
                if !was_closed {
                    let _ = err_tx.try_send(ProviderError::from_grpc_status(&status));
                }
                break;
            }
        }
    }

    *state.lock() = ClientState::Closed;
    done.cancel();
}

#[async_trait]
impl TtsStream for YandexTtsStream {
    async fn send(&self, text: &str) -> Result<(), ProviderError> {
        match *self.state.lock() {
            ClientState::Draining | ClientState::Closed => return Err(ProviderError::Closed),
            ClientState::Init | ClientState::Open => {}
        }

        let mut session = self.session.lock().await;
        if session.is_none() {
            let request_tx = self.init_session().await?;
            *session = Some(request_tx);
            *self.state.lock() = ClientState::Open;
        }
        if text.is_empty() {
            return Ok(());
        }

        let request_tx = match session.as_ref() {
            Some(tx) => tx.clone(),
            None => return Err(ProviderError::Closed),
        };
        drop(session);

        debug!(length = text.len(), "sending TTS text");
        request_tx
            .send(pb::StreamSynthesisRequest {
                event: Some(pb::stream_synthesis_request::Event::SynthesisInput(
                    pb::SynthesisInput {
                        text: text.to_string(),
                    },
                )),
            })
            .await
            .map_err(|_| ProviderError::Closed)
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

        // Dropping the sender ends the request stream (CloseSend); the
        // consumer then drains the server side and cancels `done`.
        self.session.lock().await.take();
        self.done.cancel();
        Ok(())
    }
}

/// Yandex TTS service facade.
pub struct YandexTtsService {
    pub(crate) inner: Arc<YandexInner>,
}

#[async_trait]
impl TtsService for YandexTtsService {
    /// Single-shot synthesis over the `UtteranceSynthesis` RPC.
    async fn synthesize(&self, text: &str, config: TtsConfig) -> Result<Vec<u8>, ProviderError> {
        self.inner.ensure_initialized()?;

        let mut config = config;
        apply_synthesize_defaults(&mut config);
        debug!(text_length = text.len(), "starting TTS synthesis");

        let channel = connect_channel(&self.inner.tts_endpoint()).await?;
        let mut client = SynthesizerClient::new(channel);

        let mut request = tonic::Request::new(build_utterance_request(text, &config));
        authorize_request(
            &mut request,
            self.inner.api_key(),
            Some(&self.inner.folder_id),
        )?;

        let mut responses = client
            .utterance_synthesis(request)
            .await
            .map_err(|status| ProviderError::from_grpc_status(&status))?
            .into_inner();

        let mut audio = Vec::new();
        let mut chunk_count = 0u64;
        loop {
            match responses.message().await {
                Ok(Some(response)) => {
                    if let Some(chunk) = response.audio_chunk {
                        if !chunk.data.is_empty() {
                            chunk_count += 1;
                            audio.extend_from_slice(&chunk.data);
                        }
                    }
                }
                Ok(None) => {
                    debug!(chunks = chunk_count, total_bytes = audio.len(), "TTS synthesis completed");
                    break;
                }
                Err(status) => return Err(ProviderError::from_grpc_status(&status)),
            }
        }

        Ok(audio)
    }

    async fn new_tts_stream(
        &self,
        config: TtsConfig,
    ) -> Result<Arc<dyn TtsStream>, ProviderError> {
        self.inner.ensure_initialized()?;
        Ok(Arc::new(YandexTtsStream::new(self.inner.clone(), config)))
    }

    async fn voices(&self) -> Result<Vec<Voice>, ProviderError> {
        Ok(vec![
            Voice {
                id: "alena".to_string(),
                name: "Alena".to_string(),
                language: "ru-RU".to_string(),
                gender: "female".to_string(),
                description: "Russian female voice with neutral tone".to_string(),
                ..Default::default()
            },
            Voice {
                id: "filipp".to_string(),
                name: "Filipp".to_string(),
                language: "ru-RU".to_string(),
                gender: "male".to_string(),
                description: "Russian male voice with neutral tone".to_string(),
                ..Default::default()
            },
            Voice {
                id: "ermil".to_string(),
                name: "Ermil".to_string(),
                language: "ru-RU".to_string(),
                gender: "male".to_string(),
                description: "Russian male voice with emotional tone".to_string(),
                ..Default::default()
            },
            Voice {
                id: "jane".to_string(),
                name: "Jane".to_string(),
                language: "ru-RU".to_string(),
                gender: "female".to_string(),
                description: "Russian female voice with emotional tone".to_string(),
                ..Default::default()
            },
            Voice {
                id: "omazh".to_string(),
                name: "Omazh".to_string(),
                language: "ru-RU".to_string(),
                gender: "female".to_string(),
                description: "Russian female voice with calm tone".to_string(),
                ..Default::default()
            },
            Voice {
                id: "zahar".to_string(),
                name: "Zahar".to_string(),
                language: "ru-RU".to_string(),
                gender: "male".to_string(),
                description: "Russian male voice with calm tone".to_string(),
                ..Default::default()
            },
            Voice {
                id: "john".to_string(),
                name: "John".to_string(),
                language: "en-US".to_string(),
                gender: "male".to_string(),
                description: "English male voice".to_string(),
                ..Default::default()
            },
            Voice {
                id: "amira".to_string(),
                name: "Amira".to_string(),
                language: "kk-KK".to_string(),
                gender: "female".to_string(),
                description: "Kazakh female voice".to_string(),
                ..Default::default()
            },
            Voice {
                id: "madi".to_string(),
                name: "Madi".to_string(),
                language: "kk-KK".to_string(),
                gender: "male".to_string(),
                description: "Kazakh male voice".to_string(),
                ..Default::default()
            },
            Voice {
                id: "nigora".to_string(),
                name: "Nigora".to_string(),
                language: "uz-UZ".to_string(),
                gender: "female".to_string(),
                description: "Uzbek female voice".to_string(),
                ..Default::default()
            },
        ])
    }
}
