//! Streaming speech-to-text over the Deepgram Listen v1 WebSocket API.
//!
//! Upstream frames are binary audio; downstream frames are JSON tagged by
//! `type`. Finalization is the text frame `{"type":"CloseStream"}`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::error::ProviderError;
use crate::core::models::{Model, SttConfig, SttResult, WordInfo};
use crate::core::providers::ws::{self, ClientState, WsStream};
use crate::core::services::{collect_transcript, SttService, SttStream};

use super::provider::DeepgramInner;

const RESULT_BUFFER: usize = 10;

/// One downstream frame from the Listen API.
#[derive(Debug, Deserialize)]
struct ListenMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    channel: Option<ChannelField>,
    #[serde(default)]
    is_final: Option<bool>,
    #[serde(default)]
    speech_final: Option<bool>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    start: Option<f64>,
}

/// `channel` arrives as an object in the current format and as a
/// single-element array in the legacy one; both shapes are accepted.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChannelField {
    Object(ListenChannel),
    Array(Vec<ListenChannel>),
}

impl ChannelField {
    fn into_channel(self) -> Option<ListenChannel> {
        match self {
            ChannelField::Object(channel) => Some(channel),
            ChannelField::Array(channels) => channels.into_iter().next(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListenChannel {
    #[serde(default)]
    alternatives: Vec<ListenAlternative>,
}

#[derive(Debug, Deserialize)]
struct ListenAlternative {
    #[serde(default)]
    transcript: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    words: Option<Vec<ListenWord>>,
}

#[derive(Debug, Deserialize)]
struct ListenWord {
    #[serde(default)]
    word: String,
    #[serde(default)]
    start: f64,
    #[serde(default)]
    end: f64,
    #[serde(default)]
    confidence: f64,
}

fn parse_results(message: ListenMessage) -> Option<SttResult> {
    let mut result = SttResult {
        is_final: message.is_final.unwrap_or(false),
        ..Default::default()
    };
    let mut metadata = HashMap::new();
    if let Some(speech_final) = message.speech_final {
        metadata.insert("speech_final".to_string(), Value::from(speech_final));
    }
    if let Some(duration) = message.duration {
        result.end_time = duration;
        metadata.insert("duration".to_string(), Value::from(duration));
    }
    if let Some(start) = message.start {
        result.start_time = start;
    }

    let alternative = message
        .channel?
        .into_channel()?
        .alternatives
        .into_iter()
        .next()?;

    result.text = alternative.transcript;
    result.confidence = alternative.confidence;
    if let Some(words) = alternative.words {
        result.words = words
            .into_iter()
            .map(|w| WordInfo {
                word: w.word,
                start_time: w.start,
                end_time: w.end,
                confidence: w.confidence,
            })
            .collect();
    }
    result.metadata = metadata;
    Some(result)
}

/// Recognized per-request tuning knobs pulled out of `SttConfig.options`.
#[derive(Debug)]
struct ListenOptions {
    channels: u32,
    multichannel: bool,
    smart_format: bool,
    diarize: bool,
    utterance_end_ms: u64,
    vad_events: bool,
}

impl ListenOptions {
    fn from_config(config: &SttConfig) -> Self {
        let options = &config.options;
        let get_bool = |key: &str, default: bool| {
            options.get(key).and_then(Value::as_bool).unwrap_or(default)
        };
        let get_u64 =
            |key: &str, default: u64| options.get(key).and_then(Value::as_u64).unwrap_or(default);

        Self {
            channels: get_u64("channels", u64::from(config.channels.max(1))) as u32,
            multichannel: get_bool("multichannel", false),
            smart_format: get_bool("smart_format", true),
            diarize: get_bool("diarize", false),
            utterance_end_ms: get_u64("utterance_end_ms", 0),
            vad_events: get_bool("vad_events", false),
        }
    }
}

pub(crate) fn apply_defaults(config: &mut SttConfig) {
    if config.model.is_empty() {
        config.model = "nova-3".to_string();
    }
    if config.language.is_empty() {
        config.language = "en".to_string();
    }
    if config.sample_rate == 0 {
        config.sample_rate = 16_000;
    }
    if config.encoding.is_empty() || config.encoding == "raw" {
        config.encoding = "linear16".to_string();
    }
    if config.channels == 0 {
        config.channels = 1;
    }
}

fn build_listen_url(
    base_url: &str,
    config: &SttConfig,
    options: &ListenOptions,
) -> Result<String, ProviderError> {
    let mut url = url::Url::parse(base_url)
        .and_then(|u| u.join("/v1/listen"))
        .map_err(|e| ProviderError::Configuration(format!("invalid base URL {base_url}: {e}")))?;

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("model", &config.model);
        query.append_pair("encoding", &config.encoding);
        query.append_pair("sample_rate", &config.sample_rate.to_string());
        query.append_pair("channels", &options.channels.to_string());
        query.append_pair("multichannel", &options.multichannel.to_string());
        query.append_pair("smart_format", &options.smart_format.to_string());
        query.append_pair("diarize", &options.diarize.to_string());
        query.append_pair("interim_results", &config.interim_results.to_string());
        if options.utterance_end_ms > 0 {
            query.append_pair("utterance_end_ms", &options.utterance_end_ms.to_string());
        }
        if options.vad_events {
            query.append_pair("vad_events", "true");
        }
        if !config.language.is_empty() {
            query.append_pair("language", &config.language);
        }
        if config.punctuation {
            query.append_pair("punctuate", "true");
        }
    }

    Ok(url.to_string())
}

/// Streaming client for one Listen session.
pub struct DeepgramSttStream {
    writer: tokio::sync::Mutex<SplitSink<WsStream, Message>>,
    state: Arc<Mutex<ClientState>>,
    result_rx: tokio::sync::Mutex<mpsc::Receiver<SttResult>>,
    err_rx: tokio::sync::Mutex<mpsc::Receiver<ProviderError>>,
    done: CancellationToken,
}

impl DeepgramSttStream {
    pub(crate) async fn connect(
        base_url: &str,
        api_key: &str,
        mut config: SttConfig,
    ) -> Result<Self, ProviderError> {
        apply_defaults(&mut config);
        let options = ListenOptions::from_config(&config);
        // utterance_end_ms only works with interim results enabled.
        if options.utterance_end_ms > 0 {
            config.interim_results = true;
        }

        let url = build_listen_url(base_url, &config, &options)?;
        let stream =
            ws::connect(&url, &[("Authorization", format!("token {api_key}"))]).await?;
        debug!(
            model = %config.model,
            language = %config.language,
            sample_rate = config.sample_rate,
            encoding = %config.encoding,
            "connected to Deepgram STT"
        );

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
                let parsed: ListenMessage = match serde_json::from_str(text.as_str()) {
                    Ok(parsed) => parsed,
                    Err(_) => continue,
                };
                match parsed.kind.as_str() {
                    "Results" => {
                        if let Some(result) = parse_results(parsed) {
                            if !result.text.is_empty() {
                                debug!(
                                    text = %result.text,
                                    is_final = result.is_final,
                                    confidence = result.confidence,
                                    "Deepgram STT result"
                                );
                            }
                            tokio::select! {
                                _ = done.cancelled() => break,
                                sent = result_tx.send(result) => {
                                    if sent.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                    }
                    // Absorbed: surfaced through results only.
                    "Metadata" | "UtteranceEnd" | "SpeechStarted" => {}
                    other => {
                        debug!(kind = %other, "ignoring Deepgram message");
                    }
                }
            }
            Some(Ok(Message::Close(frame))) => {
                if let Some(frame) = frame {
                    if frame.code != CloseCode::Normal {
                        let _ = err_tx.try_send(ProviderError::Upstream(format!(
                            "Deepgram closed stream: {} {}",
                            frame.code, frame.reason
                        )));
                    }
                }
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                let was_closed = *state.lock() == ClientState::Closed;
                if !was_closed {
                    let _ = err_tx.try_send(ProviderError::Network(format!(
                        "STT read error: {e}"
                    )));
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
impl SttStream for DeepgramSttStream {
    async fn send(&self, audio: &[u8]) -> Result<(), ProviderError> {
        match *self.state.lock() {
            ClientState::Open => {}
            ClientState::Draining => return Err(ProviderError::Closed),
            ClientState::Closed => return Err(ProviderError::Closed),
            ClientState::Init => {}
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

    async fn finalize(&self) -> Result<(), ProviderError> {
        {
            let mut state = self.state.lock();
            match *state {
                ClientState::Closed => return Err(ProviderError::Closed),
                ClientState::Draining => return Ok(()),
                _ => *state = ClientState::Draining,
            }
        }

        self.writer
            .lock()
            .await
            .send(Message::Text(r#"{"type":"CloseStream"}"#.into()))
            .await
            .map_err(|e| ProviderError::Network(format!("failed to send CloseStream: {e}")))
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
            debug!(error = %e, "error closing Deepgram writer");
        }
        Ok(())
    }
}

/// Deepgram STT service facade.
pub struct DeepgramSttService {
    pub(crate) inner: Arc<DeepgramInner>,
}

#[async_trait]
impl SttService for DeepgramSttService {
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
            DeepgramSttStream::connect(&self.inner.base_url, self.inner.api_key(), config).await?;
        Ok(Arc::new(stream))
    }

    async fn models(&self) -> Result<Vec<Model>, ProviderError> {
        Ok(vec![
            Model {
                id: "nova-2-general".to_string(),
                name: "Nova 2 General".to_string(),
                description: "Latest general-purpose speech recognition model with high accuracy"
                    .to_string(),
                ..Default::default()
            },
            Model {
                id: "nova-2-phonecall".to_string(),
                name: "Nova 2 Phone Call".to_string(),
                description: "Optimized for phone call audio with enhanced accuracy for telephony"
                    .to_string(),
                ..Default::default()
            },
            Model {
                id: "nova-2-meeting".to_string(),
                name: "Nova 2 Meeting".to_string(),
                description: "Optimized for meeting and conference audio with multiple speakers"
                    .to_string(),
                ..Default::default()
            },
            Model {
                id: "whisper-large".to_string(),
                name: "Whisper Large".to_string(),
                description: "OpenAI Whisper large model for high-accuracy transcription"
                    .to_string(),
                ..Default::default()
            },
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_object_and_array_parse_identically() {
        let object = r#"{
            "type": "Results",
            "is_final": true,
            "start": 0.0,
            "duration": 1.2,
            "channel": {"alternatives": [{"transcript": "hello world", "confidence": 0.9}]}
        }"#;
        let array = r#"{
            "type": "Results",
            "is_final": true,
            "start": 0.0,
            "duration": 1.2,
            "channel": [{"alternatives": [{"transcript": "hello world", "confidence": 0.9}]}]
        }"#;

        let from_object =
            parse_results(serde_json::from_str::<ListenMessage>(object).unwrap()).unwrap();
        let from_array =
            parse_results(serde_json::from_str::<ListenMessage>(array).unwrap()).unwrap();

        assert_eq!(from_object.text, from_array.text);
        assert_eq!(from_object.is_final, from_array.is_final);
        assert_eq!(from_object.confidence, from_array.confidence);
        assert_eq!(from_object.start_time, from_array.start_time);
        assert_eq!(from_object.end_time, from_array.end_time);
        assert_eq!(from_object.text, "hello world");
        assert!(from_object.is_final);
    }

    #[test]
    fn words_are_extracted_with_timings() {
        let json = r#"{
            "type": "Results",
            "is_final": true,
            "channel": {"alternatives": [{
                "transcript": "hi there",
                "confidence": 0.95,
                "words": [
                    {"word": "hi", "start": 0.1, "end": 0.3, "confidence": 0.97},
                    {"word": "there", "start": 0.35, "end": 0.6, "confidence": 0.93}
                ]
            }]}
        }"#;

        let result = parse_results(serde_json::from_str::<ListenMessage>(json).unwrap()).unwrap();
        assert_eq!(result.words.len(), 2);
        assert_eq!(result.words[0].word, "hi");
        assert_eq!(result.words[1].end_time, 0.6);
    }

    #[test]
    fn url_includes_all_knobs() {
        let mut config = SttConfig {
            punctuation: true,
            interim_results: true,
            ..Default::default()
        };
        apply_defaults(&mut config);
        config
            .options
            .insert("utterance_end_ms".to_string(), Value::from(1000));
        config
            .options
            .insert("vad_events".to_string(), Value::from(true));
        let options = ListenOptions::from_config(&config);

        let url = build_listen_url("wss://api.deepgram.com", &config, &options).unwrap();
        assert!(url.starts_with("wss://api.deepgram.com/v1/listen?"));
        assert!(url.contains("model=nova-3"));
        assert!(url.contains("encoding=linear16"));
        assert!(url.contains("sample_rate=16000"));
        assert!(url.contains("interim_results=true"));
        assert!(url.contains("utterance_end_ms=1000"));
        assert!(url.contains("vad_events=true"));
        assert!(url.contains("punctuate=true"));
        assert!(url.contains("language=en"));
    }

    #[test]
    fn raw_encoding_maps_to_linear16() {
        let mut config = SttConfig {
            encoding: "raw".to_string(),
            ..Default::default()
        };
        apply_defaults(&mut config);
        assert_eq!(config.encoding, "linear16");
    }
}
