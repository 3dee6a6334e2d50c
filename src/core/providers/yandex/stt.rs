//! Streaming speech-to-text over SpeechKit v3 bidirectional gRPC.
//!
//! The first frame of a session carries the recognition options; audio
//! follows as `Chunk` frames. The consumer dispatches response variants:
//! `Partial` and `Final` become results, `FinalRefinement` becomes a
//! `normalized` result, `EouUpdate` and `StatusCode` are absorbed. On
//! EOF the trailer metadata is inspected for error details.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::error::ProviderError;
use crate::core::models::{Model, SttConfig, SttResult, WordInfo};
use crate::core::providers::ws::ClientState;
use crate::core::services::{collect_transcript, SttService, SttStream};

use super::proto::stt as pb;
use super::proto::RecognizerClient;
use super::provider::{authorize_request, connect_channel, YandexInner};

const RESULT_BUFFER: usize = 10;
const REQUEST_BUFFER: usize = 32;
const MAX_PAUSE_BETWEEN_WORDS_HINT_MS: i64 = 1000;

/// Normalizes a language code to SpeechKit's closed set. Unknown codes
/// fall back to `en-US` with a warning; callers that require strict
/// matching must check the supported list before calling.
pub(crate) fn normalize_language_code(lang: &str) -> String {
    let normalized = match lang {
        "en" | "en-US" | "en-GB" | "en-AU" | "en-CA" | "en-NZ" | "en-IN" | "en-IE" => "en-US",
        "de" | "de-DE" | "de-AT" | "de-CH" => "de-DE",
        "es" | "es-ES" | "es-MX" | "es-AR" => "es-ES",
        "fr" | "fr-FR" | "fr-CA" | "fr-BE" | "fr-CH" => "fr-FR",
        "pt" | "pt-PT" => "pt-PT",
        "pt-BR" => "pt-BR",
        "ru" | "ru-RU" => "ru-RU",
        "fi" | "fi-FI" => "fi-FI",
        "he" | "he-IL" => "he-IL",
        "it" | "it-IT" => "it-IT",
        "kk" | "kk-KZ" => "kk-KZ",
        "nl" | "nl-NL" => "nl-NL",
        "pl" | "pl-PL" => "pl-PL",
        "sv" | "sv-SE" => "sv-SE",
        "tr" | "tr-TR" => "tr-TR",
        "uz" | "uz-UZ" => "uz-UZ",
        unknown => {
            warn!(language = %unknown, "unknown language code, defaulting to en-US");
            return "en-US".to_string();
        }
    };
    normalized.to_string()
}

fn apply_defaults(config: &mut SttConfig) {
    if config.model.is_empty() {
        config.model = "general".to_string();
    }
    if config.language.is_empty() {
        config.language = "ru-RU".to_string();
    }
    if config.sample_rate == 0 {
        config.sample_rate = 8000;
    }
    if config.encoding.is_empty() {
        config.encoding = "linear16".to_string();
    }
    if config.channels == 0 {
        config.channels = 1;
    }
}

fn build_session_options(config: &SttConfig) -> pb::StreamingOptions {
    let audio_format = pb::AudioFormatOptions {
        audio_format: Some(pb::audio_format_options::AudioFormat::RawAudio(
            pb::RawAudio {
                audio_encoding: pb::raw_audio::AudioEncoding::Linear16Pcm as i32,
                sample_rate_hertz: i64::from(config.sample_rate),
                audio_channel_count: i64::from(config.channels),
            },
        )),
    };

    let mut model = pb::RecognitionModelOptions {
        model: config.model.clone(),
        audio_format: Some(audio_format),
        text_normalization: None,
        language_restriction: None,
        audio_processing_type: pb::recognition_model_options::AudioProcessingType::RealTime
            as i32,
    };

    if !config.language.is_empty() {
        let normalized = normalize_language_code(&config.language);
        debug!(from = %config.language, to = %normalized, "normalized language code");
        model.language_restriction = Some(pb::LanguageRestrictionOptions {
            restriction_type:
                pb::language_restriction_options::LanguageRestrictionType::Whitelist as i32,
            language_code: vec![normalized],
        });
    }

    if config.punctuation {
        model.text_normalization = Some(pb::TextNormalizationOptions {
            text_normalization: pb::text_normalization_options::TextNormalization::Enabled
                as i32,
            profanity_filter: false,
            literature_text: false,
        });
    }

    pb::StreamingOptions {
        recognition_model: Some(model),
        eou_classifier: Some(pb::EouClassifierOptions {
            classifier: Some(pb::eou_classifier_options::Classifier::DefaultClassifier(
                pb::DefaultEouClassifier {
                    r#type: pb::default_eou_classifier::EouSensitivity::Default as i32,
                    max_pause_between_words_hint_ms: MAX_PAUSE_BETWEEN_WORDS_HINT_MS,
                },
            )),
        }),
    }
}

fn parse_words(words: Vec<pb::Word>) -> Vec<WordInfo> {
    words
        .into_iter()
        .map(|word| WordInfo {
            word: word.text,
            start_time: word.start_time_ms as f64 / 1000.0,
            end_time: word.end_time_ms as f64 / 1000.0,
            // Per-word confidence is absent from this surface.
            confidence: 1.0,
        })
        .collect()
}

fn alternative_to_result(update: pb::AlternativeUpdate, is_final: bool) -> Option<SttResult> {
    let alternative = update.alternatives.into_iter().next()?;
    Some(SttResult {
        text: alternative.text,
        is_final,
        confidence: alternative.confidence.clamp(0.0, 1.0),
        start_time: alternative.start_time_ms as f64 / 1000.0,
        end_time: alternative.end_time_ms as f64 / 1000.0,
        words: parse_words(alternative.words),
        metadata: HashMap::new(),
    })
}

fn parse_response(response: pb::StreamingResponse) -> Option<SttResult> {
    match response.event? {
        pb::streaming_response::Event::Partial(update) => alternative_to_result(update, false),
        pb::streaming_response::Event::Final(update) => alternative_to_result(update, true),
        pb::streaming_response::Event::FinalRefinement(refinement) => {
            let pb::final_refinement::Type::NormalizedText(update) = refinement.r#type?;
            let mut result = alternative_to_result(update, true)?;
            result
                .metadata
                .insert("normalized".to_string(), Value::from(true));
            Some(result)
        }
        pb::streaming_response::Event::EouUpdate(update) => {
            // End-of-utterance markers are not surfaced as results.
            debug!(time_ms = update.time_ms, "end of utterance");
            None
        }
        pb::streaming_response::Event::StatusCode(status) => {
            debug!(code = status.code_type, message = %status.message, "status update");
            None
        }
    }
}

/// Streaming client for one recognition session.
pub struct YandexSttStream {
    request_tx: Mutex<Option<mpsc::Sender<pb::StreamingRequest>>>,
    state: Arc<Mutex<ClientState>>,
    result_rx: tokio::sync::Mutex<mpsc::Receiver<SttResult>>,
    err_rx: tokio::sync::Mutex<mpsc::Receiver<ProviderError>>,
    done: CancellationToken,
}

impl YandexSttStream {
    pub(crate) async fn connect(
        inner: &YandexInner,
        mut config: SttConfig,
    ) -> Result<Self, ProviderError> {
        apply_defaults(&mut config);
        debug!(
            model = %config.model,
            language = %config.language,
            sample_rate = config.sample_rate,
            "initializing Yandex STT stream"
        );

        let channel = connect_channel(&inner.stt_endpoint()).await?;
        let mut client = RecognizerClient::new(channel);

        let session_options = build_session_options(&config);
        let (request_tx, mut request_rx) = mpsc::channel::<pb::StreamingRequest>(REQUEST_BUFFER);

        let request_stream = async_stream::stream! {
            yield pb::StreamingRequest {
                event: Some(pb::streaming_request::Event::SessionOptions(session_options)),
            };
            while let Some(request) = request_rx.recv().await {
                yield request;
            }
        };

        let mut request = tonic::Request::new(request_stream);
        authorize_request(&mut request, inner.api_key(), None)?;

        let response = client
            .recognize_streaming(request)
            .await
            .map_err(|status| match status.code() {
                tonic::Code::Unavailable => ProviderError::ConnectionFailed(format!(
                    "failed to start streaming: {}",
                    status.message()
                )),
                _ => ProviderError::from_grpc_status(&status),
            })?;

        let (result_tx, result_rx) = mpsc::channel(RESULT_BUFFER);
        let (err_tx, err_rx) = mpsc::channel(1);
        let state = Arc::new(Mutex::new(ClientState::Open));
        let done = CancellationToken::new();

        tokio::spawn(read_loop(
            response.into_inner(),
            result_tx,
            err_tx,
            state.clone(),
            done.clone(),
        ));

        Ok(Self {
            request_tx: Mutex::new(Some(request_tx)),
            state,
            result_rx: tokio::sync::Mutex::new(result_rx),
            err_rx: tokio::sync::Mutex::new(err_rx),
            done,
        })
    }
}

async fn read_loop(
    mut responses: tonic::codec::Streaming<pb::StreamingResponse>,
    result_tx: mpsc::Sender<SttResult>,
    err_tx: mpsc::Sender<ProviderError>,
    state: Arc<Mutex<ClientState>>,
    done: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            _ = done.cancelled() => break,
            message = responses.message() => message,
        };

        match message {
            Ok(Some(response)) => {
                if let Some(result) = parse_response(response) {
                    if !result.text.is_empty() {
                        debug!(
                            text = %result.text,
                            is_final = result.is_final,
                            confidence = result.confidence,
                            "Yandex STT result"
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
            Ok(None) => {
                // Graceful EOF; the trailer may still carry diagnostics.
                if let Ok(Some(trailers)) = responses.trailers().await {
                    if !trailers.is_empty() {
                        debug!(?trailers, "recognition stream trailer metadata");
                    }
                }
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
impl SttStream for YandexSttStream {
    async fn send(&self, audio: &[u8]) -> Result<(), ProviderError> {
        let request_tx = {
            match *self.state.lock() {
                ClientState::Draining | ClientState::Closed => return Err(ProviderError::Closed),
                ClientState::Init | ClientState::Open => {}
            }
            match &*self.request_tx.lock() {
                Some(tx) => tx.clone(),
                None => return Err(ProviderError::Closed),
            }
        };

        request_tx
            .send(pb::StreamingRequest {
                event: Some(pb::streaming_request::Event::Chunk(pb::AudioChunk {
                    data: audio.to_vec(),
                })),
            })
            .await
            .map_err(|_| ProviderError::Closed)
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

    /// Ends the send side of the RPC; the server finalizes recognition
    /// and remaining results drain through `receive`.
    async fn finalize(&self) -> Result<(), ProviderError> {
        let mut state = self.state.lock();
        match *state {
            ClientState::Closed => return Err(ProviderError::Closed),
            ClientState::Draining => return Ok(()),
            _ => *state = ClientState::Draining,
        }
        drop(state);

        // Dropping the sender closes the request stream (CloseSend).
        self.request_tx.lock().take();
        Ok(())
    }

    async fn close(&self) -> Result<(), ProviderError> {
        {
            let mut state = self.state.lock();
            if *state == ClientState::Closed {
                return Ok(());
            }
            *state = ClientState::Closed;
        }

        self.request_tx.lock().take();
        self.done.cancel();
        Ok(())
    }
}

/// Yandex STT service facade.
pub struct YandexSttService {
    pub(crate) inner: Arc<YandexInner>,
}

#[async_trait]
impl SttService for YandexSttService {
    async fn transcribe(&self, audio: &[u8], config: SttConfig) -> Result<String, ProviderError> {
        let stream = self.new_stt_stream(config).await?;
        collect_transcript(stream, audio).await
    }

    async fn new_stt_stream(
        &self,
        config: SttConfig,
    ) -> Result<Arc<dyn SttStream>, ProviderError> {
        self.inner.ensure_initialized()?;
        let stream = YandexSttStream::connect(&self.inner, config).await?;
        Ok(Arc::new(stream))
    }

    async fn models(&self) -> Result<Vec<Model>, ProviderError> {
        Ok(vec![
            Model {
                id: "general".to_string(),
                name: "General".to_string(),
                description: "General-purpose speech recognition model".to_string(),
                ..Default::default()
            },
            Model {
                id: "general:rc".to_string(),
                name: "General RC".to_string(),
                description: "Release candidate of general model with latest improvements"
                    .to_string(),
                ..Default::default()
            },
            Model {
                id: "deferred-general".to_string(),
                name: "Deferred General".to_string(),
                description: "Asynchronous recognition for pre-recorded audio files".to_string(),
                ..Default::default()
            },
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_remap_to_supported_set() {
        assert_eq!(normalize_language_code("fr-CA"), "fr-FR");
        assert_eq!(normalize_language_code("en-GB"), "en-US");
        assert_eq!(normalize_language_code("pt-BR"), "pt-BR");
        assert_eq!(normalize_language_code("ru"), "ru-RU");
        assert_eq!(normalize_language_code("xx-YY"), "en-US");
    }

    #[test]
    fn session_options_carry_format_and_eou() {
        let mut config = SttConfig {
            punctuation: true,
            ..Default::default()
        };
        apply_defaults(&mut config);

        let options = build_session_options(&config);
        let model = options.recognition_model.unwrap();
        assert_eq!(model.model, "general");
        assert_eq!(
            model.audio_processing_type,
            pb::recognition_model_options::AudioProcessingType::RealTime as i32
        );

        let Some(pb::audio_format_options::AudioFormat::RawAudio(raw)) =
            model.audio_format.unwrap().audio_format
        else {
            panic!("expected raw audio format");
        };
        assert_eq!(raw.audio_encoding, pb::raw_audio::AudioEncoding::Linear16Pcm as i32);
        assert_eq!(raw.sample_rate_hertz, 8000);
        assert_eq!(raw.audio_channel_count, 1);

        let restriction = model.language_restriction.unwrap();
        assert_eq!(restriction.language_code, vec!["ru-RU".to_string()]);

        let normalization = model.text_normalization.unwrap();
        assert!(!normalization.profanity_filter);
        assert!(!normalization.literature_text);

        let Some(pb::eou_classifier_options::Classifier::DefaultClassifier(classifier)) =
            options.eou_classifier.unwrap().classifier
        else {
            panic!("expected default EOU classifier");
        };
        assert_eq!(classifier.max_pause_between_words_hint_ms, 1000);
    }

    #[test]
    fn final_refinement_is_tagged_normalized() {
        let response = pb::StreamingResponse {
            event: Some(pb::streaming_response::Event::FinalRefinement(
                pb::FinalRefinement {
                    final_index: 0,
                    r#type: Some(pb::final_refinement::Type::NormalizedText(
                        pb::AlternativeUpdate {
                            alternatives: vec![pb::Alternative {
                                words: vec![],
                                text: "Forty two".to_string(),
                                start_time_ms: 0,
                                end_time_ms: 1500,
                                confidence: 0.9,
                            }],
                        },
                    )),
                },
            )),
        };

        let result = parse_response(response).unwrap();
        assert!(result.is_final);
        assert_eq!(result.text, "Forty two");
        assert_eq!(result.metadata.get("normalized"), Some(&Value::from(true)));
    }

    #[test]
    fn eou_and_status_are_absorbed() {
        let eou = pb::StreamingResponse {
            event: Some(pb::streaming_response::Event::EouUpdate(pb::EouUpdate {
                time_ms: 1200,
            })),
        };
        assert!(parse_response(eou).is_none());

        let status = pb::StreamingResponse {
            event: Some(pb::streaming_response::Event::StatusCode(pb::StatusCode {
                code_type: 0,
                message: "working".to_string(),
            })),
        };
        assert!(parse_response(status).is_none());
    }

    #[test]
    fn words_get_unit_confidence() {
        let words = parse_words(vec![pb::Word {
            text: "hello".to_string(),
            start_time_ms: 100,
            end_time_ms: 400,
        }]);
        assert_eq!(words[0].confidence, 1.0);
        assert_eq!(words[0].start_time, 0.1);
        assert_eq!(words[0].end_time, 0.4);
    }
}
