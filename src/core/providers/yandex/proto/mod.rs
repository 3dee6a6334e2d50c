//! Hand-maintained SpeechKit v3 bindings: prost message definitions plus
//! thin tonic clients for the `Recognizer` and `Synthesizer` services.

pub mod stt;
pub mod tts;

use tonic::codec::{ProstCodec, Streaming};
use tonic::transport::Channel;
use tonic::{IntoRequest, IntoStreamingRequest, Response, Status};

/// Client for `speechkit.stt.v3.Recognizer`.
#[derive(Debug, Clone)]
pub struct RecognizerClient {
    inner: tonic::client::Grpc<Channel>,
}

impl RecognizerClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: tonic::client::Grpc::new(channel),
        }
    }

    /// Bidirectional streaming recognition.
    pub async fn recognize_streaming(
        &mut self,
        request: impl IntoStreamingRequest<Message = stt::StreamingRequest>,
    ) -> Result<Response<Streaming<stt::StreamingResponse>>, Status> {
        self.inner
            .ready()
            .await
            .map_err(|e| Status::unavailable(format!("service not ready: {e}")))?;
        let codec: ProstCodec<stt::StreamingRequest, stt::StreamingResponse> =
            ProstCodec::default();
        let path = http::uri::PathAndQuery::from_static(
            "/speechkit.stt.v3.Recognizer/RecognizeStreaming",
        );
        self.inner
            .streaming(request.into_streaming_request(), path, codec)
            .await
    }
}

/// Client for `speechkit.tts.v3.Synthesizer`.
#[derive(Debug, Clone)]
pub struct SynthesizerClient {
    inner: tonic::client::Grpc<Channel>,
}

impl SynthesizerClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: tonic::client::Grpc::new(channel),
        }
    }

    /// Single-shot synthesis with a streamed response.
    pub async fn utterance_synthesis(
        &mut self,
        request: impl IntoRequest<tts::UtteranceSynthesisRequest>,
    ) -> Result<Response<Streaming<tts::UtteranceSynthesisResponse>>, Status> {
        self.inner
            .ready()
            .await
            .map_err(|e| Status::unavailable(format!("service not ready: {e}")))?;
        let codec: ProstCodec<tts::UtteranceSynthesisRequest, tts::UtteranceSynthesisResponse> =
            ProstCodec::default();
        let path = http::uri::PathAndQuery::from_static(
            "/speechkit.tts.v3.Synthesizer/UtteranceSynthesis",
        );
        self.inner
            .server_streaming(request.into_request(), path, codec)
            .await
    }

    /// Bidirectional streaming synthesis.
    pub async fn stream_synthesis(
        &mut self,
        request: impl IntoStreamingRequest<Message = tts::StreamSynthesisRequest>,
    ) -> Result<Response<Streaming<tts::StreamSynthesisResponse>>, Status> {
        self.inner
            .ready()
            .await
            .map_err(|e| Status::unavailable(format!("service not ready: {e}")))?;
        let codec: ProstCodec<tts::StreamSynthesisRequest, tts::StreamSynthesisResponse> =
            ProstCodec::default();
        let path = http::uri::PathAndQuery::from_static(
            "/speechkit.tts.v3.Synthesizer/StreamSynthesis",
        );
        self.inner
            .streaming(request.into_streaming_request(), path, codec)
            .await
    }
}
