//! End-to-end Deepgram STT against a local WebSocket stub.

mod common;

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::frame::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::Message;

use omnivox::core::providers::deepgram::DeepgramProvider;
use omnivox::{Provider, ProviderConfig, ProviderType, SttConfig, SttService, SttStream};

fn provider_for(base_url: &str) -> DeepgramProvider {
    let config = ProviderConfig::new("deepgram", ProviderType::Deepgram)
        .with_api_key("test-key")
        .with_base_url(base_url);
    DeepgramProvider::initialize(config).unwrap()
}

#[tokio::test]
async fn transcribe_joins_final_segments_with_trailing_space() {
    let base_url = common::spawn_ws_stub(|mut ws| async move {
        // Consume audio until the client finalizes.
        while let Some(Ok(message)) = ws.next().await {
            if let Message::Text(text) = message {
                if text.as_str().contains("CloseStream") {
                    break;
                }
            }
        }

        let frame = r#"{"type":"Results","is_final":true,"start":0.0,"duration":1.2,"channel":{"alternatives":[{"transcript":"hello world","confidence":0.9}]}}"#;
        ws.send(Message::Text(frame.into())).await.unwrap();
        ws.send(Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        })))
        .await
        .unwrap();
    })
    .await;

    let provider = provider_for(&base_url);
    let stt = provider.stt().unwrap();
    let transcript = stt
        .transcribe(&[0u8; 8000], SttConfig::default())
        .await
        .unwrap();

    assert_eq!(transcript, "hello world ");
}

#[tokio::test]
async fn object_and_array_channel_frames_produce_equal_results() {
    let base_url = common::spawn_ws_stub(|mut ws| async move {
        let object = r#"{"type":"Results","is_final":true,"channel":{"alternatives":[{"transcript":"same","confidence":0.8}]}}"#;
        let array = r#"{"type":"Results","is_final":true,"channel":[{"alternatives":[{"transcript":"same","confidence":0.8}]}]}"#;
        ws.send(Message::Text(object.into())).await.unwrap();
        ws.send(Message::Text(array.into())).await.unwrap();
        // Keep the connection open until the client goes away.
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;

    let provider = provider_for(&base_url);
    let stt = provider.stt().unwrap();
    let stream = stt.new_stt_stream(SttConfig::default()).await.unwrap();

    let first = stream.receive().await.unwrap().unwrap();
    let second = stream.receive().await.unwrap().unwrap();
    assert_eq!(first.text, second.text);
    assert_eq!(first.is_final, second.is_final);
    assert_eq!(first.confidence, second.confidence);

    stream.close().await.unwrap();
}

#[tokio::test]
async fn close_is_idempotent_and_leaves_receive_at_eof() {
    let base_url = common::spawn_ws_stub(|mut ws| async move {
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;

    let provider = provider_for(&base_url);
    let stt = provider.stt().unwrap();
    let stream = stt.new_stt_stream(SttConfig::default()).await.unwrap();

    for _ in 0..3 {
        stream.close().await.unwrap();
    }
    assert!(stream.receive().await.unwrap().is_none());
    assert!(stream.receive().await.unwrap().is_none());

    // No further sends succeed after close.
    assert!(stream.send(&[0u8; 16]).await.is_err());
}
