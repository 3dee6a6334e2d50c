//! Minimax T2A v2 against a local WebSocket stub: handshake, hex audio
//! decode, and the drain-before-EOF ordering around `task_finished`.

mod common;

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;

use omnivox::core::providers::minimax::MinimaxProvider;
use omnivox::{Provider, ProviderConfig, ProviderType, TtsConfig, TtsService, TtsStream};

fn provider_for(base_url: &str) -> MinimaxProvider {
    let config = ProviderConfig::new("minimax", ProviderType::Minimax)
        .with_api_key("test-key")
        .with_base_url(base_url);
    MinimaxProvider::initialize(config).unwrap()
}

/// Stub speaking the full task protocol: handshake, two hex audio chunks
/// per `task_continue`, clean shutdown on `task_finish`.
async fn protocol_stub(mut ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) {
    ws.send(Message::Text(r#"{"event":"connected_success"}"#.into()))
        .await
        .unwrap();

    while let Some(Ok(message)) = ws.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        let frame: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        match frame["event"].as_str() {
            Some("task_start") => {
                assert!(frame["model"].is_string());
                assert!(frame["voice_setting"]["voice_id"].is_string());
                assert_eq!(frame["audio_setting"]["channel"], 1);
                ws.send(Message::Text(r#"{"event":"task_started"}"#.into()))
                    .await
                    .unwrap();
            }
            Some("task_continue") => {
                assert_eq!(frame["text"], "hello");
                ws.send(Message::Text(
                    r#"{"event":"task_continued","data":{"audio":"aa"}}"#.into(),
                ))
                .await
                .unwrap();
                ws.send(Message::Text(
                    r#"{"event":"task_continued","data":{"audio":"bb"}}"#.into(),
                ))
                .await
                .unwrap();
            }
            Some("task_finish") => {
                ws.send(Message::Text(r#"{"event":"task_finished"}"#.into()))
                    .await
                    .unwrap();
                break;
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}

#[tokio::test]
async fn chunks_before_task_finished_are_delivered_in_order() {
    let base_url = common::spawn_ws_stub(protocol_stub).await;
    let provider = provider_for(&base_url);
    let tts = provider.tts().unwrap();
    let stream = tts.new_tts_stream(TtsConfig::default()).await.unwrap();

    stream.send("hello").await.unwrap();
    stream.close().await.unwrap();

    let first = stream.receive().await.unwrap().unwrap();
    assert_eq!(first.as_ref(), &[0xAA]);
    let second = stream.receive().await.unwrap().unwrap();
    assert_eq!(second.as_ref(), &[0xBB]);
    assert!(stream.receive().await.unwrap().is_none());

    // A second close after task_finished is a no-op.
    stream.close().await.unwrap();
}

#[tokio::test]
async fn synthesize_collects_hex_audio() {
    let base_url = common::spawn_ws_stub(protocol_stub).await;
    let provider = provider_for(&base_url);
    let tts = provider.tts().unwrap();

    let audio = tts.synthesize("hello", TtsConfig::default()).await.unwrap();
    assert_eq!(audio, vec![0xAA, 0xBB]);
}

#[tokio::test]
async fn task_failed_propagates_error() {
    let base_url = common::spawn_ws_stub(|mut ws| async move {
        ws.send(Message::Text(r#"{"event":"connected_success"}"#.into()))
            .await
            .unwrap();
        let _ = ws.next().await; // task_start
        ws.send(Message::Text(r#"{"event":"task_started"}"#.into()))
            .await
            .unwrap();
        let _ = ws.next().await; // task_continue
        ws.send(Message::Text(
            r#"{"event":"task_failed","error":"voice unavailable"}"#.into(),
        ))
        .await
        .unwrap();
    })
    .await;

    let provider = provider_for(&base_url);
    let tts = provider.tts().unwrap();
    let stream = tts.new_tts_stream(TtsConfig::default()).await.unwrap();

    stream.send("hello").await.unwrap();
    let err = stream.receive().await.unwrap_err();
    assert!(err.to_string().contains("voice unavailable"));
}

#[tokio::test]
async fn unexpected_handshake_frame_is_a_protocol_error() {
    let base_url = common::spawn_ws_stub(|mut ws| async move {
        ws.send(Message::Text(r#"{"event":"something_else"}"#.into()))
            .await
            .unwrap();
    })
    .await;

    let provider = provider_for(&base_url);
    let tts = provider.tts().unwrap();
    let err = tts.new_tts_stream(TtsConfig::default()).await.unwrap_err();
    assert!(err.to_string().contains("unexpected event"));
}
