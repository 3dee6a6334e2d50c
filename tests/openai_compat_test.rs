//! OpenAI-compatible adapter against wiremock: completion parsing, SSE
//! streaming, embeddings, and the Yandex gateway's header and model-id
//! slots.

use futures::future;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use omnivox::core::providers::openai::{
    OpenAiCompatProvider, OPENAI_PRESET, YANDEX_LLM_PRESET,
};
use omnivox::{
    ChatMessage, ChatOptions, ChatService, EmbeddingService, Provider, ProviderConfig,
    ProviderType,
};

async fn mount_model_list(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "gpt-4o-mini"}, {"id": "gpt-4o"}]
        })))
        .mount(server)
        .await;
}

async fn openai_provider(server: &MockServer) -> OpenAiCompatProvider {
    let config = ProviderConfig::new("openai", ProviderType::OpenAi)
        .with_api_key("sk-test")
        .with_base_url(&format!("{}/v1", server.uri()))
        .with_model("gpt-4o-mini");
    OpenAiCompatProvider::initialize(&OPENAI_PRESET, config)
        .await
        .unwrap()
}

#[tokio::test]
async fn chat_completion_returns_first_choice() {
    let server = MockServer::start().await;
    mount_model_list(&server).await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "messages": [{"role": "user", "content": "hi"}],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [
                {"message": {"role": "assistant", "content": "hello there"}},
                {"message": {"role": "assistant", "content": "second choice"}}
            ]
        })))
        .mount(&server)
        .await;

    let provider = openai_provider(&server).await;
    let chat = provider.chat().unwrap();
    let reply = chat
        .chat_completion(&[ChatMessage::user("hi")], &ChatOptions::default())
        .await
        .unwrap();
    assert_eq!(reply, "hello there");
}

#[tokio::test]
async fn chat_completion_error_carries_status_and_body() {
    let server = MockServer::start().await;
    mount_model_list(&server).await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429).set_body_string(r#"{"error":"rate limit exceeded"}"#),
        )
        .mount(&server)
        .await;

    let provider = openai_provider(&server).await;
    let chat = provider.chat().unwrap();
    let err = chat
        .chat_completion(&[ChatMessage::user("hi")], &ChatOptions::default())
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("429"));
    assert!(message.contains("rate limit exceeded"));
}

#[tokio::test]
async fn stream_chat_completion_yields_deltas_then_closes() {
    let server = MockServer::start().await;
    mount_model_list(&server).await;

    let sse_body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_body, "text/event-stream"),
        )
        .mount(&server)
        .await;

    let provider = openai_provider(&server).await;
    let chat = provider.chat().unwrap();
    let (mut content_rx, mut err_rx) = chat
        .stream_chat_completion(&[ChatMessage::user("hi")], &ChatOptions::default())
        .await
        .unwrap();

    let mut collected = String::new();
    while let Some(delta) = content_rx.recv().await {
        collected.push_str(&delta);
    }
    assert_eq!(collected, "Hello");
    assert!(err_rx.recv().await.is_none());
}

#[tokio::test]
async fn yandex_gateway_injects_folder_header_and_model_uri() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("OpenAI-Project", "b1gfolder"))
        .and(body_partial_json(json!({
            "model": "gpt://b1gfolder/yandexgpt/latest",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "привет"}}]
        })))
        .mount(&server)
        .await;

    let config = ProviderConfig::new("yandex", ProviderType::Yandex)
        .with_api_key("ya-key")
        .with_base_url(&format!("{}/v1", server.uri()))
        .with_model("yandexgpt/latest")
        .with_option("folder_id", json!("b1gfolder"));
    // The Yandex gateway skips API-key validation at initialize.
    let provider = OpenAiCompatProvider::initialize(&YANDEX_LLM_PRESET, config)
        .await
        .unwrap();

    let chat = provider.chat().unwrap();
    let reply = chat
        .chat_completion(&[ChatMessage::user("привет")], &ChatOptions::default())
        .await
        .unwrap();
    assert_eq!(reply, "привет");
}

#[tokio::test]
async fn yandex_embedding_defaults_model_and_encoding() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(body_partial_json(json!({
            "model": "emb://b1gfolder/text-search-query/latest",
            "encoding_format": "float",
            "input": ["some text"],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"embedding": [0.25, -0.5, 0.75]}]
        })))
        .mount(&server)
        .await;

    let config = ProviderConfig::new("yandex", ProviderType::Yandex)
        .with_api_key("ya-key")
        .with_base_url(&format!("{}/v1", server.uri()))
        .with_option("folder_id", json!("b1gfolder"));
    let provider = OpenAiCompatProvider::initialize(&YANDEX_LLM_PRESET, config)
        .await
        .unwrap();

    let embedding = provider.embedding().unwrap();
    let vector = embedding.generate_embedding("some text").await.unwrap();
    assert_eq!(vector, vec![0.25, -0.5, 0.75]);
}

#[tokio::test]
async fn concurrent_requests_share_one_provider() {
    let server = MockServer::start().await;
    mount_model_list(&server).await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "ok"}}]
        })))
        .mount(&server)
        .await;

    let provider = openai_provider(&server).await;
    let chat = provider.chat().unwrap();

    let calls = (0..8).map(|_| {
        let chat = chat.clone();
        async move {
            chat.chat_completion(&[ChatMessage::user("hi")], &ChatOptions::default())
                .await
        }
    });
    let replies = future::join_all(calls).await;
    assert!(replies.iter().all(|r| r.as_deref() == Ok("ok")));
}
