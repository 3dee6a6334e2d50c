//! Supabase client against wiremock: token validation (including the
//! no-cache rule for disabled sources), vector search, and ingestion.

use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use omnivox::core::supabase::{Job, SearchRequest, SupabaseClient, SupabaseConfig, SupabaseError};

fn client_for(server: &MockServer) -> SupabaseClient {
    SupabaseClient::new(SupabaseConfig::new(&server.uri(), "anon-key")).unwrap()
}

fn source_row(enabled: bool) -> serde_json::Value {
    json!({
        "id": "11111111-2222-3333-4444-555555555555",
        "name": "Docs site",
        "public_token": "tok",
        "allowed_origins": ["*"],
        "strategy": "vector",
        "content": "",
        "system_prompt": "",
        "rate_limit": 30,
        "enabled": enabled,
        "metadata": {}
    })
}

#[tokio::test]
async fn disabled_source_errors_and_is_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/sources"))
        .and(query_param("public_token", "eq.tok"))
        .and(header("apikey", "anon-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([source_row(false)])))
        // Two lookups must hit the server twice: disabled sources are
        // never cached.
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server);
    for _ in 0..2 {
        let err = client.validate_token("tok").await.unwrap_err();
        assert!(matches!(err, SupabaseError::SourceDisabled));
        assert_eq!(err.to_string(), "source is disabled");
    }
}

#[tokio::test]
async fn enabled_source_is_cached_by_token_and_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/sources"))
        .and(query_param("public_token", "eq.tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([source_row(true)])))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let first = client.validate_token("tok").await.unwrap();
    let second = client.validate_token("tok").await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(first.rate_limit(), 30);

    // The id lookup is served from the same cache entry.
    let by_id = client
        .get_source_by_id("11111111-2222-3333-4444-555555555555")
        .await
        .unwrap();
    assert_eq!(by_id.public_token, "tok");

    // After an explicit clear, lookups go back to the server.
    client.clear_cache();
    Mock::given(method("GET"))
        .and(path("/rest/v1/sources"))
        .and(query_param("public_token", "eq.tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([source_row(true)])))
        .expect(1)
        .mount(&server)
        .await;
    client.validate_token("tok").await.unwrap();
}

#[tokio::test]
async fn unknown_token_is_source_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/sources"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert!(matches!(
        client.validate_token("nope").await,
        Err(SupabaseError::SourceNotFound)
    ));
}

#[tokio::test]
async fn search_documents_maps_rpc_rows() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/search_documents_by_source"))
        .and(header("Authorization", "Bearer anon-key"))
        .and(body_partial_json(json!({
            "p_source_id": "s1",
            "match_threshold": 0.75,
            "match_count": 5,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": "d1",
                "content_chunk": "first chunk",
                "metadata": {"page": 1},
                "document_id": "doc-1",
                "similarity": 0.91
            },
            {
                "id": "d2",
                "content_chunk": "second chunk",
                "metadata": null,
                "document_id": "doc-2",
                "similarity": 0.82
            }
        ])))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let results = client
        .search_documents(&SearchRequest {
            source_id: "s1".to_string(),
            query_embedding: vec![0.1, 0.2, 0.3],
            max_results: 5,
            threshold: 0.75,
        })
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].content, "first chunk");
    assert_eq!(results[0].similarity, 0.91);
    assert!(results[1].metadata.is_empty());
}

#[tokio::test]
async fn create_job_reads_back_the_created_row() {
    let created_id = Uuid::new_v4();
    let source_id = Uuid::new_v4();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/ingestion_jobs"))
        .and(header("Prefer", "return=representation"))
        .and(body_partial_json(json!({
            "status": "pending",
            "job_type": "crawl",
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
            "id": created_id,
            "source_id": source_id,
            "status": "pending",
            "job_type": "crawl",
            "resource_url": "https://example.com",
            "pages_processed": 0
        }])))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let mut job = Job {
        id: None,
        source_id,
        status: "pending".to_string(),
        job_type: "crawl".to_string(),
        resource_url: "https://example.com".to_string(),
        pages_processed: 0,
        error_message: String::new(),
    };
    client.create_job(&mut job).await.unwrap();
    assert_eq!(job.id, Some(created_id));
}
