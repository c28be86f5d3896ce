//! HTTP chat client integration tests
//!
//! Runs `HttpChatClient` against a `wiremock` mock server. Use
//! `set_body_raw(bytes, mime)` so the body bytes go out untouched.

mod common;

use std::sync::Arc;

use askme::client::{HttpChatClient, ResponseStreamer};
use askme::config::ApiConfig;
use askme::error::AskmeError;
use askme::ids::RemoteConversationId;
use askme::session::{ChatOrchestrator, TurnOutcome};
use futures::StreamExt;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn api_config(server: &MockServer, incremental: bool) -> ApiConfig {
    ApiConfig {
        chat_url: format!("{}/api/chat/", server.uri()),
        database_list_url: format!("{}/api/list_database", server.uri()),
        incremental,
        connect_timeout_seconds: 5,
    }
}

async fn collect(client: &HttpChatClient, prompt: &str) -> Vec<askme::Result<String>> {
    client
        .stream(prompt, &RemoteConversationId::from("conv-1"))
        .collect()
        .await
}

async fn mount_chat(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/api/chat/"))
        .respond_with(response)
        .mount(server)
        .await;
}

// ---------------------------------------------------------------------------
// Streaming
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_request_carries_conversation_id_and_prompt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat/"))
        .and(header("content-type", "application/json"))
        .and(header("accept", "application/json"))
        .and(body_json(serde_json::json!({
            "SessionID": "conv-1",
            "UserPrompt": "What databases exist?"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw("ok", "text/plain"))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpChatClient::new(&api_config(&server, true)).unwrap();
    let results = collect(&client, "What databases exist?").await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].as_ref().unwrap(), "ok");
}

#[tokio::test]
async fn test_final_snapshot_is_full_body() {
    let server = MockServer::start().await;
    let body = "The catalog has three tables: orders, customers, and items.";
    mount_chat(&server, ResponseTemplate::new(200).set_body_raw(body, "text/plain")).await;

    let client = HttpChatClient::new(&api_config(&server, true)).unwrap();
    let snapshots: Vec<String> = collect(&client, "tables?")
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert!(!snapshots.is_empty());
    assert_eq!(snapshots.last().unwrap(), body);
    assert!(snapshots.windows(2).all(|w| w[1].starts_with(&w[0])));
}

#[tokio::test]
async fn test_multibyte_body_decodes_cleanly() {
    let server = MockServer::start().await;
    let body = "Résumé: 東京 ✓ 😀";
    mount_chat(
        &server,
        ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/plain"),
    )
    .await;

    let client = HttpChatClient::new(&api_config(&server, true)).unwrap();
    let results = collect(&client, "unicode").await;

    assert_eq!(results.last().unwrap().as_ref().unwrap(), body);
}

#[tokio::test]
async fn test_non_incremental_yields_single_snapshot() {
    let server = MockServer::start().await;
    mount_chat(
        &server,
        ResponseTemplate::new(200).set_body_raw("whole answer", "text/plain"),
    )
    .await;

    let client = HttpChatClient::new(&api_config(&server, false)).unwrap();
    let results = collect(&client, "all at once").await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].as_ref().unwrap(), "whole answer");
}

#[tokio::test]
async fn test_error_status_surfaces_code_and_body() {
    let server = MockServer::start().await;
    mount_chat(
        &server,
        ResponseTemplate::new(503).set_body_raw("upstream unavailable", "text/plain"),
    )
    .await;

    let client = HttpChatClient::new(&api_config(&server, true)).unwrap();
    let results = collect(&client, "hello").await;

    assert_eq!(results.len(), 1);
    let err = results[0].as_ref().unwrap_err();
    match err.downcast_ref::<AskmeError>() {
        Some(AskmeError::HttpStatus { status, body }) => {
            assert_eq!(*status, 503);
            assert_eq!(body, "upstream unavailable");
        }
        other => panic!("expected HttpStatus, got {:?}", other),
    }
    assert_eq!(err.to_string(), "HTTP 503: upstream unavailable");
}

#[tokio::test]
async fn test_connection_failure_is_transport_error() {
    let config = ApiConfig {
        chat_url: "http://127.0.0.1:1/api/chat/".to_string(),
        connect_timeout_seconds: 2,
        ..ApiConfig::default()
    };
    let client = HttpChatClient::new(&config).unwrap();
    let results = client
        .stream("hello", &RemoteConversationId::generate())
        .collect::<Vec<_>>()
        .await;

    assert_eq!(results.len(), 1);
    let err = results[0].as_ref().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AskmeError>(),
        Some(AskmeError::Transport(_))
    ));
}

#[tokio::test]
async fn test_stream_is_lazy_until_polled() {
    let server = MockServer::start().await;
    mount_chat(&server, ResponseTemplate::new(200).set_body_raw("hi", "text/plain")).await;

    let client = HttpChatClient::new(&api_config(&server, true)).unwrap();
    let mut stream = client.stream("later", &RemoteConversationId::generate());

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(server.received_requests().await.unwrap().is_empty());

    assert_eq!(stream.next().await.unwrap().unwrap(), "hi");
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Database list
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_list_databases() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/list_database"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "database_list": ["catalog", "inventory"]
        })))
        .mount(&server)
        .await;

    let client = HttpChatClient::new(&api_config(&server, true)).unwrap();
    let databases = client.list_databases().await.unwrap();

    assert_eq!(databases, vec!["catalog", "inventory"]);
}

#[tokio::test]
async fn test_list_databases_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/list_database"))
        .respond_with(ResponseTemplate::new(500).set_body_raw("boom", "text/plain"))
        .mount(&server)
        .await;

    let client = HttpChatClient::new(&api_config(&server, true)).unwrap();
    let err = client.list_databases().await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<AskmeError>(),
        Some(AskmeError::HttpStatus { status: 500, .. })
    ));
}

#[tokio::test]
async fn test_list_databases_rejects_unexpected_json() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/list_database"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "tables": []
        })))
        .mount(&server)
        .await;

    let client = HttpChatClient::new(&api_config(&server, true)).unwrap();
    let err = client.list_databases().await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<AskmeError>(),
        Some(AskmeError::Transport(_))
    ));
}

// ---------------------------------------------------------------------------
// End to end
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_orchestrator_over_http_persists_response() {
    let server = MockServer::start().await;
    mount_chat(
        &server,
        ResponseTemplate::new(200).set_body_raw("Here is your answer.", "text/plain"),
    )
    .await;

    let (store, _dir) = common::create_temp_store().await;
    let client = Arc::new(HttpChatClient::new(&api_config(&server, true)).unwrap());
    let chat = ChatOrchestrator::new(store.clone(), client, &common::chat_config(None));
    let remote = chat.snapshot().remote_conversation_id;

    let turn = chat.send("question").await.into_turn().unwrap();
    assert_eq!(turn.wait().await.unwrap(), TurnOutcome::Completed);

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["SessionID"], remote.as_str());
    assert_eq!(body["UserPrompt"], "question");

    let id = chat.snapshot().session_id.unwrap();
    let messages = store.messages_for_session(&id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content, "Here is your answer.");
}

#[tokio::test]
async fn test_orchestrator_over_http_error_status() {
    let server = MockServer::start().await;
    mount_chat(&server, ResponseTemplate::new(500).set_body_raw("boom", "text/plain")).await;

    let (store, _dir) = common::create_temp_store().await;
    let client = Arc::new(HttpChatClient::new(&api_config(&server, true)).unwrap());
    let chat = ChatOrchestrator::new(store.clone(), client, &common::chat_config(None));

    let turn = chat.send("question").await.into_turn().unwrap();
    let placeholder_id = turn.placeholder_id().clone();
    assert_eq!(turn.wait().await.unwrap(), TurnOutcome::Failed);

    let view = chat.snapshot();
    let placeholder = view.message(&placeholder_id).unwrap();
    assert!(placeholder.error);
    assert!(placeholder.content.contains("HTTP 500: boom"));

    let id = view.session_id.unwrap();
    assert_eq!(store.messages_for_session(&id).await.unwrap().len(), 1);
}
