//! Integration test: run a mock workflow backend on a free port and drive a
//! full guest turn through the session core, storage included.
//! Does not require the production workflow. The server task is left running
//! when the test ends.

use axum::{routing::get, routing::post, Json, Router};
use lib::config::{ChatConfig, UserContext};
use lib::session::ChatSession;
use lib::storage::{ConversationStore, StorageScope};
use lib::workflow::WorkflowClient;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

fn temp_conversations_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("entrena-chat-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create conversations dir");
    dir
}

/// Mock workflow: verifies the payload shape and answers in the `output` form.
async fn mock_chat(Json(payload): Json<Value>) -> Json<Value> {
    assert!(payload
        .get("sessionId")
        .and_then(|v| v.as_str())
        .is_some_and(|s| s.starts_with("sess-")));
    assert_eq!(payload["user"]["not_logged"], json!(true));
    assert!(payload.get("history").is_some_and(Value::is_array));
    let message = payload["message"].as_str().unwrap_or_default();
    Json(json!({ "output": format!("Aquí tienes: {}", message) }))
}

async fn start_mock_backend(port: u16) {
    let app = Router::new()
        .route("/", get(|| async { Json(json!({ "runtime": "running" })) }))
        .route("/webhook/support-chat", post(mock_chat));
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .expect("bind mock backend");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
}

async fn wait_until_healthy(port: u16) {
    let url = format!("http://127.0.0.1:{}/", port);
    let client = reqwest::Client::new();
    for _ in 0..100 {
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("mock backend on {} did not become healthy within 5s", url);
}

#[tokio::test]
async fn guest_turn_round_trips_through_backend_and_storage() {
    let port = free_port();
    start_mock_backend(port).await;
    wait_until_healthy(port).await;

    let dir = temp_conversations_dir();
    let client = WorkflowClient::new(format!("http://127.0.0.1:{}/webhook/support-chat", port));
    let store = ConversationStore::new(&dir, StorageScope::Guest);
    let mut session = ChatSession::new(client, store, UserContext::guest(), &ChatConfig::default());
    assert_eq!(session.message_count(), 0);

    let reply = session.send("Rutina 3 días").await.cloned();
    assert_eq!(reply.expect("assistant reply").content, "Aquí tienes: Rutina 3 días");
    assert_eq!(session.message_count(), 2);
    assert!(session.error().is_none());

    // The snapshot landed under the guest scope.
    let stored = ConversationStore::new(&dir, StorageScope::Guest).load();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1].content, "Aquí tienes: Rutina 3 días");

    // Clearing empties both memory and storage for that scope.
    session.clear();
    assert_eq!(session.message_count(), 0);
    let after_clear = ConversationStore::new(&dir, StorageScope::Guest);
    assert!(!after_clear.has_stored());
    assert!(after_clear.load().is_empty());
}

#[tokio::test]
async fn unreachable_backend_surfaces_retryable_error() {
    let dead_port = free_port();
    let dir = temp_conversations_dir();
    let client = WorkflowClient::new(format!("http://127.0.0.1:{}/webhook/support-chat", dead_port));
    let store = ConversationStore::new(&dir, StorageScope::Guest);
    let mut session = ChatSession::new(client, store, UserContext::guest(), &ChatConfig::default());

    assert!(session.send("Hola").await.is_none());
    assert_eq!(session.message_count(), 1);
    assert!(session.error().is_some());
    assert!(session.can_retry());

    // The backend comes up; a retry replays the same text and succeeds.
    start_mock_backend(dead_port).await;
    wait_until_healthy(dead_port).await;
    let reply = session.retry_last().await.cloned();
    assert_eq!(reply.expect("assistant reply").content, "Aquí tienes: Hola");
    assert_eq!(
        session
            .messages()
            .iter()
            .filter(|m| m.content == "Hola")
            .count(),
        1
    );
}
