//! Integration test: start the relay on a free port in front of a mock
//! workflow backend, POST through the proxy path, and assert health JSON and
//! payload passthrough. The server tasks are left running when the test ends.

use axum::{routing::post, Json, Router};
use lib::config::Config;
use lib::relay;
use serde_json::{json, Value};
use std::time::Duration;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

async fn start_upstream(port: u16) {
    let app = Router::new().route(
        "/webhook/support-chat",
        post(|Json(payload): Json<Value>| async move {
            Json(json!({ "output": format!("eco: {}", payload["message"].as_str().unwrap_or("")) }))
        }),
    );
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .expect("bind upstream");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
}

#[tokio::test]
async fn relay_health_and_passthrough() {
    let upstream_port = free_port();
    let relay_port = free_port();
    start_upstream(upstream_port).await;

    let mut config = Config::default();
    config.relay.port = relay_port;
    config.relay.bind = "127.0.0.1".to_string();
    config.workflow.url = format!("http://127.0.0.1:{}/webhook/support-chat", upstream_port);

    tokio::spawn(async move {
        let _ = relay::run_relay(config).await;
    });

    let health_url = format!("http://127.0.0.1:{}/", relay_port);
    let client = reqwest::Client::new();
    let mut last_err = None;
    for _ in 0..100 {
        match client.get(&health_url).send().await {
            Ok(resp) if resp.status().is_success() => {
                let json: Value = resp.json().await.expect("parse JSON");
                assert_eq!(json.get("runtime").and_then(|v| v.as_str()), Some("running"));
                assert_eq!(json.get("protocol").and_then(|v| v.as_u64()), Some(1));
                assert_eq!(json.get("port").and_then(|v| v.as_u64()), Some(relay_port as u64));

                // Proxy path forwards the payload and hands the reply back.
                let chat_url = format!("http://127.0.0.1:{}/api/chat", relay_port);
                let resp = client
                    .post(&chat_url)
                    .json(&json!({ "sessionId": "sess-test", "message": "Hola" }))
                    .send()
                    .await
                    .expect("post through relay");
                assert!(resp.status().is_success());
                let body: Value = resp.json().await.expect("parse reply");
                assert_eq!(body["output"], "eco: Hola");
                return;
            }
            Ok(_) => {}
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    panic!(
        "GET {} did not return 200 with health JSON within 5s; last error: {:?}",
        health_url, last_err
    );
}

#[tokio::test]
async fn relay_maps_dead_upstream_to_bad_gateway() {
    let relay_port = free_port();
    let dead_upstream = free_port();

    let mut config = Config::default();
    config.relay.port = relay_port;
    config.relay.bind = "127.0.0.1".to_string();
    config.workflow.url = format!("http://127.0.0.1:{}/webhook/support-chat", dead_upstream);

    tokio::spawn(async move {
        let _ = relay::run_relay(config).await;
    });

    let client = reqwest::Client::new();
    let health_url = format!("http://127.0.0.1:{}/", relay_port);
    for _ in 0..100 {
        if let Ok(resp) = client.get(&health_url).send().await {
            if resp.status().is_success() {
                let chat_url = format!("http://127.0.0.1:{}/api/chat", relay_port);
                let resp = client
                    .post(&chat_url)
                    .json(&json!({ "message": "Hola" }))
                    .send()
                    .await
                    .expect("post through relay");
                assert_eq!(resp.status().as_u16(), 502);
                let body: Value = resp.json().await.expect("parse error body");
                assert!(body.get("error").is_some());
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("relay on {} did not become healthy within 5s", health_url);
}
