//! Dev relay: same-origin proxy in front of the workflow backend.
//!
//! Local development serves the chat from a loopback host, so the client
//! posts to a relative path on this relay instead of the production URL; the
//! relay forwards the payload unchanged and hands the reply back with the
//! upstream status. `GET /` returns health JSON.

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::config::Config;

const PROTOCOL_VERSION: u32 = 1;

#[derive(Clone)]
struct RelayState {
    upstream: String,
    client: reqwest::Client,
    port: u16,
}

/// Run the relay until ctrl-c. Binds `relay.bind:relay.port` and forwards
/// `workflow.proxyPath` POSTs to `workflow.url`.
pub async fn run_relay(config: Config) -> Result<()> {
    let addr = format!("{}:{}", config.relay.bind, config.relay.port);
    let state = RelayState {
        upstream: config.workflow.url.trim().to_string(),
        client: reqwest::Client::new(),
        port: config.relay.port,
    };

    let app = Router::new()
        .route("/", get(health_http))
        .route(&config.workflow.proxy_path, post(forward_chat))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding relay on {}", addr))?;
    log::info!("relay listening on {} -> {}", addr, config.workflow.url);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("relay server")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("ctrl-c handler failed: {}", e);
    }
    log::info!("relay shutting down");
}

async fn health_http(State(state): State<RelayState>) -> Json<Value> {
    Json(json!({
        "runtime": "running",
        "protocol": PROTOCOL_VERSION,
        "port": state.port,
    }))
}

/// Forward the chat payload to the upstream workflow. The upstream status and
/// body pass through; a transport failure maps to 502 with an error JSON.
async fn forward_chat(
    State(state): State<RelayState>,
    Json(payload): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let res = match state.client.post(&state.upstream).json(&payload).send().await {
        Ok(r) => r,
        Err(e) => {
            log::warn!("relay upstream unreachable: {}", e);
            return (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": format!("upstream unreachable: {}", e) })),
            );
        }
    };

    let status =
        StatusCode::from_u16(res.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let text = res.text().await.unwrap_or_default();
    // Non-JSON upstream bodies are wrapped so the client always sees JSON.
    let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
    (status, Json(body))
}
