//! Workflow backend client: HTTP POST of the chat payload.
//!
//! Supports non-streaming JSON replies and streaming chat (NDJSON, requested
//! via the Accept header). The backend is a black box; only the payload shape
//! and the reply shapes in [`crate::reply`] are contract.

use async_trait::async_trait;
use chrono::Utc;
use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;

use crate::config::{resolve_chat_endpoint, Config, UserContext};
use crate::message::HistoryEntry;

/// Banner text when the backend itself is failing (HTTP 5xx).
pub const SERVER_TROUBLE: &str =
    "El servidor está teniendo problemas. Inténtalo de nuevo en unos minutos.";
/// Banner text when the request could not be completed at all.
pub const CONNECTION_FAILURE: &str =
    "No se pudo conectar con el asistente. Comprueba tu conexión e inténtalo de nuevo.";
/// Banner text for a 2xx with nothing in it.
pub const EMPTY_RESPONSE: &str = "El servidor devolvió una respuesta vacía. Inténtalo de nuevo.";

/// One chat turn as posted to the workflow backend.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub session_id: String,
    /// The new user turn.
    pub message: String,
    /// Prior turns, oldest first, excluding `message`.
    pub history: Vec<HistoryEntry>,
    pub user: UserContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ClientMeta>,
}

/// Optional client metadata attached to each request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMeta {
    pub user_agent: String,
    /// Client-side send time, epoch millis.
    pub sent_at: i64,
}

impl ClientMeta {
    pub fn current() -> Self {
        Self {
            user_agent: format!("entrena-chat/{}", env!("CARGO_PKG_VERSION")),
            sent_at: Utc::now().timestamp_millis(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("workflow request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("workflow api error: {status} {body}")]
    Api { status: u16, body: String },
    #[error("workflow response was empty")]
    EmptyBody,
    #[error("workflow response was not valid JSON: {0}")]
    Malformed(serde_json::Error),
}

impl WorkflowError {
    /// Human-readable banner text per the error taxonomy: 5xx gets the fixed
    /// "server trouble" string, other API errors surface the raw body when
    /// there is one, everything else degrades to a generic connection failure.
    pub fn user_message(&self) -> String {
        match self {
            WorkflowError::Api { status, .. } if *status >= 500 => SERVER_TROUBLE.to_string(),
            WorkflowError::Api { body, .. } if !body.trim().is_empty() => {
                body.trim().to_string()
            }
            WorkflowError::EmptyBody => EMPTY_RESPONSE.to_string(),
            _ => CONNECTION_FAILURE.to_string(),
        }
    }
}

/// Transport to the workflow backend. Object-shaped so tests can inject a
/// mock without a server.
#[async_trait]
pub trait WorkflowBackend: Send + Sync {
    /// POST the payload; returns the parsed JSON body of a 2xx response.
    async fn send(&self, request: &ChatRequest) -> Result<Value, WorkflowError>;

    /// Streaming send: feeds reply deltas through `on_chunk` and returns the
    /// accumulated text. Backends without streaming fall back to a single
    /// chunk carrying the whole normalized reply.
    async fn send_streaming(
        &self,
        request: &ChatRequest,
        on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<String, WorkflowError> {
        let body = self.send(request).await?;
        let text = crate::reply::normalize_reply(&body);
        on_chunk(&text);
        Ok(text)
    }
}

/// HTTP client for the workflow backend.
#[derive(Clone)]
pub struct WorkflowClient {
    endpoint: String,
    client: reqwest::Client,
}

impl WorkflowClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Client for the endpoint the config resolves to (relay path for local
    /// workflow hosts, production URL otherwise).
    pub fn from_config(config: &Config) -> Self {
        Self::new(resolve_chat_endpoint(config))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl WorkflowBackend for WorkflowClient {
    async fn send(&self, request: &ChatRequest) -> Result<Value, WorkflowError> {
        let res = self.client.post(&self.endpoint).json(request).send().await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(WorkflowError::Api { status, body });
        }
        let text = res.text().await?;
        if text.trim().is_empty() {
            return Err(WorkflowError::EmptyBody);
        }
        serde_json::from_str(&text).map_err(WorkflowError::Malformed)
    }

    /// POST with `Accept: application/x-ndjson`. Each NDJSON line carries a
    /// partial reply in `output` (or `text`); lines that do not parse are
    /// skipped. Returns the accumulated reply text.
    async fn send_streaming(
        &self,
        request: &ChatRequest,
        on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<String, WorkflowError> {
        let res = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/x-ndjson")
            .json(request)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(WorkflowError::Api { status, body });
        }

        let mut stream = res.bytes_stream();
        let mut buffer = Vec::new();
        let mut content = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(WorkflowError::Request)?;
            buffer.extend_from_slice(&chunk);
            while let Some(i) = buffer.iter().position(|&b| b == b'\n') {
                let line_bytes: Vec<u8> = buffer.drain(..i).collect();
                buffer.drain(..1);
                let line = String::from_utf8_lossy(&line_bytes).trim().to_string();
                if line.is_empty() {
                    continue;
                }
                let event: Value = match serde_json::from_str(&line) {
                    Ok(v) => v,
                    Err(_) => continue,
                };
                let delta = event
                    .get("output")
                    .and_then(Value::as_str)
                    .or_else(|| event.get("text").and_then(Value::as_str));
                if let Some(delta) = delta {
                    if !delta.is_empty() {
                        on_chunk(delta);
                        content.push_str(delta);
                    }
                }
            }
        }

        if content.trim().is_empty() {
            return Err(WorkflowError::EmptyBody);
        }
        Ok(content)
    }
}
