//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.entrena/config.json`) and
//! environment. Covers the workflow backend endpoint, the dev relay, chat
//! behavior toggles, and the optional signed-in profile.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::storage::StorageScope;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Workflow backend endpoint settings.
    #[serde(default)]
    pub workflow: WorkflowConfig,

    /// Dev relay (same-origin proxy) settings.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Chat behavior toggles.
    #[serde(default)]
    pub chat: ChatConfig,

    /// Signed-in profile. Absent means guest.
    #[serde(default)]
    pub profile: Option<Profile>,
}

/// Where chat turns are posted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowConfig {
    /// Absolute URL of the production workflow webhook.
    #[serde(default = "default_workflow_url")]
    pub url: String,

    /// Relative path served by the relay; used instead of `url` when the
    /// workflow host is local.
    #[serde(default = "default_proxy_path")]
    pub proxy_path: String,
}

/// Relay bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// Port for the relay HTTP server (default 15280).
    #[serde(default = "default_relay_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_relay_bind")]
    pub bind: String,
}

/// Chat session behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatConfig {
    /// Persist the list after every mutation (default true).
    #[serde(default = "default_true")]
    pub auto_save: bool,

    /// Hydrate the session from storage on startup (default true).
    #[serde(default = "default_true")]
    pub load_from_storage: bool,

    /// Most recent history entries included in each payload.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Override the conversations directory (default ~/.entrena/conversations).
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,
}

/// Authenticated identity as supplied by the platform's session provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub name: Option<String>,
    /// Training level (e.g. "principiante", "intermedio", "avanzado").
    pub level: Option<String>,
    pub goals: Option<String>,
    #[serde(default)]
    pub equipment: Vec<String>,
    pub time_per_session_min: Option<u32>,
}

/// Identity context carried in every chat payload: a signed-in profile or the
/// guest marker `{"not_logged": true}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserContext {
    Member(Profile),
    Guest(GuestMarker),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestMarker {
    pub not_logged: bool,
}

impl UserContext {
    pub fn guest() -> Self {
        UserContext::Guest(GuestMarker { not_logged: true })
    }

    pub fn from_profile(profile: Option<Profile>) -> Self {
        match profile {
            Some(p) => UserContext::Member(p),
            None => Self::guest(),
        }
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, UserContext::Guest(_))
    }

    /// Storage partition for this identity.
    pub fn scope(&self) -> StorageScope {
        match self {
            UserContext::Member(p) => StorageScope::User(p.id.clone()),
            UserContext::Guest(_) => StorageScope::Guest,
        }
    }
}

fn default_workflow_url() -> String {
    "https://flows.entrena.app/webhook/support-chat".to_string()
}

fn default_proxy_path() -> String {
    "/api/chat".to_string()
}

fn default_relay_port() -> u16 {
    15280
}

fn default_relay_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_true() -> bool {
    true
}

fn default_history_limit() -> usize {
    20
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            url: default_workflow_url(),
            proxy_path: default_proxy_path(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: default_relay_port(),
            bind: default_relay_bind(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            auto_save: default_true(),
            load_from_storage: default_true(),
            history_limit: default_history_limit(),
            storage_dir: None,
        }
    }
}

/// True if the URL's host is loopback (127.0.0.1, ::1, localhost).
pub fn is_local_url(url: &str) -> bool {
    let rest = url
        .trim()
        .strip_prefix("https://")
        .or_else(|| url.trim().strip_prefix("http://"))
        .unwrap_or(url.trim());
    let host = rest.split(['/', ':']).next().unwrap_or("");
    host == "127.0.0.1" || host == "::1" || host == "localhost"
}

/// Resolve where the client posts chat turns: a local workflow host goes
/// through the relay's proxy path (same-origin in the web client); anything
/// else is the absolute production URL.
pub fn resolve_chat_endpoint(config: &Config) -> String {
    if config.workflow.url.trim().is_empty() || is_local_url(&config.workflow.url) {
        format!(
            "http://{}:{}{}",
            config.relay.bind, config.relay.port, config.workflow.proxy_path
        )
    } else {
        config.workflow.url.trim().to_string()
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("ENTRENA_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".entrena").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Resolve the conversations directory: config override or ~/.entrena/conversations.
pub fn resolve_conversations_dir(config: &Config) -> PathBuf {
    config.chat.storage_dir.clone().unwrap_or_else(|| {
        dirs::home_dir()
            .map(|h| h.join(".entrena").join("conversations"))
            .unwrap_or_else(|| PathBuf::from("conversations"))
    })
}

/// Load config from the default path (or ENTRENA_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_relay_port_and_bind() {
        let r = RelayConfig::default();
        assert_eq!(r.port, 15280);
        assert_eq!(r.bind, "127.0.0.1");
    }

    #[test]
    fn remote_workflow_url_is_used_directly() {
        let config = Config::default();
        assert_eq!(
            resolve_chat_endpoint(&config),
            "https://flows.entrena.app/webhook/support-chat"
        );
    }

    #[test]
    fn local_workflow_url_goes_through_relay() {
        let mut config = Config::default();
        config.workflow.url = "http://localhost:5678/webhook/support-chat".to_string();
        assert_eq!(resolve_chat_endpoint(&config), "http://127.0.0.1:15280/api/chat");
    }

    #[test]
    fn guest_marker_serializes_not_logged() {
        let json = serde_json::to_value(UserContext::guest()).unwrap();
        assert_eq!(json, serde_json::json!({ "not_logged": true }));
    }

    #[test]
    fn scope_follows_identity() {
        assert_eq!(UserContext::guest().scope().key(), "guest");
        let member = UserContext::from_profile(Some(Profile {
            id: "42".into(),
            name: Some("Ana".into()),
            level: None,
            goals: None,
            equipment: vec![],
            time_per_session_min: None,
        }));
        assert_eq!(member.scope().key(), "user_42");
    }
}
