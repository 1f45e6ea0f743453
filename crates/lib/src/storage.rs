//! Conversation persistence: per-identity JSON snapshots with a save
//! timestamp and a retention window.
//!
//! Two files per scope under the conversations directory:
//! `<base>_<scope>.json` holds the serialized message list and
//! `<base>_<scope>.ts` the save time (epoch millis). Persistence is
//! best-effort: every failure is logged and swallowed so the in-memory chat
//! keeps working without it.

use crate::message::ChatMessage;
use chrono::Utc;
use std::path::{Path, PathBuf};

/// Stored conversations older than this are treated as absent.
pub const RETENTION_MS: i64 = 7 * 24 * 60 * 60 * 1000;

const DEFAULT_BASE_KEY: &str = "entrena_chat";

/// Storage partition. Guests share one partition; each signed-in user gets
/// their own, so switching identity never leaks a conversation across scopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageScope {
    Guest,
    User(String),
}

impl StorageScope {
    /// Key fragment: `guest` or `user_<id>`.
    pub fn key(&self) -> String {
        match self {
            StorageScope::Guest => "guest".to_string(),
            StorageScope::User(id) => format!("user_{}", id),
        }
    }
}

/// File-backed store for one scope's conversation.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    dir: PathBuf,
    base_key: String,
    scope: StorageScope,
}

impl ConversationStore {
    pub fn new(dir: impl Into<PathBuf>, scope: StorageScope) -> Self {
        Self {
            dir: dir.into(),
            base_key: DEFAULT_BASE_KEY.to_string(),
            scope,
        }
    }

    /// Load the stored message list. Absent, malformed, or expired records all
    /// read as empty; an expired record is eagerly cleared on the way out.
    pub fn load(&self) -> Vec<ChatMessage> {
        match self.read_stamp() {
            Some(saved_at) if !is_expired(saved_at, Utc::now().timestamp_millis()) => {}
            Some(_) => {
                log::debug!("stored conversation for {} expired, clearing", self.scope.key());
                self.clear();
                return Vec::new();
            }
            None => {
                // No stamp means no record (or a stale payload without one).
                return Vec::new();
            }
        }
        let s = match std::fs::read_to_string(self.messages_path()) {
            Ok(s) => s,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_str(&s) {
            Ok(messages) => messages,
            Err(e) => {
                log::warn!("stored conversation for {} is malformed: {}", self.scope.key(), e);
                Vec::new()
            }
        }
    }

    /// Persist a snapshot of the list and stamp it with the current time.
    /// An empty list behaves as [`clear`](Self::clear).
    pub fn save(&self, messages: &[ChatMessage]) {
        if messages.is_empty() {
            self.clear();
            return;
        }
        let json = match serde_json::to_string(messages) {
            Ok(j) => j,
            Err(e) => {
                log::warn!("serialize conversation for {}: {}", self.scope.key(), e);
                return;
            }
        };
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            log::warn!("create conversations dir {}: {}", self.dir.display(), e);
            return;
        }
        if let Err(e) = std::fs::write(self.messages_path(), json) {
            log::warn!("write conversation for {}: {}", self.scope.key(), e);
            return;
        }
        let now = Utc::now().timestamp_millis();
        if let Err(e) = std::fs::write(self.stamp_path(), now.to_string()) {
            log::warn!("write conversation stamp for {}: {}", self.scope.key(), e);
        }
    }

    /// Remove both the message payload and its stamp for this scope.
    pub fn clear(&self) {
        remove_if_present(&self.messages_path());
        remove_if_present(&self.stamp_path());
    }

    /// True when a non-expired record exists, without loading it.
    pub fn has_stored(&self) -> bool {
        if !self.messages_path().exists() {
            return false;
        }
        match self.read_stamp() {
            Some(saved_at) => !is_expired(saved_at, Utc::now().timestamp_millis()),
            None => false,
        }
    }

    fn messages_path(&self) -> PathBuf {
        self.dir.join(format!("{}_{}.json", self.base_key, self.scope.key()))
    }

    fn stamp_path(&self) -> PathBuf {
        self.dir.join(format!("{}_{}.ts", self.base_key, self.scope.key()))
    }

    fn read_stamp(&self) -> Option<i64> {
        let s = std::fs::read_to_string(self.stamp_path()).ok()?;
        s.trim().parse().ok()
    }
}

fn is_expired(saved_at: i64, now: i64) -> bool {
    now - saved_at > RETENTION_MS
}

fn remove_if_present(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("remove {}: {}", path.display(), e);
        }
    }
}
