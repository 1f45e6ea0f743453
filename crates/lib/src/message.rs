//! Message types for the support chat: roles, delivery status, and the wire
//! form of prior turns sent to the workflow backend.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// Delivery/generation state. `Sending` covers both an in-flight user message
/// and an assistant message whose content is still streaming in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    Sent,
    Error,
}

/// A single message in the conversation.
///
/// Ordering is list-insertion order; `timestamp` is used only for display and
/// storage-expiry bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
    /// Creation time, epoch milliseconds.
    pub timestamp: i64,
    pub status: MessageStatus,
}

impl ChatMessage {
    /// New user message in `Sending` state (delivery not yet confirmed).
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content, MessageStatus::Sending)
    }

    /// New assistant message with finalized content.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content, MessageStatus::Sent)
    }

    /// Assistant placeholder for a streaming reply: empty content until the
    /// stream finishes.
    pub fn assistant_pending() -> Self {
        Self::new(ChatRole::Assistant, "", MessageStatus::Sending)
    }

    fn new(role: ChatRole, content: impl Into<String>, status: MessageStatus) -> Self {
        Self {
            id: new_message_id(),
            role,
            content: content.into(),
            timestamp: Utc::now().timestamp_millis(),
            status,
        }
    }
}

/// Wire form of a prior turn: role and content only, no status or timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: ChatRole,
    pub content: String,
}

impl From<&ChatMessage> for HistoryEntry {
    fn from(m: &ChatMessage) -> Self {
        Self {
            role: m.role,
            content: m.content.clone(),
        }
    }
}

/// Message id: creation time plus a short random suffix. Unique within one
/// session, which is all the list and retry logic need.
pub fn new_message_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("msg-{}-{}", Utc::now().timestamp_millis(), &suffix[..8])
}
