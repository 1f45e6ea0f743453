//! Chat session core: owns the message list and the send lifecycle.
//!
//! One send may be in flight at a time; empty input and sends while busy are
//! ignored. A failed send stays in the list with `Error` status until it is
//! retried or the conversation is cleared. Every successful mutation is
//! snapshotted to the conversation store (best-effort, per config).

use crate::config::{ChatConfig, UserContext};
use crate::message::{ChatMessage, ChatRole, HistoryEntry, MessageStatus};
use crate::reply::normalize_reply;
use crate::storage::ConversationStore;
use crate::workflow::{ChatRequest, ClientMeta, WorkflowBackend};

/// Conversation state machine over a [`WorkflowBackend`].
///
/// The session id is lazily created on first send and memoized on the
/// instance, so independent sessions in one process never share ids.
pub struct ChatSession<B: WorkflowBackend> {
    backend: B,
    store: ConversationStore,
    user: UserContext,
    auto_save: bool,
    history_limit: usize,
    session_id: Option<String>,
    messages: Vec<ChatMessage>,
    last_sent_text: Option<String>,
    error: Option<String>,
    is_loading: bool,
}

impl<B: WorkflowBackend> ChatSession<B> {
    /// Build a session for the given identity. Hydrates from the store when
    /// the config asks for it.
    pub fn new(backend: B, store: ConversationStore, user: UserContext, chat: &ChatConfig) -> Self {
        let messages = if chat.load_from_storage {
            store.load()
        } else {
            Vec::new()
        };
        Self {
            backend,
            store,
            user,
            auto_save: chat.auto_save,
            history_limit: chat.history_limit,
            session_id: None,
            messages,
            last_sent_text: None,
            error: None,
            is_loading: false,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    /// Current banner error, if the last send failed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn user(&self) -> &UserContext {
        &self.user
    }

    /// True when there is a failed send that [`retry_last`](Self::retry_last)
    /// would replay.
    pub fn can_retry(&self) -> bool {
        self.error.is_some() && self.last_sent_text.is_some()
    }

    /// Session id, created on first use and reused for this instance's lifetime.
    pub fn session_id(&mut self) -> &str {
        self.session_id
            .get_or_insert_with(|| format!("sess-{}", uuid::Uuid::new_v4()))
    }

    /// Send a user turn.
    ///
    /// Empty/whitespace input and sends while a request is in flight are
    /// silent no-ops. On success the assistant reply is appended and
    /// returned; on failure the user message keeps `Error` status and
    /// [`error`](Self::error) carries the banner text.
    pub async fn send(&mut self, text: &str) -> Option<&ChatMessage> {
        let text = text.trim().to_string();
        if text.is_empty() || self.is_loading {
            return None;
        }

        self.error = None;
        self.is_loading = true;
        self.last_sent_text = Some(text.clone());

        // History is the list before this turn, status/timestamp stripped;
        // failed turns were never delivered so they stay out.
        let request = self.build_request(&text);
        self.messages.push(ChatMessage::user(&text));
        self.persist();

        let result = self.backend.send(&request).await;
        self.is_loading = false;
        match result {
            Ok(body) => {
                self.mark_last_user(MessageStatus::Sent);
                self.messages.push(ChatMessage::assistant(normalize_reply(&body)));
                self.persist();
                self.messages.last()
            }
            Err(e) => {
                log::warn!("chat send failed: {}", e);
                self.mark_last_user(MessageStatus::Error);
                self.error = Some(e.user_message());
                self.persist();
                None
            }
        }
    }

    /// Streaming variant of [`send`](Self::send): appends an empty assistant
    /// placeholder, forwards reply deltas through `on_chunk` for display, and
    /// finalizes the placeholder with the accumulated text.
    pub async fn send_streaming(
        &mut self,
        text: &str,
        on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Option<&ChatMessage> {
        let text = text.trim().to_string();
        if text.is_empty() || self.is_loading {
            return None;
        }

        self.error = None;
        self.is_loading = true;
        self.last_sent_text = Some(text.clone());

        let request = self.build_request(&text);
        self.messages.push(ChatMessage::user(&text));
        self.messages.push(ChatMessage::assistant_pending());
        self.persist();

        let result = self.backend.send_streaming(&request, on_chunk).await;
        self.is_loading = false;
        match result {
            Ok(content) => {
                if let Some(pending) = self.messages.last_mut() {
                    pending.content = content;
                    pending.status = MessageStatus::Sent;
                }
                self.mark_last_user(MessageStatus::Sent);
                self.persist();
                self.messages.last()
            }
            Err(e) => {
                log::warn!("chat stream failed: {}", e);
                // Drop the placeholder; the failed user message stays visible.
                if self
                    .messages
                    .last()
                    .is_some_and(|m| m.role == ChatRole::Assistant && m.status == MessageStatus::Sending)
                {
                    self.messages.pop();
                }
                self.mark_last_user(MessageStatus::Error);
                self.error = Some(e.user_message());
                self.persist();
                None
            }
        }
    }

    /// Replay the last failed text: remove the failed user message(s) with
    /// that exact text, clear the error, and run a fresh send.
    pub async fn retry_last(&mut self) -> Option<&ChatMessage> {
        if !self.can_retry() || self.is_loading {
            return None;
        }
        let text = match self.last_sent_text.clone() {
            Some(t) => t,
            None => return None,
        };
        self.messages.retain(|m| {
            !(m.role == ChatRole::User && m.status == MessageStatus::Error && m.content == text)
        });
        self.error = None;
        self.persist();
        self.send(&text).await
    }

    /// Clear the banner without retrying. The failed message keeps its
    /// `Error` status in the list.
    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    /// Drop the whole conversation: memory, error state, and the stored
    /// snapshot for this scope. Synchronous, so callers can navigate away
    /// immediately afterwards without racing a pending write.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.error = None;
        self.last_sent_text = None;
        self.store.clear();
    }

    fn build_request(&mut self, text: &str) -> ChatRequest {
        let history: Vec<HistoryEntry> = self
            .messages
            .iter()
            .filter(|m| m.status == MessageStatus::Sent)
            .map(HistoryEntry::from)
            .collect();
        let skip = history.len().saturating_sub(self.history_limit);
        ChatRequest {
            session_id: self.session_id().to_string(),
            message: text.to_string(),
            history: history.into_iter().skip(skip).collect(),
            user: self.user.clone(),
            meta: Some(ClientMeta::current()),
        }
    }

    fn mark_last_user(&mut self, status: MessageStatus) {
        if let Some(m) = self
            .messages
            .iter_mut()
            .rev()
            .find(|m| m.role == ChatRole::User)
        {
            m.status = status;
        }
    }

    fn persist(&self) {
        if self.auto_save {
            self.store.save(&self.messages);
        }
    }

    #[cfg(test)]
    fn set_loading(&mut self, loading: bool) {
        self.is_loading = loading;
    }
}
