//! Unsaved-conversation guard for guest sessions.
//!
//! Guests have no account to save to, so leaving the chat (or the page)
//! silently drops the conversation. This module decides when a confirmation
//! is required and applies the discard synchronously, so the next route never
//! renders stale messages.

use crate::config::UserContext;
use crate::session::ChatSession;
use crate::workflow::WorkflowBackend;

/// What the user picked in the in-app confirmation dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveChoice {
    /// Stay on the chat.
    Cancel,
    /// Go to the login page so the conversation can be saved.
    GoToLogin,
    /// Drop the conversation and leave.
    Discard,
}

/// Outcome the host should act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    Stay,
    GoToLogin,
    Leave,
}

/// True when navigating away would lose data: guest identity with a
/// non-empty conversation. Drives both the platform-native "discard page?"
/// interception (whose text the platform owns) and the in-app dialog.
pub fn is_active(user: &UserContext, message_count: usize) -> bool {
    user.is_guest() && message_count > 0
}

/// Whether the native page-leave interception should currently be armed.
pub fn native_prompt_armed<B: WorkflowBackend>(session: &ChatSession<B>) -> bool {
    is_active(session.user(), session.message_count())
}

/// Apply the user's choice. `Discard` clears memory and storage before
/// returning, so the caller may navigate immediately.
pub fn resolve_leave<B: WorkflowBackend>(
    session: &mut ChatSession<B>,
    choice: LeaveChoice,
) -> LeaveOutcome {
    match choice {
        LeaveChoice::Cancel => LeaveOutcome::Stay,
        LeaveChoice::GoToLogin => LeaveOutcome::GoToLogin,
        LeaveChoice::Discard => {
            session.clear();
            LeaveOutcome::Leave
        }
    }
}
