//! Auto-scroll heuristics for the message viewport.
//!
//! Decides, after every list change, whether to follow the newest message or
//! to surface a "new messages below" affordance instead — without yanking the
//! viewport down while the user is reading older messages. Pure state machine
//! over viewport metrics; the host (web view, TUI, tests) owns the actual
//! scrolling.

use std::time::{Duration, Instant};

/// Distance from the bottom (px) still counted as "near bottom".
pub const NEAR_BOTTOM_THRESHOLD: f32 = 200.0;
/// How long after the last scroll event the user still counts as mid-scroll.
const SCROLL_SETTLE: Duration = Duration::from_millis(300);
/// Delay before a follow scroll, letting layout settle after an append.
const FOLLOW_DELAY: Duration = Duration::from_millis(100);

/// Viewport geometry at the time of a scroll event.
#[derive(Debug, Clone, Copy)]
pub struct ViewportMetrics {
    pub scroll_top: f32,
    pub scroll_height: f32,
    pub client_height: f32,
}

impl ViewportMetrics {
    fn near_bottom(&self) -> bool {
        self.scroll_height - self.scroll_top - self.client_height <= NEAR_BOTTOM_THRESHOLD
    }
}

/// Instruction for the host: scroll the viewport to the newest message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollToBottom {
    /// Animate the scroll (false only for the initial anchor jump).
    pub smooth: bool,
    /// Wait this long before scrolling so layout can settle.
    pub delay: Duration,
}

/// Tracks follow state for one message viewport.
///
/// The sticky `user_has_scrolled_up` latch is the core of the design: once
/// the user scrolls upward, appends stop auto-following until they return
/// near the bottom on their own or jump there explicitly.
#[derive(Debug)]
pub struct ScrollTracker {
    last_scroll_top: f32,
    last_metrics: Option<ViewportMetrics>,
    last_scroll_at: Option<Instant>,
    user_has_scrolled_up: bool,
    show_scroll_button: bool,
    message_count: usize,
}

impl Default for ScrollTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ScrollTracker {
    pub fn new() -> Self {
        Self {
            last_scroll_top: 0.0,
            last_metrics: None,
            last_scroll_at: None,
            user_has_scrolled_up: false,
            show_scroll_button: false,
            message_count: 0,
        }
    }

    /// Attach to a freshly rendered viewport. Always returns an immediate
    /// non-animated jump: a no-op on an empty list, but it establishes the
    /// scroll anchor for hydrated conversations.
    pub fn attach(&mut self, message_count: usize) -> ScrollToBottom {
        self.message_count = message_count;
        ScrollToBottom {
            smooth: false,
            delay: Duration::ZERO,
        }
    }

    /// Record a scroll event.
    pub fn observe_scroll(&mut self, metrics: ViewportMetrics) {
        self.observe_scroll_at(metrics, Instant::now());
    }

    pub fn observe_scroll_at(&mut self, metrics: ViewportMetrics, now: Instant) {
        // Upward movement sets the latch; returning near the bottom clears it.
        if metrics.scroll_top < self.last_scroll_top {
            self.user_has_scrolled_up = true;
        }
        let near_bottom = metrics.near_bottom();
        self.show_scroll_button = !near_bottom;
        if near_bottom {
            self.user_has_scrolled_up = false;
        }
        self.last_scroll_top = metrics.scroll_top;
        self.last_metrics = Some(metrics);
        self.last_scroll_at = Some(now);
    }

    /// React to a change in the number of messages. Returns the follow
    /// command when the viewport should track the newest message.
    pub fn messages_changed(&mut self, count: usize) -> Option<ScrollToBottom> {
        self.messages_changed_at(count, Instant::now())
    }

    pub fn messages_changed_at(&mut self, count: usize, now: Instant) -> Option<ScrollToBottom> {
        if count == self.message_count {
            return None;
        }
        self.message_count = count;

        if !self.user_has_scrolled_up && (!self.is_user_scrolling(now) || self.was_near_bottom()) {
            self.show_scroll_button = false;
            return Some(ScrollToBottom {
                smooth: true,
                delay: FOLLOW_DELAY,
            });
        }
        if self.user_has_scrolled_up {
            self.show_scroll_button = true;
        }
        None
    }

    /// Explicit jump (the "new messages" affordance): always follows and
    /// clears both the affordance and the latch.
    pub fn jump_to_bottom(&mut self) -> ScrollToBottom {
        self.user_has_scrolled_up = false;
        self.show_scroll_button = false;
        ScrollToBottom {
            smooth: true,
            delay: Duration::ZERO,
        }
    }

    /// Forget all scroll state (the list was cleared).
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn show_scroll_button(&self) -> bool {
        self.show_scroll_button
    }

    pub fn user_has_scrolled_up(&self) -> bool {
        self.user_has_scrolled_up
    }

    fn is_user_scrolling(&self, now: Instant) -> bool {
        self.last_scroll_at
            .is_some_and(|at| now.duration_since(at) < SCROLL_SETTLE)
    }

    fn was_near_bottom(&self) -> bool {
        // No scroll seen yet: the viewport never left the bottom.
        self.last_metrics.map(|m| m.near_bottom()).unwrap_or(true)
    }
}
