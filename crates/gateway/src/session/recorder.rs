//! Derives semantic Steps from a stream of normalized input signals.
//!
//! A small state machine, not a crate dependency — no example repo records
//! user interactions, so this is new, but it mirrors the reference
//! gateway's preference for plain structs with an internal mutex over a
//! channel-actor for single-owner, low-volume state (see `rate_limit.rs`'s
//! `Bucket`). `now: Instant` is threaded through every entry point so tests
//! can simulate time instead of sleeping.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::browser::{ElementDescriptor, NavigationTrigger};
use crate::session::step::{Modifier, MouseButton, StepAction};

const CLICK_PAIR_WINDOW: Duration = Duration::from_millis(500);
const TYPE_IDLE_WINDOW: Duration = Duration::from_millis(1000);
const SCROLL_BATCH_WINDOW: Duration = Duration::from_millis(250);

/// Coordinate-equality tolerance for pairing a mouse down with its up.
const CLICK_POSITION_EPSILON: f64 = 2.0;

/// A step produced by the recorder, plus whatever the caller needs to take
/// a highlighted screenshot (the element's bounding box, if one is known).
#[derive(Debug, Clone)]
pub struct RecordedStep {
    pub action: StepAction,
    pub highlight: Option<ElementDescriptor>,
}

struct PendingClick {
    x: f64,
    y: f64,
    button: MouseButton,
    element: Option<ElementDescriptor>,
    at: Instant,
}

struct PendingType {
    element: Option<ElementDescriptor>,
    text: String,
    last_at: Instant,
}

struct PendingScroll {
    x: f64,
    y: f64,
    delta_x: f64,
    delta_y: f64,
    window_start: Instant,
}

#[derive(Default)]
struct RecorderState {
    pending_click: Option<PendingClick>,
    pending_type: Option<PendingType>,
    pending_scroll: Option<PendingScroll>,
    current_url: Option<String>,
}

pub struct StepRecorder {
    state: Mutex<RecorderState>,
}

impl Default for StepRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl StepRecorder {
    pub fn new() -> Self {
        Self { state: Mutex::new(RecorderState::default()) }
    }

    pub async fn on_mouse_down(
        &self,
        now: Instant,
        x: f64,
        y: f64,
        button: MouseButton,
        element: Option<ElementDescriptor>,
    ) {
        let mut state = self.state.lock().await;
        state.pending_click = Some(PendingClick { x, y, button, element, at: now });
    }

    /// Completes a click iff a down event for the same button landed at
    /// roughly the same point within the pairing window.
    pub async fn on_mouse_up(&self, now: Instant, x: f64, y: f64, button: MouseButton) -> Vec<RecordedStep> {
        let mut state = self.state.lock().await;
        let Some(down) = state.pending_click.take() else { return Vec::new() };
        if down.button != button || now.duration_since(down.at) > CLICK_PAIR_WINDOW {
            return Vec::new();
        }
        if (down.x - x).abs() > CLICK_POSITION_EPSILON || (down.y - y).abs() > CLICK_POSITION_EPSILON {
            return Vec::new();
        }
        vec![RecordedStep {
            highlight: down.element.clone(),
            action: StepAction::Click { x: down.x, y: down.y, button, element: down.element },
        }]
    }

    /// Emits a `navigate` step iff the destination differs from the last
    /// recorded URL for this session.
    pub async fn on_navigate(&self, to: String, trigger: NavigationTrigger) -> Vec<RecordedStep> {
        let mut state = self.state.lock().await;
        if state.current_url.as_deref() == Some(to.as_str()) {
            return Vec::new();
        }
        let from_url = state.current_url.replace(to.clone());
        vec![RecordedStep {
            highlight: None,
            action: StepAction::Navigate { from_url, to_url: to, trigger },
        }]
    }

    /// Appends a printable character to the coalescing `type` buffer,
    /// flushing any prior buffer first if it belongs to a different
    /// element or has gone idle.
    pub async fn on_key_char(&self, now: Instant, element: Option<ElementDescriptor>, ch: char) -> Vec<RecordedStep> {
        let mut state = self.state.lock().await;
        let mut flushed = Vec::new();
        if let Some(pending) = &state.pending_type {
            let idle = now.duration_since(pending.last_at) > TYPE_IDLE_WINDOW;
            let same_target = pending.element.as_ref().map(|e| &e.id) == element.as_ref().map(|e| &e.id);
            if idle || !same_target {
                flushed.extend(flush_type(&mut state, false));
            }
        }
        match &mut state.pending_type {
            Some(pending) => {
                pending.text.push(ch);
                pending.last_at = now;
            }
            None => {
                state.pending_type = Some(PendingType { element, text: ch.to_string(), last_at: now });
            }
        }
        flushed
    }

    /// `Enter` flushes the pending type buffer (marked submitted) if one
    /// exists; otherwise it's recorded as an ordinary keypress.
    pub async fn on_key_enter(&self, now: Instant) -> Vec<RecordedStep> {
        let mut state = self.state.lock().await;
        if state.pending_type.is_some() {
            let _ = now;
            return flush_type(&mut state, true);
        }
        drop(state);
        self.on_key_non_text("Enter".to_owned(), Vec::new()).await
    }

    /// A non-text key (Escape, Tab, function keys, modified shortcuts)
    /// flushes any pending type buffer, then records itself as a keypress.
    pub async fn on_key_non_text(&self, key: String, modifiers: Vec<Modifier>) -> Vec<RecordedStep> {
        let mut state = self.state.lock().await;
        let mut out = flush_type(&mut state, false);
        out.push(RecordedStep { highlight: None, action: StepAction::Keypress { key, modifiers } });
        out
    }

    /// Accumulates a scroll delta into the current batching window,
    /// starting a new window if none is open.
    pub async fn on_scroll(&self, now: Instant, x: f64, y: f64, delta_x: f64, delta_y: f64) -> Vec<RecordedStep> {
        let mut state = self.state.lock().await;
        let mut out = Vec::new();
        if let Some(pending) = &state.pending_scroll {
            if now.duration_since(pending.window_start) > SCROLL_BATCH_WINDOW {
                out.extend(flush_scroll(&mut state));
            }
        }
        match &mut state.pending_scroll {
            Some(pending) => {
                pending.delta_x += delta_x;
                pending.delta_y += delta_y;
                pending.x = x;
                pending.y = y;
            }
            None => {
                state.pending_scroll = Some(PendingScroll { x, y, delta_x, delta_y, window_start: now });
            }
        }
        out
    }

    /// Called periodically (not in response to any particular input) to
    /// flush batches whose window has elapsed with no further events.
    pub async fn poll(&self, now: Instant) -> Vec<RecordedStep> {
        let mut state = self.state.lock().await;
        let mut out = Vec::new();

        if let Some(pending) = &state.pending_type {
            if now.duration_since(pending.last_at) > TYPE_IDLE_WINDOW {
                out.extend(flush_type(&mut state, false));
            }
        }
        if let Some(pending) = &state.pending_scroll {
            if now.duration_since(pending.window_start) > SCROLL_BATCH_WINDOW {
                out.extend(flush_scroll(&mut state));
            }
        }
        if let Some(pending) = &state.pending_click {
            if now.duration_since(pending.at) > CLICK_PAIR_WINDOW {
                state.pending_click = None;
            }
        }
        out
    }
}

fn flush_type(state: &mut RecorderState, submitted: bool) -> Vec<RecordedStep> {
    match state.pending_type.take() {
        Some(pending) => vec![RecordedStep {
            highlight: pending.element.clone(),
            action: StepAction::Type { element: pending.element, text: pending.text, submitted },
        }],
        None => Vec::new(),
    }
}

fn flush_scroll(state: &mut RecorderState) -> Vec<RecordedStep> {
    match state.pending_scroll.take() {
        Some(pending) => vec![RecordedStep {
            highlight: None,
            action: StepAction::Scroll { x: pending.x, y: pending.y, delta_x: pending.delta_x, delta_y: pending.delta_y },
        }],
        None => Vec::new(),
    }
}

#[cfg(test)]
#[path = "recorder_tests.rs"]
mod tests;
