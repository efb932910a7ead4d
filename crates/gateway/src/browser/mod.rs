//! Owns exactly one automated browser instance bound to one session.
//!
//! Grounded on `scottopell-phoenix-ide/src/tools/browser/session.rs` (launch
//! config, handler task, per-op timeout wrapping) — the only example repo
//! with real CDP automation code. The reference gateway itself has nothing
//! to adapt here; it drives PTY processes, not browsers.

mod driver;
mod keys;

pub use driver::BrowserDriver;
pub use keys::resolve_key;

use serde::{Deserialize, Serialize};

/// Viewport dimensions a session's browser is launched with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// LAUNCHING → READY → {SCREENCASTING ↔ READY} → CLOSING → CLOSED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Launching,
    Ready,
    Screencasting,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseAction {
    Move,
    Down,
    Up,
    /// `down` immediately followed by `up` at the same point, dispatched as
    /// a single Driver op (see [`crate::browser::BrowserDriver::mouse`]).
    Click,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    /// Bit position within the CDP pressed-buttons bitmask.
    fn bit(self) -> u8 {
        match self {
            Self::Left => 1,
            Self::Right => 2,
            Self::Middle => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyAction {
    Down,
    Up,
}

/// Modifier bitmask as defined by the CDP `Input.dispatchKeyEvent` `modifiers`
/// field: alt=1, ctrl=2, meta=4, shift=8.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    #[serde(default)]
    pub alt: bool,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub meta: bool,
    #[serde(default)]
    pub shift: bool,
}

impl Modifiers {
    pub fn bitmask(&self) -> i64 {
        let mut mask = 0;
        if self.alt {
            mask |= 1;
        }
        if self.ctrl {
            mask |= 2;
        }
        if self.meta {
            mask |= 4;
        }
        if self.shift {
            mask |= 8;
        }
        mask
    }
}

/// A decoded screencast frame, throttled to the configured max FPS.
#[derive(Debug, Clone)]
pub struct Frame {
    pub jpeg_bytes: Vec<u8>,
    pub timestamp_ms: u64,
}

/// The CSS selector the recorder uses to highlight an element in a step
/// screenshot, preferring a stable id over a test hook.
pub fn highlight_selector(element: &ElementDescriptor) -> Option<String> {
    if let Some(id) = &element.id {
        return Some(format!("#{id}"));
    }
    if let Some(test_id) = &element.test_id {
        return Some(format!("[data-testid=\"{test_id}\"]"));
    }
    None
}

/// Where a navigation originated from, as reported to the step recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationTrigger {
    User,
    Back,
    Forward,
    Reload,
    Redirect,
}

/// Descriptor of the interactive element nearest a point, as returned by
/// `elementAt`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElementDescriptor {
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    pub bounding_box: BoundingBox,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Unknown,
}

/// Errors a [`BrowserDriver`] operation can fail with. Construction sites
/// convert these to the wire-level `ErrorCode::CdpOperationFailed` at the
/// transport boundary (see `crate::error`).
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("failed to launch browser: {0}")]
    LaunchFailed(String),
    #[error("operation {op} timed out after {timeout_secs}s")]
    Timeout { op: &'static str, timeout_secs: u64 },
    #[error("cdp operation {op} failed: {source}")]
    Cdp { op: &'static str, source: chromiumoxide::error::CdpError },
    #[error("browser process is no longer available")]
    Disconnected,
}

impl DriverError {
    /// The structured `CDP_<OP>_FAILED` code the spec requires (§4.3).
    pub fn cdp_code(&self) -> String {
        match self {
            Self::Timeout { op, .. } => format!("CDP_{}_FAILED", op.to_uppercase()),
            Self::Cdp { op, .. } => format!("CDP_{}_FAILED", op.to_uppercase()),
            Self::LaunchFailed(_) => "CDP_LAUNCH_FAILED".to_owned(),
            Self::Disconnected => "CDP_DISCONNECTED".to_owned(),
        }
    }
}
