// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket message wrapper and payload tagged unions.
//!
//! The outer `{id, type, timestamp, payload}` envelope and the tagged-union
//! payload shape are adapted from the teacher's own `ws_msg.rs`; the payload
//! variants themselves are new, taken from the message-class lists in the
//! Gateway component design (input:mouse/keyboard/scroll, navigate, ping in,
//! frame/session:state/step:*/pong/cdp:error/input:error/rate:limited/
//! session:unhealthy/element:hover/error out).

use serde::{Deserialize, Serialize};

use crate::browser::{KeyAction, Modifiers, MouseAction, MouseButton};
use crate::error::ErrorCode;
use crate::session::{SessionStatus, Step};

/// Inbound wrapper. The Gateway also accepts a bare `payload` object for
/// backward compatibility — see [`ClientEnvelope::parse`].
#[derive(Debug, Clone, Deserialize)]
pub struct ClientEnvelope {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub timestamp: Option<u64>,
    pub payload: ClientPayload,
}

impl ClientEnvelope {
    /// Parse a raw inbound text frame, accepting either the full
    /// `{id, type, timestamp, payload}` wrapper or a bare payload object.
    pub fn parse(raw: &str) -> Result<ClientPayload, serde_json::Error> {
        if let Ok(envelope) = serde_json::from_str::<ClientEnvelope>(raw) {
            return Ok(envelope.payload);
        }
        serde_json::from_str::<ClientPayload>(raw)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientPayload {
    #[serde(rename = "input:mouse")]
    InputMouse {
        action: MouseAction,
        x: f64,
        y: f64,
        #[serde(default)]
        button: Option<MouseButton>,
    },
    #[serde(rename = "input:keyboard")]
    InputKeyboard {
        action: KeyAction,
        key: String,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        modifiers: Modifiers,
    },
    #[serde(rename = "input:scroll")]
    InputScroll { x: f64, y: f64, delta_x: f64, delta_y: f64 },
    #[serde(rename = "navigate")]
    Navigate { action: NavigateAction, #[serde(default)] url: Option<String> },
    #[serde(rename = "ping")]
    Ping { #[serde(default)] timestamp: Option<u64> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigateAction {
    Goto,
    Back,
    Forward,
    Reload,
}

/// Outbound wrapper. Every server message carries a server-generated `id`
/// and `timestamp`.
#[derive(Debug, Clone, Serialize)]
pub struct ServerEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub timestamp: u64,
    pub payload: ServerPayload,
}

impl ServerEnvelope {
    pub fn new(id: String, timestamp: u64, payload: ServerPayload) -> Self {
        Self { id, kind: "BROWSER_EVENT", timestamp, payload }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerPayload {
    Frame { data: String, timestamp_ms: u64 },
    #[serde(rename = "session:state")]
    SessionState { status: SessionStatus, url: Option<String> },
    #[serde(rename = "step:new")]
    StepNew { step: Step },
    #[serde(rename = "step:updated")]
    StepUpdated { step: Step },
    #[serde(rename = "step:deleted")]
    StepDeleted { step_id: String },
    Pong {},
    #[serde(rename = "cdp:error")]
    CdpError { op: String, message: String },
    #[serde(rename = "input:error")]
    InputError { message: String },
    #[serde(rename = "rate:limited")]
    RateLimited { kind: String, retry_after_ms: u64 },
    #[serde(rename = "session:unhealthy")]
    SessionUnhealthy {},
    #[serde(rename = "element:hover")]
    ElementHover { x: f64, y: f64 },
    Error { code: ErrorCode, message: String },
}
