// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket upgrade handler and the per-connection task set.
//!
//! A connection is five concurrent tasks sharing one outbound queue: Reader
//! (parses client messages, drives the Driver, feeds the step recorder),
//! Writer (the queue's only consumer, the one place backpressure is
//! enforced), Frame pump (drains the session's screencast watch channel),
//! Event pump (drains the session's `SessionEvent` channel), and Heartbeat
//! (pings on an interval, closes on session idleness). Whichever finishes
//! first decides the close code; the rest are aborted.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::browser::{DriverError, KeyAction, MouseAction, MouseButton as CdpMouseButton, Modifiers, NavigationTrigger};
use crate::crypto;
use crate::event::SessionEvent;
use crate::rate_limit::{BucketKind, Decision};
use crate::session::step::{Modifier, MouseButton as StepMouseButton};
use crate::session::{persist_recorded_steps, Session};
use crate::transport::auth;
use crate::transport::state::AppState;
use crate::transport::ws_msg::{ClientEnvelope, ClientPayload, NavigateAction, ServerEnvelope, ServerPayload};

const OUTBOUND_CAPACITY: usize = 64;
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);
const PING_INTERVAL: Duration = Duration::from_secs(45);
const IDLE_CLOSE_TIMEOUT: Duration = Duration::from_secs(75);

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub token: String,
}

/// `GET /ws?sessionId=<id>&token=<tok>` — upgrade, then validate; invalid
/// sessions/tokens and double connections are rejected by closing the
/// socket with the appropriate code rather than failing the HTTP upgrade,
/// since the close code itself is the signal the spec asks for.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| async move { accept_connection(state, query, socket).await })
        .into_response()
}

async fn accept_connection(state: Arc<AppState>, query: WsQuery, socket: WebSocket) {
    let Some(session) = state.sessions.get(&query.session_id).await else {
        close_immediately(socket, 4401, "unknown session").await;
        return;
    };
    if auth::validate_ws_token(&query.token, &session.token).is_err() {
        close_immediately(socket, 4401, "invalid token").await;
        return;
    }
    if !session.try_connect() {
        close_immediately(socket, 4409, "session already connected").await;
        return;
    }

    let span = tracing::info_span!("ws_connection", session_id = %session.id);
    run_connection(state, session.clone(), socket).instrument(span).await;
    session.disconnect().await;
}

async fn close_immediately(socket: WebSocket, code: u16, reason: &'static str) {
    let (mut tx, _rx) = socket.split();
    let _ = tx.send(Message::Close(Some(CloseFrame { code, reason: reason.into() }))).await;
}

#[derive(Debug, Clone, Copy)]
enum CloseReason {
    Normal,
    Idle,
    SlowConsumer,
    ReaderClosed,
    WriterGone,
}

impl CloseReason {
    fn code(self) -> u16 {
        match self {
            Self::Normal | Self::ReaderClosed | Self::WriterGone => 1000,
            Self::Idle => 4408,
            Self::SlowConsumer => 4413,
        }
    }

    fn text(self) -> &'static str {
        match self {
            Self::Normal => "closed",
            Self::ReaderClosed => "client closed",
            Self::WriterGone => "connection closing",
            Self::Idle => "idle timeout",
            Self::SlowConsumer => "slow consumer",
        }
    }
}

async fn run_connection(state: Arc<AppState>, session: Arc<Session>, socket: WebSocket) {
    let (ws_tx, ws_rx) = socket.split();
    let (out_tx, out_rx) = mpsc::channel::<Message>(OUTBOUND_CAPACITY);
    let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(32);
    session.set_event_sender(event_tx).await;

    let snapshot = session.snapshot().await;
    let _ = out_tx
        .send(server_message(ServerPayload::SessionState { status: snapshot.status, url: snapshot.url }))
        .await;

    let mut writer_h = tokio::spawn(writer_task(ws_tx, out_rx));
    let mut reader_h = tokio::spawn(reader_task(state, session.clone(), ws_rx, out_tx.clone()));
    let mut frames_h = tokio::spawn(frame_pump(session.clone(), out_tx.clone()));
    let mut events_h = tokio::spawn(event_pump(event_rx, out_tx.clone()));
    let mut heartbeat_h = tokio::spawn(heartbeat_task(session.clone(), out_tx.clone()));

    let reason = tokio::select! {
        r = &mut reader_h => r.unwrap_or(CloseReason::ReaderClosed),
        r = &mut frames_h => r.unwrap_or(CloseReason::WriterGone),
        r = &mut events_h => r.unwrap_or(CloseReason::WriterGone),
        r = &mut heartbeat_h => r.unwrap_or(CloseReason::WriterGone),
    };

    reader_h.abort();
    frames_h.abort();
    events_h.abort();

    let close = Message::Close(Some(CloseFrame { code: reason.code(), reason: reason.text().into() }));
    let _ = out_tx.send(close).await;
    drop(out_tx);
    let _ = tokio::time::timeout(Duration::from_secs(2), writer_h).await;
    heartbeat_h.abort();
}

fn server_message(payload: ServerPayload) -> Message {
    let envelope = ServerEnvelope::new(crypto::uuid_v4(), now_ms(), payload);
    Message::Text(serde_json::to_string(&envelope).unwrap_or_default().into())
}

async fn writer_task(mut ws_tx: SplitSink<WebSocket, Message>, mut rx: mpsc::Receiver<Message>) -> CloseReason {
    while let Some(msg) = rx.recv().await {
        let is_close = matches!(msg, Message::Close(_));
        match tokio::time::timeout(WRITE_TIMEOUT, ws_tx.send(msg)).await {
            Ok(Ok(())) if is_close => break,
            Ok(Ok(())) => {}
            _ => return CloseReason::SlowConsumer,
        }
    }
    let _ = ws_tx.close().await;
    CloseReason::WriterGone
}

async fn frame_pump(session: Arc<Session>, out_tx: mpsc::Sender<Message>) -> CloseReason {
    let mut frames = session.subscribe_frames();
    loop {
        if frames.changed().await.is_err() {
            return CloseReason::WriterGone;
        }
        let Some(frame) = frames.borrow_and_update().clone() else { continue };
        let data = base64::engine::general_purpose::STANDARD.encode(&frame.jpeg_bytes);
        let payload = ServerPayload::Frame { data, timestamp_ms: frame.timestamp_ms };
        if out_tx.send(server_message(payload)).await.is_err() {
            return CloseReason::WriterGone;
        }
    }
}

async fn event_pump(mut rx: mpsc::Receiver<SessionEvent>, out_tx: mpsc::Sender<Message>) -> CloseReason {
    while let Some(event) = rx.recv().await {
        let payload = match event {
            SessionEvent::StepNew(step) => ServerPayload::StepNew { step },
            SessionEvent::StepUpdated(step) => ServerPayload::StepUpdated { step },
            SessionEvent::StepDeleted { step_id } => ServerPayload::StepDeleted { step_id },
            SessionEvent::SessionUnhealthy => ServerPayload::SessionUnhealthy {},
            SessionEvent::SessionState(status) => ServerPayload::SessionState { status, url: None },
            SessionEvent::RateLimited { kind } => {
                let kind = match kind {
                    crate::event::RateLimitedKind::Input => "input",
                    crate::event::RateLimitedKind::Navigate => "navigate",
                };
                ServerPayload::RateLimited { kind: kind.to_owned(), retry_after_ms: 0 }
            }
        };
        if out_tx.send(server_message(payload)).await.is_err() {
            return CloseReason::WriterGone;
        }
    }
    CloseReason::WriterGone
}

async fn heartbeat_task(session: Arc<Session>, out_tx: mpsc::Sender<Message>) -> CloseReason {
    let mut ticker = tokio::time::interval(PING_INTERVAL);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if session.idle_for().await > IDLE_CLOSE_TIMEOUT {
            return CloseReason::Idle;
        }
        if out_tx.send(Message::Ping(Bytes::new())).await.is_err() {
            return CloseReason::WriterGone;
        }
    }
}

async fn reader_task(
    state: Arc<AppState>,
    session: Arc<Session>,
    mut ws_rx: SplitStream<WebSocket>,
    out_tx: mpsc::Sender<Message>,
) -> CloseReason {
    loop {
        let msg = match ws_rx.next().await {
            Some(Ok(msg)) => msg,
            Some(Err(_)) | None => return CloseReason::ReaderClosed,
        };
        session.touch().await;
        match msg {
            Message::Text(text) => {
                let payload = match ClientEnvelope::parse(&text) {
                    Ok(payload) => payload,
                    Err(err) => {
                        let _ = out_tx
                            .send(server_message(ServerPayload::InputError { message: err.to_string() }))
                            .await;
                        continue;
                    }
                };
                handle_client_payload(&state, &session, payload, &out_tx).await;
            }
            Message::Close(_) => return CloseReason::Normal,
            _ => {}
        }
    }
}

async fn handle_client_payload(
    state: &Arc<AppState>,
    session: &Arc<Session>,
    payload: ClientPayload,
    out_tx: &mpsc::Sender<Message>,
) {
    match payload {
        ClientPayload::Ping { .. } => {
            let _ = out_tx.send(server_message(ServerPayload::Pong {})).await;
        }

        ClientPayload::InputMouse { action, x, y, button } => {
            if !rate_limit_ok(state, session, BucketKind::Input, out_tx).await {
                return;
            }
            let Some(driver) = session.driver().await else { return };
            let cdp_button = button.unwrap_or(CdpMouseButton::Left);
            if let Err(err) = driver.mouse(action, cdp_button, x, y).await {
                send_cdp_error(out_tx, "mouse", &err).await;
                return;
            }
            let step_button = to_step_button(cdp_button);
            let recorded = match action {
                MouseAction::Down => {
                    let element = driver.element_at(x, y).await.ok().flatten();
                    session.recorder.on_mouse_down(Instant::now(), x, y, step_button, element).await;
                    Vec::new()
                }
                MouseAction::Up => session.recorder.on_mouse_up(Instant::now(), x, y, step_button).await,
                MouseAction::Click => {
                    let element = driver.element_at(x, y).await.ok().flatten();
                    let now = Instant::now();
                    session.recorder.on_mouse_down(now, x, y, step_button, element).await;
                    session.recorder.on_mouse_up(now, x, y, step_button).await
                }
                MouseAction::Move => Vec::new(),
            };
            persist_recorded_steps(session, &driver, recorded).await;
        }

        ClientPayload::InputKeyboard { action, key, text, modifiers } => {
            if !rate_limit_ok(state, session, BucketKind::Input, out_tx).await {
                return;
            }
            let Some(driver) = session.driver().await else { return };
            if let Err(err) = driver.key(action, &key, text.as_deref(), modifiers).await {
                send_cdp_error(out_tx, "key", &err).await;
                return;
            }
            if action != KeyAction::Down {
                return;
            }
            let single_char = text.as_deref().filter(|t| t.chars().count() == 1).and_then(|t| t.chars().next());
            let recorded = match single_char {
                Some(ch) => session.recorder.on_key_char(Instant::now(), None, ch).await,
                None if key == "Enter" => session.recorder.on_key_enter(Instant::now()).await,
                None => session.recorder.on_key_non_text(key, to_step_modifiers(modifiers)).await,
            };
            persist_recorded_steps(session, &driver, recorded).await;
        }

        ClientPayload::InputScroll { x, y, delta_x, delta_y } => {
            if !rate_limit_ok(state, session, BucketKind::Input, out_tx).await {
                return;
            }
            let Some(driver) = session.driver().await else { return };
            if let Err(err) = driver.scroll(x, y, delta_x, delta_y).await {
                send_cdp_error(out_tx, "scroll", &err).await;
                return;
            }
            let recorded = session.recorder.on_scroll(Instant::now(), x, y, delta_x, delta_y).await;
            persist_recorded_steps(session, &driver, recorded).await;
        }

        ClientPayload::Navigate { action, url } => {
            if !rate_limit_ok(state, session, BucketKind::Navigate, out_tx).await {
                return;
            }
            let Some(driver) = session.driver().await else { return };
            let result = match action {
                NavigateAction::Goto => match url.as_deref() {
                    Some(url) => driver.navigate(url).await,
                    None => return,
                },
                NavigateAction::Back => driver.back().await,
                NavigateAction::Forward => driver.forward().await,
                NavigateAction::Reload => driver.reload().await,
            };
            if let Err(err) = result {
                send_cdp_error(out_tx, "navigate", &err).await;
                return;
            }
            if let Ok(Some(to_url)) = driver.current_url().await {
                session.set_url(to_url.clone()).await;
                let recorded = session.recorder.on_navigate(to_url, navigate_trigger(action)).await;
                persist_recorded_steps(session, &driver, recorded).await;
            }
        }
    }
}

async fn rate_limit_ok(state: &Arc<AppState>, session: &Session, kind: BucketKind, out_tx: &mpsc::Sender<Message>) -> bool {
    match state.rate_limiter.consume(&session.id, kind, 1).await {
        Decision::Allowed { .. } => true,
        Decision::Denied { retry_after } => {
            let payload = ServerPayload::RateLimited {
                kind: kind.as_str().to_owned(),
                retry_after_ms: retry_after.as_millis() as u64,
            };
            let _ = out_tx.send(server_message(payload)).await;
            false
        }
    }
}

async fn send_cdp_error(out_tx: &mpsc::Sender<Message>, op: &str, err: &DriverError) {
    let _ = out_tx.send(server_message(ServerPayload::CdpError { op: op.to_owned(), message: err.to_string() })).await;
}

fn to_step_button(button: CdpMouseButton) -> StepMouseButton {
    match button {
        CdpMouseButton::Left => StepMouseButton::Left,
        CdpMouseButton::Right => StepMouseButton::Right,
        CdpMouseButton::Middle => StepMouseButton::Middle,
    }
}

fn to_step_modifiers(modifiers: Modifiers) -> Vec<Modifier> {
    let mut out = Vec::new();
    if modifiers.ctrl {
        out.push(Modifier::Ctrl);
    }
    if modifiers.shift {
        out.push(Modifier::Shift);
    }
    if modifiers.alt {
        out.push(Modifier::Alt);
    }
    if modifiers.meta {
        out.push(Modifier::Meta);
    }
    out
}

fn navigate_trigger(action: NavigateAction) -> NavigationTrigger {
    match action {
        NavigateAction::Goto => NavigationTrigger::User,
        NavigateAction::Back => NavigationTrigger::Back,
        NavigateAction::Forward => NavigationTrigger::Forward,
        NavigateAction::Reload => NavigationTrigger::Reload,
    }
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
