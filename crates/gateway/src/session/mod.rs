// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session lifecycle, registry, and the step store/recorder pair.
//!
//! The registry shape (a `RwLock<HashMap<...>>` with short, non-awaiting
//! critical sections plus a periodic sweep task) is grounded on the
//! reference gateway's `broker/registry.rs::PodRegistry`; the shared-state
//! composition (one struct wrapping the registry plus its collaborators)
//! mirrors `transport/state.rs::Store`.

pub mod recorder;
pub mod step;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::browser::{highlight_selector, BrowserDriver, DriverError, Frame, HealthStatus, Viewport};
use crate::config::Config;
use crate::crypto;
use crate::event::SessionEvent;

pub use recorder::{RecordedStep, StepRecorder};
pub use step::{Step, StepAction, StepStore};

/// How many consecutive failed health probes flip a session to UNHEALTHY.
const UNHEALTHY_AFTER_CONSECUTIVE_FAILURES: u32 = 3;
const HEALTH_PROBE_INTERVAL: Duration = Duration::from_secs(60);
/// How often each active session's recorder is polled to flush a batch
/// whose window elapsed with no further input (see [`StepRecorder::poll`]).
/// Well under the recorder's shortest window (`SCROLL_BATCH_WINDOW`, 250ms)
/// so a stale batch is flushed promptly rather than lingering until the next
/// conflicting event happens to arrive.
const RECORDER_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    Created,
    Starting,
    Active,
    Ending,
    Ended,
    Failed,
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// A live session: identity, lifecycle state, its step store, and (while
/// ACTIVE) the Driver it owns. Every mutable field is independently locked
/// so the registry's own lock is only ever held for map lookups.
pub struct Session {
    pub id: String,
    pub token: String,
    pub workdir: PathBuf,
    pub created_at_ms: u64,
    status: RwLock<SessionStatus>,
    current_url: RwLock<Option<String>>,
    current_title: RwLock<Option<String>>,
    last_activity: RwLock<Instant>,
    health: RwLock<HealthStatus>,
    error_message: RwLock<Option<String>>,
    driver: RwLock<Option<Arc<BrowserDriver>>>,
    pub steps: StepStore,
    pub recorder: StepRecorder,
    connected: AtomicBool,
    pub frame_tx: watch::Sender<Option<Frame>>,
    frame_rx_template: watch::Receiver<Option<Frame>>,
    event_tx: RwLock<Option<mpsc::Sender<SessionEvent>>>,
    health_failures: RwLock<u32>,
}

/// Snapshot returned by the HTTP session endpoint — no internal locks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub status: SessionStatus,
    pub url: Option<String>,
    pub title: Option<String>,
    pub step_count: usize,
    pub health: SnapshotHealth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SnapshotHealth {
    Healthy,
    Unhealthy,
    Unknown,
}

impl From<HealthStatus> for SnapshotHealth {
    fn from(h: HealthStatus) -> Self {
        match h {
            HealthStatus::Healthy => Self::Healthy,
            HealthStatus::Unhealthy => Self::Unhealthy,
            HealthStatus::Unknown => Self::Unknown,
        }
    }
}

impl Session {
    fn new(id: String, token: String, workdir: PathBuf, max_steps: usize) -> Self {
        let (frame_tx, frame_rx_template) = watch::channel(None);
        Self {
            id,
            token,
            workdir,
            created_at_ms: now_ms(),
            status: RwLock::new(SessionStatus::Created),
            current_url: RwLock::new(None),
            current_title: RwLock::new(None),
            last_activity: RwLock::new(Instant::now()),
            health: RwLock::new(HealthStatus::Unknown),
            error_message: RwLock::new(None),
            driver: RwLock::new(None),
            steps: StepStore::new(max_steps),
            recorder: StepRecorder::new(),
            connected: AtomicBool::new(false),
            frame_tx,
            frame_rx_template,
            event_tx: RwLock::new(None),
            health_failures: RwLock::new(0),
        }
    }

    pub async fn status(&self) -> SessionStatus {
        *self.status.read().await
    }

    pub async fn driver(&self) -> Option<Arc<BrowserDriver>> {
        self.driver.read().await.clone()
    }

    pub async fn touch(&self) {
        *self.last_activity.write().await = Instant::now();
    }

    pub async fn idle_for(&self) -> Duration {
        self.last_activity.read().await.elapsed()
    }

    pub fn subscribe_frames(&self) -> watch::Receiver<Option<Frame>> {
        self.frame_rx_template.clone()
    }

    /// Claim the single-writer slot for this session. Returns `false` if
    /// another connection already holds it (caller closes with 4409).
    pub fn try_connect(&self) -> bool {
        !self.connected.swap(true, Ordering::AcqRel)
    }

    pub async fn set_event_sender(&self, tx: mpsc::Sender<SessionEvent>) {
        *self.event_tx.write().await = Some(tx);
    }

    pub async fn disconnect(&self) {
        *self.event_tx.write().await = None;
        self.connected.store(false, Ordering::Release);
    }

    pub async fn emit(&self, event: SessionEvent) {
        if let Some(tx) = self.event_tx.read().await.as_ref() {
            let _ = tx.try_send(event);
        }
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            status: self.status().await,
            url: self.current_url.read().await.clone(),
            title: self.current_title.read().await.clone(),
            step_count: self.steps.len().await,
            health: (*self.health.read().await).into(),
        }
    }

    pub async fn set_url(&self, url: String) {
        *self.current_url.write().await = Some(url);
    }

    pub async fn error_message(&self) -> Option<String> {
        self.error_message.read().await.clone()
    }
}

/// Owns the concurrent session map and the background sweeps that act on
/// it. One instance per process.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    config: Arc<Config>,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("too many concurrent sessions")]
    TooManySessions,
    #[error("session not found")]
    NotFound,
    #[error("session is not in the required state for this operation")]
    InvalidState,
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),
    #[error("working directory error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionManager {
    pub fn new(config: Arc<Config>) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), config }
    }

    #[instrument(skip(self))]
    pub async fn create(&self) -> Result<Arc<Session>, SessionError> {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.config.max_sessions {
            return Err(SessionError::TooManySessions);
        }
        let id = crypto::uuid_v4();
        let token = crypto::random_token(self.config.session_token_bytes)
            .map_err(|_| SessionError::Io(std::io::Error::other("rng failure")))?;
        let workdir = self.config.temp_root().join(&id);
        let session = Arc::new(Session::new(id.clone(), token, workdir, self.config.max_steps_per_session));
        sessions.insert(id, session.clone());
        Ok(session)
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Ids of every session currently tracked, used to drain all sessions
    /// on shutdown.
    pub async fn all_ids(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    #[instrument(skip(self))]
    pub async fn start(&self, id: &str, start_url: Option<String>) -> Result<Arc<Session>, SessionError> {
        let session = self.get(id).await.ok_or(SessionError::NotFound)?;
        {
            let mut status = session.status.write().await;
            if *status != SessionStatus::Created {
                return Err(SessionError::InvalidState);
            }
            *status = SessionStatus::Starting;
        }

        tokio::fs::create_dir_all(&session.workdir).await?;
        let (width, height) = self.config.viewport();
        let viewport = Viewport { width, height };
        let driver = match BrowserDriver::launch(&session.id, viewport, &session.workdir).await {
            Ok(driver) => Arc::new(driver),
            Err(err) => {
                *session.status.write().await = SessionStatus::Failed;
                *session.error_message.write().await = Some(err.to_string());
                return Err(SessionError::Driver(err));
            }
        };

        if let Some(url) = &start_url {
            if let Err(err) = driver.navigate(url).await {
                *session.status.write().await = SessionStatus::Failed;
                *session.error_message.write().await = Some(err.to_string());
                return Err(SessionError::Driver(err));
            }
            session.set_url(url.clone()).await;
        }

        *session.driver.write().await = Some(driver);
        *session.status.write().await = SessionStatus::Active;
        *session.health.write().await = HealthStatus::Healthy;
        info!(session_id = %session.id, "session active");
        Ok(session)
    }

    /// Idempotent: ending an already-ended session is a no-op success.
    #[instrument(skip(self))]
    pub async fn end(&self, id: &str) -> Result<(), SessionError> {
        let Some(session) = self.get(id).await else { return Ok(()) };
        {
            let mut status = session.status.write().await;
            if matches!(*status, SessionStatus::Ended) {
                return Ok(());
            }
            *status = SessionStatus::Ending;
        }

        if let Some(driver) = session.driver.write().await.take() {
            let _ = driver.close().await;
        }
        let _ = tokio::fs::remove_dir_all(&session.workdir).await;
        *session.status.write().await = SessionStatus::Ended;
        session.disconnect().await;
        self.sessions.write().await.remove(id);
        Ok(())
    }

    /// Background sweep: ends any ACTIVE session idle past the configured
    /// timeout. Runs every `IDLE_SWEEP_INTERVAL` until `shutdown` fires.
    pub async fn run_idle_sweep(&self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(crate::config::IDLE_SWEEP_INTERVAL) => {}
                _ = shutdown.cancelled() => return,
            }

            let idle_ids: Vec<String> = {
                let sessions = self.sessions.read().await;
                let mut ids = Vec::new();
                for session in sessions.values() {
                    if session.status().await == SessionStatus::Active
                        && session.idle_for().await > self.config.idle_timeout()
                    {
                        ids.push(session.id.clone());
                    }
                }
                ids
            };

            for id in idle_ids {
                warn!(session_id = %id, "ending idle session");
                let _ = self.end(&id).await;
            }
        }
    }

    /// Per-session health-probe loop, spawned once a session becomes
    /// ACTIVE. Three consecutive failures flip the session to UNHEALTHY and
    /// emit `session:unhealthy`.
    pub async fn run_health_loop(&self, id: String, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(HEALTH_PROBE_INTERVAL) => {}
                _ = shutdown.cancelled() => return,
            }

            let Some(session) = self.get(&id).await else { return };
            if session.status().await != SessionStatus::Active {
                continue;
            }
            let Some(driver) = session.driver().await else { continue };

            let status = driver.health().await;
            let mut failures = session.health_failures.write().await;
            if status == HealthStatus::Healthy {
                *failures = 0;
                *session.health.write().await = HealthStatus::Healthy;
                continue;
            }
            *failures += 1;
            if *failures >= UNHEALTHY_AFTER_CONSECUTIVE_FAILURES {
                *session.health.write().await = HealthStatus::Unhealthy;
                session.emit(SessionEvent::SessionUnhealthy).await;
                warn!(session_id = %id, "session marked unhealthy");
            }
        }
    }

    /// Per-session ticker, spawned alongside the health loop once a session
    /// becomes ACTIVE: flushes whatever batch the recorder's own `poll` finds
    /// stale, so the last scroll/type/click of a session becomes a `Step`
    /// even when no further input ever arrives to trigger it indirectly.
    pub async fn run_recorder_poll_loop(&self, id: String, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(RECORDER_POLL_INTERVAL) => {}
                _ = shutdown.cancelled() => return,
            }

            let Some(session) = self.get(&id).await else { return };
            if session.status().await != SessionStatus::Active {
                continue;
            }
            let Some(driver) = session.driver().await else { continue };

            let recorded = session.recorder.poll(Instant::now()).await;
            if !recorded.is_empty() {
                persist_recorded_steps(&session, &driver, recorded).await;
            }
        }
    }
}

/// Take a screenshot for each recorded step (highlighting the target
/// element when one is known), persist it into the session's working
/// directory, and emit the resulting step(s) — plus a `step:deleted` for
/// whatever the step store silently evicted to make room.
pub async fn persist_recorded_steps(session: &Arc<Session>, driver: &BrowserDriver, recorded: Vec<RecordedStep>) {
    for recorded_step in recorded {
        let screenshot = match recorded_step.highlight.as_ref().and_then(highlight_selector) {
            Some(selector) => driver.screenshot_with_highlight(&selector).await,
            None => driver.screenshot().await,
        };
        let screenshot_path = match screenshot {
            Ok(bytes) => save_screenshot(session, &bytes).await.ok(),
            Err(_) => None,
        };
        let (step, overflow) = session.steps.append(recorded_step.action, screenshot_path, now_ms()).await;
        if let Some(overflow) = overflow {
            session.emit(SessionEvent::StepDeleted { step_id: overflow.dropped_id }).await;
        }
        session.emit(SessionEvent::StepNew(step)).await;
    }
}

async fn save_screenshot(session: &Session, bytes: &[u8]) -> std::io::Result<String> {
    let dir = session.workdir.join("screenshots");
    tokio::fs::create_dir_all(&dir).await?;
    let path = dir.join(format!("{}.jpg", crypto::uuid_v4()));
    tokio::fs::write(&path, bytes).await?;
    Ok(path.to_string_lossy().into_owned())
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
