// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared application state passed to every handler via axum's `State`
//! extractor.
//!
//! Mirrors the teacher's `Store` composition (one struct wrapping the
//! registry plus its collaborators) rather than spreading bare `Arc`s across
//! handler signatures.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::session::SessionManager;

pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub rate_limiter: Arc<RateLimiter>,
    pub config: Arc<Config>,
    pub shutdown: CancellationToken,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Arc<Config>, shutdown: CancellationToken) -> Arc<Self> {
        let rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig {
            input_capacity: config.rate_limit_input_capacity,
            input_refill: config.rate_limit_input_refill,
            nav_capacity: config.rate_limit_nav_capacity,
            nav_refill: config.rate_limit_nav_refill,
        }));
        Arc::new(Self {
            sessions: Arc::new(SessionManager::new(config.clone())),
            rate_limiter,
            config,
            shutdown,
            started_at: Instant::now(),
        })
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").field("max_sessions", &self.config.max_sessions).finish()
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
