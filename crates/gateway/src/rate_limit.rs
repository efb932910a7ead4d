//! Per-session token buckets governing input and navigation events.
//!
//! Structured the way the reference gateway structures its other concurrent
//! maps (see `broker/registry.rs`'s `PodRegistry`): a `RwLock<HashMap<...>>`
//! guarding short, non-awaiting critical sections, with no suspension held
//! across a lock acquisition.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

/// Which bucket an event is charged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BucketKind {
    Input,
    Navigate,
}

impl BucketKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input:mouse",
            Self::Navigate => "navigate",
        }
    }
}

/// Outcome of a [`RateLimiter::consume`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Allowed { remaining: u32 },
    Denied { retry_after: Duration },
}

struct Bucket {
    capacity: f64,
    refill_per_sec: f64,
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(capacity: u32, refill_per_sec: u32) -> Self {
        Self {
            capacity: capacity as f64,
            refill_per_sec: refill_per_sec as f64,
            tokens: capacity as f64,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    fn consume(&mut self, n: u32, now: Instant) -> Decision {
        self.refill(now);
        let n = n as f64;
        if self.tokens >= n {
            self.tokens -= n;
            Decision::Allowed { remaining: self.tokens as u32 }
        } else {
            let deficit = n - self.tokens;
            let secs = if self.refill_per_sec > 0.0 { deficit / self.refill_per_sec } else { f64::MAX };
            Decision::Denied { retry_after: Duration::from_secs_f64(secs) }
        }
    }
}

/// Configuration for the two bucket kinds a session rate-limits.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub input_capacity: u32,
    pub input_refill: u32,
    pub nav_capacity: u32,
    pub nav_refill: u32,
}

impl RateLimitConfig {
    fn capacity_and_refill(&self, kind: BucketKind) -> (u32, u32) {
        match kind {
            BucketKind::Input => (self.input_capacity, self.input_refill),
            BucketKind::Navigate => (self.nav_capacity, self.nav_refill),
        }
    }
}

/// Per-session token-bucket rate limiter, keyed by `(session id, bucket kind)`.
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: RwLock<HashMap<(String, BucketKind), Bucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self { config, buckets: RwLock::new(HashMap::new()) }
    }

    /// Consume `n` tokens from `session_id`'s bucket of the given kind.
    pub async fn consume(&self, session_id: &str, kind: BucketKind, n: u32) -> Decision {
        let now = Instant::now();
        let mut buckets = self.buckets.write().await;
        let bucket = buckets.entry((session_id.to_owned(), kind)).or_insert_with(|| {
            let (capacity, refill) = self.config.capacity_and_refill(kind);
            Bucket::new(capacity, refill)
        });
        bucket.consume(n, now)
    }

    /// Drop all buckets for a session. Called when a session ends so the map
    /// doesn't grow unboundedly across session churn.
    pub async fn forget(&self, session_id: &str) {
        let mut buckets = self.buckets.write().await;
        buckets.retain(|(id, _), _| id != session_id);
    }
}

#[cfg(test)]
#[path = "rate_limit_tests.rs"]
mod tests;
