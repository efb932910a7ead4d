// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed event channels used for Driver → Gateway fan-out.
//!
//! Each Gateway connection owns exactly one [`DriverEvent`] receiver and one
//! [`SessionEvent`] receiver for the session it is bound to — no dynamic
//! subscription, no global bus. The reference gateway fans its PTY output
//! out through a similarly-shaped typed-variant enum; this keeps that shape
//! but re-points the variants at browser/session concerns.

use serde::{Deserialize, Serialize};

use crate::browser::{Frame, HealthStatus, NavigationTrigger};
use crate::session::{SessionStatus, Step};

/// Events a [`crate::browser::BrowserDriver`] publishes about itself. The
/// Gateway connection bound to that Driver's session routes each variant to
/// the matching server→client message.
#[derive(Debug, Clone)]
pub enum DriverEvent {
    Frame(Frame),
    Navigation { from: Option<String>, to: String, trigger: NavigationTrigger },
    CdpError { op: &'static str, message: String },
    Health(HealthStatus),
}

/// Events the Session Manager publishes about a session's lifecycle and
/// step store, independent of any particular Driver operation.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StepNew(Step),
    StepUpdated(Step),
    StepDeleted { step_id: String },
    SessionUnhealthy,
    SessionState(SessionStatus),
    RateLimited { kind: RateLimitedKind },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitedKind {
    Input,
    Navigate,
}

impl From<crate::rate_limit::BucketKind> for RateLimitedKind {
    fn from(kind: crate::rate_limit::BucketKind) -> Self {
        match kind {
            crate::rate_limit::BucketKind::Input => Self::Input,
            crate::rate_limit::BucketKind::Navigate => Self::Navigate,
        }
    }
}
