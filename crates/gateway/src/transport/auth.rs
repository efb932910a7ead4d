// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bearer-token authentication against a session's own token.
//!
//! Structurally identical to the teacher's `auth.rs` (constant-time compare,
//! a header-validation function, a WebSocket-query variant, and an axum
//! middleware) but checks against the per-session token issued at session
//! creation rather than one process-wide static token.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::crypto::constant_time_eq;
use crate::error::ErrorCode;
use crate::transport::state::AppState;

/// Validate a Bearer token from HTTP headers against `expected`.
pub fn validate_bearer(headers: &HeaderMap, expected: &str) -> Result<(), ErrorCode> {
    let header = headers.get("authorization").and_then(|v| v.to_str().ok()).ok_or(ErrorCode::Unauthorized)?;
    let token = header.strip_prefix("Bearer ").ok_or(ErrorCode::Unauthorized)?;
    if constant_time_eq(token, expected) {
        Ok(())
    } else {
        Err(ErrorCode::Unauthorized)
    }
}

/// Validate a token presented on a WebSocket upgrade query string.
pub fn validate_ws_token(presented: &str, expected: &str) -> Result<(), ErrorCode> {
    if constant_time_eq(presented, expected) {
        Ok(())
    } else {
        Err(ErrorCode::Unauthorized)
    }
}

/// Axum middleware enforcing `Authorization: Bearer <token>` on every
/// session-scoped route, checked against that session's own token.
/// `POST /api/sessions` (create) and `GET /api/health` carry no `id`
/// segment and are never routed through this layer.
///
/// Uses a `HashMap` path extractor rather than `Path<String>` because the
/// routes this layer guards have a varying number of dynamic segments
/// (`{id}`, `{id}/steps/{step_id}`, `{id}/download/{filename}`).
pub async fn auth_layer(
    State(state): State<Arc<AppState>>,
    Path(params): Path<HashMap<String, String>>,
    headers: HeaderMap,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(id) = params.get("id") else {
        return crate::transport::error_response(ErrorCode::BadRequest, "missing session id").into_response();
    };
    let Some(session) = state.sessions.get(id).await else {
        return crate::transport::error_response(ErrorCode::SessionNotFound, "session not found").into_response();
    };
    if let Err(code) = validate_bearer(&headers, &session.token) {
        return crate::transport::error_response(code, "unauthorized").into_response();
    }
    next.run(req).await
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
