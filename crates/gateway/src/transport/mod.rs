// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! API contract types and server implementation for HTTP and WebSocket
//! transports.

pub mod auth;
pub mod http;
pub mod state;
pub mod ws;
pub mod ws_msg;

pub use state::AppState;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::ErrorCode;

/// Success envelope: `{success: true, data: <T>}`.
pub fn ok_json(data: serde_json::Value) -> Response {
    (StatusCode::OK, Json(serde_json::json!({ "success": true, "data": data }))).into_response()
}

/// Error envelope: `{success: false, error: {code, message}}`.
pub fn error_response(code: ErrorCode, message: impl Into<String>) -> Response {
    let status = StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = serde_json::json!({
        "success": false,
        "error": { "code": code.as_str(), "message": message.into() },
    });
    (status, Json(body)).into_response()
}

/// Build the axum `Router` with all HTTP and WebSocket routes.
///
/// Session-scoped routes (everything under `/api/sessions/{id}`,
/// `/api/export/{id}`, `/api/import/{id}`) are nested behind the auth
/// middleware; session creation and health are not.
pub fn build_router(state: Arc<AppState>) -> Router {
    let session_scoped = Router::new()
        .route("/api/sessions/{id}", get(http::get_session))
        .route("/api/sessions/{id}/start", post(http::start_session))
        .route("/api/sessions/{id}/end", post(http::end_session))
        .route("/api/sessions/{id}/steps", get(http::list_steps))
        .route("/api/sessions/{id}/steps/{step_id}", patch(http::update_step).delete(http::delete_step))
        .route("/api/export/{id}", post(http::export_session))
        .route("/api/export/{id}/download/{filename}", get(http::download_export))
        .route("/api/import/{id}", post(http::import_session))
        .route("/api/import/{id}/preview", post(http::preview_import))
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer));

    let unscoped = Router::new()
        .route("/api/sessions", post(http::create_session))
        .route("/api/health", get(http::health))
        .route("/ws", get(ws::ws_handler));

    session_scoped
        .merge(unscoped)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
