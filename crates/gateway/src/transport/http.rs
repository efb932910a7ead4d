// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the session/steps/export/import/health endpoints.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Bytes;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::archive::{self, ExportOptions};
use crate::error::ErrorCode;
use crate::session::SessionError;
use crate::transport::state::AppState;
use crate::transport::{error_response, ok_json};

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

fn session_error_response(err: SessionError) -> Response {
    match err {
        SessionError::TooManySessions => error_response(ErrorCode::TooManySessions, err.to_string()),
        SessionError::NotFound => error_response(ErrorCode::SessionNotFound, err.to_string()),
        SessionError::InvalidState => error_response(ErrorCode::InvalidState, err.to_string()),
        SessionError::Driver(e) => error_response(ErrorCode::CdpOperationFailed, e.to_string()),
        SessionError::Io(e) => error_response(ErrorCode::Internal, e.to_string()),
    }
}

// -- Sessions -----------------------------------------------------------------

/// `POST /api/sessions` — create a session, unauthenticated (creating a
/// session is how a client obtains its token in the first place).
pub async fn create_session(State(state): State<Arc<AppState>>) -> Response {
    match state.sessions.create().await {
        Ok(session) => ok_json(serde_json::json!({ "sessionId": session.id, "token": session.token })),
        Err(err) => session_error_response(err),
    }
}

/// `GET /api/sessions/{id}` — session snapshot.
pub async fn get_session(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.sessions.get(&id).await {
        Some(session) => ok_json(serde_json::to_value(session.snapshot().await).unwrap_or_default()),
        None => error_response(ErrorCode::SessionNotFound, "session not found"),
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct StartBody {
    pub start_url: Option<String>,
}

/// `POST /api/sessions/{id}/start` — transition `CREATED` to `ACTIVE`.
pub async fn start_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<StartBody>>,
) -> Response {
    let start_url = body.map(|Json(b)| b.start_url).unwrap_or(None);
    match state.sessions.start(&id, start_url).await {
        Ok(session) => {
            let sessions = state.sessions.clone();
            let shutdown = state.shutdown.clone();
            let id = session.id.clone();
            tokio::spawn(async move { sessions.run_health_loop(id, shutdown).await });
            let sessions = state.sessions.clone();
            let shutdown = state.shutdown.clone();
            let id = session.id.clone();
            tokio::spawn(async move { sessions.run_recorder_poll_loop(id, shutdown).await });
            ok_json(serde_json::to_value(session.snapshot().await).unwrap_or_default())
        }
        Err(err) => session_error_response(err),
    }
}

/// `POST /api/sessions/{id}/end` — end a session; idempotent.
pub async fn end_session(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    state.rate_limiter.forget(&id).await;
    match state.sessions.end(&id).await {
        Ok(()) => ok_json(serde_json::json!({ "ended": true })),
        Err(err) => session_error_response(err),
    }
}

// -- Steps ----------------------------------------------------------------

/// `GET /api/sessions/{id}/steps` — the full step list.
pub async fn list_steps(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let Some(session) = state.sessions.get(&id).await else {
        return error_response(ErrorCode::SessionNotFound, "session not found");
    };
    ok_json(serde_json::to_value(session.steps.list().await).unwrap_or_default())
}

#[derive(Debug, Deserialize)]
pub struct UpdateCaptionBody {
    pub caption: String,
}

/// `PATCH /api/sessions/{id}/steps/{stepId}` — update a step's caption.
pub async fn update_step(
    State(state): State<Arc<AppState>>,
    Path((id, step_id)): Path<(String, String)>,
    Json(body): Json<UpdateCaptionBody>,
) -> Response {
    let Some(session) = state.sessions.get(&id).await else {
        return error_response(ErrorCode::SessionNotFound, "session not found");
    };
    match session.steps.update_caption(&step_id, body.caption).await {
        Some(step) => ok_json(serde_json::to_value(step).unwrap_or_default()),
        None => error_response(ErrorCode::BadRequest, "step not found"),
    }
}

/// `DELETE /api/sessions/{id}/steps/{stepId}` — delete a step and re-index.
pub async fn delete_step(State(state): State<Arc<AppState>>, Path((id, step_id)): Path<(String, String)>) -> Response {
    let Some(session) = state.sessions.get(&id).await else {
        return error_response(ErrorCode::SessionNotFound, "session not found");
    };
    if session.steps.delete(&step_id).await {
        session.emit(crate::event::SessionEvent::StepDeleted { step_id: step_id.clone() }).await;
        ok_json(serde_json::json!({ "deleted": true }))
    } else {
        error_response(ErrorCode::BadRequest, "step not found")
    }
}

// -- Archive export/import -------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ExportBody {
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_true")]
    pub include_screenshots: bool,
}

fn default_true() -> bool {
    true
}

/// `POST /api/export/{id}` — build an archive, write it into the session's
/// working directory, and return its filename for subsequent download.
pub async fn export_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ExportBody>,
) -> Response {
    let Some(session) = state.sessions.get(&id).await else {
        return error_response(ErrorCode::SessionNotFound, "session not found");
    };
    let steps = session.steps.list().await;
    let opts = ExportOptions {
        title: body.title.unwrap_or_else(|| "Untitled".to_owned()),
        password: body.password,
        include_screenshots: body.include_screenshots,
        created_at_ms: now_ms(),
    };
    let bytes = match archive::export(&steps, &opts) {
        Ok(bytes) => bytes,
        Err(err) => return error_response(ErrorCode::ExportFailed, err.to_string()),
    };

    let exports_dir = session.workdir.join("exports");
    if let Err(err) = tokio::fs::create_dir_all(&exports_dir).await {
        return error_response(ErrorCode::ExportFailed, err.to_string());
    }
    let filename = format!("{}-{}.zip", session.id, now_ms());
    if let Err(err) = tokio::fs::write(exports_dir.join(&filename), &bytes).await {
        return error_response(ErrorCode::ExportFailed, err.to_string());
    }
    ok_json(serde_json::json!({ "filename": filename }))
}

/// `GET /api/export/{id}/download/{filename}` — stream the archive bytes
/// written by a prior [`export_session`] call.
pub async fn download_export(
    State(state): State<Arc<AppState>>,
    Path((id, filename)): Path<(String, String)>,
) -> Response {
    let Some(session) = state.sessions.get(&id).await else {
        return error_response(ErrorCode::SessionNotFound, "session not found");
    };
    // Reject path traversal; the filename is always generated by `export_session`.
    if filename.contains('/') || filename.contains("..") {
        return error_response(ErrorCode::BadRequest, "invalid filename");
    }
    let path = session.workdir.join("exports").join(&filename);
    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/zip"), (header::CONTENT_DISPOSITION, "attachment")],
            Bytes::from(bytes),
        )
            .into_response(),
        Err(_) => error_response(ErrorCode::BadRequest, "export not found"),
    }
}

async fn extract_multipart_file(mut multipart: Multipart) -> Result<(Vec<u8>, Option<String>), Response> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut password: Option<String> = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return Err(error_response(ErrorCode::ImportInvalid, err.to_string())),
        };
        match field.name() {
            Some("password") => {
                password = field.text().await.ok();
            }
            Some("file") | None => {
                file_bytes = field.bytes().await.ok().map(|b| b.to_vec());
            }
            _ => {}
        }
    }
    match file_bytes {
        Some(bytes) => Ok((bytes, password)),
        None => Err(error_response(ErrorCode::ImportInvalid, "multipart body missing a `file` field")),
    }
}

fn archive_error_code(err: &archive::ArchiveError) -> ErrorCode {
    match err {
        archive::ArchiveError::DecryptFailed(_) => ErrorCode::ImportDecryptFailed,
        _ => ErrorCode::ImportInvalid,
    }
}

/// `POST /api/import/{id}` (multipart: file, password?) — replace the
/// session's step list with the imported archive's steps.
pub async fn import_session(State(state): State<Arc<AppState>>, Path(id): Path<String>, multipart: Multipart) -> Response {
    let Some(session) = state.sessions.get(&id).await else {
        return error_response(ErrorCode::SessionNotFound, "session not found");
    };
    let (bytes, password) = match extract_multipart_file(multipart).await {
        Ok(pair) => pair,
        Err(resp) => return resp,
    };

    match archive::import(&bytes, password.as_deref(), &session.workdir, state.config.max_steps_per_session) {
        Ok(imported) => {
            session.steps.replace_all(imported.steps.clone()).await;
            ok_json(serde_json::json!({
                "title": imported.title,
                "createdAt": imported.created_at,
                "steps": imported.steps,
            }))
        }
        Err(archive::ArchiveError::PasswordRequired) => {
            ok_json(serde_json::json!({ "encrypted": true }))
        }
        Err(err) => error_response(archive_error_code(&err), err.to_string()),
    }
}

/// `POST /api/import/{id}/preview` (multipart: file, password?) — inspect
/// an archive without mutating the session.
pub async fn preview_import(State(state): State<Arc<AppState>>, Path(id): Path<String>, multipart: Multipart) -> Response {
    if state.sessions.get(&id).await.is_none() {
        return error_response(ErrorCode::SessionNotFound, "session not found");
    }
    let (bytes, password) = match extract_multipart_file(multipart).await {
        Ok(pair) => pair,
        Err(resp) => return resp,
    };
    match archive::preview(&bytes, password.as_deref()) {
        Ok(preview) => ok_json(serde_json::json!({
            "manifest": preview.manifest,
            "stepCount": preview.step_count,
            "encrypted": preview.encrypted,
        })),
        Err(err) => error_response(archive_error_code(&err), err.to_string()),
    }
}

// -- Health -----------------------------------------------------------------

/// `GET /api/health` — process liveness, unauthenticated.
pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    ok_json(serde_json::json!({
        "status": "running",
        "sessions": state.sessions.len().await,
        "uptimeSecs": state.started_at.elapsed().as_secs(),
    }))
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
