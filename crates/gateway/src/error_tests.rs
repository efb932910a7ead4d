// SPDX-License-Identifier: BUSL-1.1
// Copyright 2025 Alfred Jean LLC

use super::*;

#[test]
fn http_status_matches_taxonomy() {
    assert_eq!(ErrorCode::TooManySessions.http_status(), 429);
    assert_eq!(ErrorCode::SessionNotFound.http_status(), 404);
    assert_eq!(ErrorCode::Unauthorized.http_status(), 401);
    assert_eq!(ErrorCode::AlreadyConnected.http_status(), 409);
    assert_eq!(ErrorCode::ImportDecryptFailed.http_status(), 400);
    assert_eq!(ErrorCode::Internal.http_status(), 500);
}

#[test]
fn as_str_is_shouty_snake_case() {
    assert_eq!(ErrorCode::SessionNotFound.as_str(), "SESSION_NOT_FOUND");
    assert_eq!(ErrorCode::ImportDecryptFailed.as_str(), "IMPORT_DECRYPT_FAILED");
}

#[test]
fn display_matches_as_str() {
    assert_eq!(ErrorCode::RateLimited.to_string(), "RATE_LIMITED");
}

#[test]
fn error_body_serializes_code_and_message() {
    let body = ErrorBody::new(ErrorCode::BadRequest, "missing field x");
    let json = serde_json::to_value(&body).unwrap();
    assert_eq!(json["code"], "BAD_REQUEST");
    assert_eq!(json["message"], "missing field x");
}

#[test]
fn error_code_round_trips_through_json() {
    let json = serde_json::to_string(&ErrorCode::ImportDecryptFailed).unwrap();
    assert_eq!(json, "\"IMPORT_DECRYPT_FAILED\"");
    let back: ErrorCode = serde_json::from_str(&json).unwrap();
    assert_eq!(back, ErrorCode::ImportDecryptFailed);
}
