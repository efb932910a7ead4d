// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::body::to_bytes;
use axum::http::StatusCode;

use super::{error_response, ok_json};
use crate::error::ErrorCode;

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn ok_json_wraps_data_in_a_success_envelope() {
    let response = ok_json(serde_json::json!({ "sessionId": "abc" }));
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["sessionId"], "abc");
}

#[tokio::test]
async fn error_response_maps_code_to_http_status_and_message() {
    let response = error_response(ErrorCode::SessionNotFound, "no such session");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "SESSION_NOT_FOUND");
    assert_eq!(body["error"]["message"], "no such session");
}
