// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `stepwise-gatewayd` binary
//! and exercise it over HTTP and WebSocket.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use stepwise_specs::GatewayProcess;

const TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::test]
async fn http_health_reports_running() -> anyhow::Result<()> {
    let gateway = GatewayProcess::start()?;
    gateway.wait_healthy(TIMEOUT).await?;

    let resp: serde_json::Value =
        reqwest::get(format!("{}/api/health", gateway.base_url())).await?.json().await?;
    assert_eq!(resp["success"], true);
    assert!(resp["data"].is_object());
    Ok(())
}

#[tokio::test]
async fn create_session_returns_an_id_and_token() -> anyhow::Result<()> {
    let gateway = GatewayProcess::start()?;
    gateway.wait_healthy(TIMEOUT).await?;

    let (id, token) = gateway.create_session().await?;
    assert!(!id.is_empty());
    assert!(token.len() >= 16);
    Ok(())
}

#[tokio::test]
async fn ws_connect_with_wrong_token_closes_4401() -> anyhow::Result<()> {
    let gateway = GatewayProcess::start()?;
    gateway.wait_healthy(TIMEOUT).await?;
    let (id, _token) = gateway.create_session().await?;

    let url = format!("{}?sessionId={id}&token=wrong", gateway.ws_url());
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await?;
    let msg = tokio::time::timeout(TIMEOUT, ws.next()).await?.unwrap()?;
    match msg {
        Message::Close(Some(frame)) => assert_eq!(u16::from(frame.code), 4401),
        other => anyhow::bail!("expected a close frame, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn a_second_websocket_is_rejected_with_4409() -> anyhow::Result<()> {
    let gateway = GatewayProcess::start()?;
    gateway.wait_healthy(TIMEOUT).await?;
    let (id, token) = gateway.create_session().await?;
    let url = format!("{}?sessionId={id}&token={token}", gateway.ws_url());

    let (mut first, _) = tokio_tungstenite::connect_async(&url).await?;
    let _ = tokio::time::timeout(TIMEOUT, first.next()).await?.unwrap()?; // initial session:state

    let (mut second, _) = tokio_tungstenite::connect_async(&url).await?;
    let msg = tokio::time::timeout(TIMEOUT, second.next()).await?.unwrap()?;
    match msg {
        Message::Close(Some(frame)) => assert_eq!(u16::from(frame.code), 4409),
        other => anyhow::bail!("expected a close frame, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn flooding_input_past_the_bucket_capacity_is_rate_limited() -> anyhow::Result<()> {
    let gateway =
        GatewayProcess::start_with(&["--rate-limit-input-capacity", "2", "--rate-limit-input-refill", "1"])?;
    gateway.wait_healthy(TIMEOUT).await?;
    let (id, token) = gateway.create_session().await?;
    let url = format!("{}?sessionId={id}&token={token}", gateway.ws_url());

    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await?;
    let _ = tokio::time::timeout(TIMEOUT, ws.next()).await?.unwrap()?; // initial session:state

    for _ in 0..5 {
        ws.send(Message::Text(
            r#"{"payload":{"type":"input:mouse","action":"move","x":1.0,"y":1.0}}"#.into(),
        ))
        .await?;
    }

    let mut saw_rate_limited = false;
    for _ in 0..5 {
        let msg = tokio::time::timeout(TIMEOUT, ws.next()).await?.unwrap()?;
        if let Message::Text(text) = msg {
            let parsed: serde_json::Value = serde_json::from_str(&text)?;
            if parsed["payload"]["type"] == "rate:limited" {
                saw_rate_limited = true;
                break;
            }
        }
    }
    assert!(saw_rate_limited, "expected at least one rate:limited message after flooding input");
    Ok(())
}

#[tokio::test]
async fn export_then_import_round_trips_an_encrypted_archive() -> anyhow::Result<()> {
    let gateway = GatewayProcess::start()?;
    gateway.wait_healthy(TIMEOUT).await?;
    let (id, token) = gateway.create_session().await?;
    let client = reqwest::Client::new();

    let export: serde_json::Value = client
        .post(format!("{}/api/export/{id}", gateway.base_url()))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "title": "Smoke test", "password": "correct-horse" }))
        .send()
        .await?
        .json()
        .await?;
    let filename = export["data"]["filename"].as_str().unwrap().to_owned();

    let archive_bytes = client
        .get(format!("{}/api/export/{id}/download/{filename}", gateway.base_url()))
        .bearer_auth(&token)
        .send()
        .await?
        .bytes()
        .await?;

    let part = reqwest::multipart::Part::bytes(archive_bytes.to_vec()).file_name("export.zip");
    let form = reqwest::multipart::Form::new().part("file", part).text("password", "correct-horse");
    let import: serde_json::Value = client
        .post(format!("{}/api/import/{id}", gateway.base_url()))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(import["data"]["title"], "Smoke test");
    assert_eq!(import["data"]["steps"].as_array().unwrap().len(), 0);
    Ok(())
}

#[tokio::test]
async fn import_without_a_password_reports_encrypted_instead_of_erroring() -> anyhow::Result<()> {
    let gateway = GatewayProcess::start()?;
    gateway.wait_healthy(TIMEOUT).await?;
    let (id, token) = gateway.create_session().await?;
    let client = reqwest::Client::new();

    let export: serde_json::Value = client
        .post(format!("{}/api/export/{id}", gateway.base_url()))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "title": "Locked", "password": "hunter2" }))
        .send()
        .await?
        .json()
        .await?;
    let filename = export["data"]["filename"].as_str().unwrap().to_owned();
    let archive_bytes = client
        .get(format!("{}/api/export/{id}/download/{filename}", gateway.base_url()))
        .bearer_auth(&token)
        .send()
        .await?
        .bytes()
        .await?;

    let part = reqwest::multipart::Part::bytes(archive_bytes.to_vec()).file_name("export.zip");
    let form = reqwest::multipart::Form::new().part("file", part);
    let response = client
        .post(format!("{}/api/import/{id}", gateway.base_url()))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await?;
    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["data"]["encrypted"], true);
    Ok(())
}

/// Full create → start → click → step emitted flow against a real headless
/// Chromium.
#[tokio::test]
#[ignore = "launches a real headless browser; run with --ignored where Chromium is available"]
async fn click_on_a_started_session_emits_a_step() -> anyhow::Result<()> {
    let gateway = GatewayProcess::start()?;
    gateway.wait_healthy(TIMEOUT).await?;
    let (id, token) = gateway.create_session().await?;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/api/sessions/{id}/start", gateway.base_url()))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "startUrl": "about:blank" }))
        .send()
        .await?;

    let url = format!("{}?sessionId={id}&token={token}", gateway.ws_url());
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await?;
    let _ = tokio::time::timeout(TIMEOUT, ws.next()).await?.unwrap()?; // initial session:state

    ws.send(Message::Text(
        r#"{"payload":{"type":"input:mouse","action":"down","x":5.0,"y":5.0,"button":"left"}}"#.into(),
    ))
    .await?;
    ws.send(Message::Text(
        r#"{"payload":{"type":"input:mouse","action":"up","x":5.0,"y":5.0,"button":"left"}}"#.into(),
    ))
    .await?;

    let msg = tokio::time::timeout(TIMEOUT, ws.next()).await?.unwrap()?;
    let Message::Text(text) = msg else { anyhow::bail!("expected a text message") };
    let parsed: serde_json::Value = serde_json::from_str(&text)?;
    assert_eq!(parsed["payload"]["type"], "step:new");
    assert_eq!(parsed["payload"]["step"]["action"]["kind"], "click");
    Ok(())
}

/// The idle sweep runs every 30s and the minimum configurable idle timeout
/// must exceed it, so this test genuinely takes over a minute.
#[tokio::test]
#[ignore = "takes over a minute: exercises the real 30s idle sweep interval"]
async fn an_idle_active_session_is_evicted() -> anyhow::Result<()> {
    let gateway = GatewayProcess::start_with(&["--idle-timeout-ms", "31000"])?;
    gateway.wait_healthy(TIMEOUT).await?;
    let (id, token) = gateway.create_session().await?;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/api/sessions/{id}/start", gateway.base_url()))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "startUrl": "about:blank" }))
        .send()
        .await?;

    tokio::time::sleep(Duration::from_secs(65)).await;

    let resp = client
        .get(format!("{}/api/sessions/{id}", gateway.base_url()))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    Ok(())
}
