use super::*;
use crate::browser::{MouseAction, MouseButton, Viewport};

fn viewport() -> Viewport {
    Viewport { width: 1280, height: 800 }
}

/// These exercise a real headless Chromium the same way the reference
/// browser-tools crate's own tests do (chromiumoxide's `_fetcher-rustls-tokio`
/// feature downloads one if none is on PATH). Marked `ignore` so a plain
/// `cargo test` in an offline sandbox doesn't fail on the download.
#[tokio::test]
#[ignore = "launches a real headless browser; run with --ignored where Chromium is available"]
async fn launch_then_navigate_then_close() {
    let temp = tempfile::tempdir().unwrap();
    let driver = BrowserDriver::launch("test-session", viewport(), temp.path()).await.unwrap();
    assert_eq!(driver.state().await, DriverState::Ready);

    driver.navigate("about:blank").await.unwrap();
    let shot = driver.screenshot().await.unwrap();
    assert!(!shot.is_empty());

    driver.close().await.unwrap();
    assert_eq!(driver.state().await, DriverState::Closed);
}

#[tokio::test]
#[ignore = "launches a real headless browser; run with --ignored where Chromium is available"]
async fn mouse_and_key_events_do_not_error_against_blank_page() {
    let temp = tempfile::tempdir().unwrap();
    let driver = BrowserDriver::launch("test-session-2", viewport(), temp.path()).await.unwrap();
    driver.navigate("about:blank").await.unwrap();

    driver.mouse(MouseAction::Move, MouseButton::Left, 10.0, 10.0).await.unwrap();
    driver.mouse(MouseAction::Click, MouseButton::Left, 10.0, 10.0).await.unwrap();
    driver.key(KeyAction::Down, "a", Some("a"), Modifiers::default()).await.unwrap();
    driver.key(KeyAction::Up, "a", None, Modifiers::default()).await.unwrap();

    driver.close().await.unwrap();
}

#[tokio::test]
#[ignore = "launches a real headless browser; run with --ignored where Chromium is available"]
async fn health_is_cached_within_the_ttl() {
    let temp = tempfile::tempdir().unwrap();
    let driver = BrowserDriver::launch("test-session-4", viewport(), temp.path()).await.unwrap();
    assert_eq!(driver.health().await, HealthStatus::Healthy);
    assert_eq!(driver.health().await, HealthStatus::Healthy);
    driver.close().await.unwrap();
}

#[tokio::test]
#[ignore = "launches a real headless browser; run with --ignored where Chromium is available"]
async fn health_reports_healthy_while_page_is_responsive() {
    let temp = tempfile::tempdir().unwrap();
    let driver = BrowserDriver::launch("test-session-3", viewport(), temp.path()).await.unwrap();
    assert_eq!(driver.health().await, HealthStatus::Healthy);
    driver.close().await.unwrap();
}

#[test]
fn build_err_wraps_message_as_cdp_error() {
    let err = build_err("mouse", "bad builder");
    assert!(matches!(err, DriverError::Cdp { op: "mouse", .. }));
    assert!(err.to_string().contains("mouse"));
}
