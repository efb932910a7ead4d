use clap::Parser;

use super::*;

fn test_config() -> Arc<Config> {
    Arc::new(Config::parse_from(["stepwise-gatewayd", "--max-sessions", "2"]))
}

#[tokio::test]
async fn create_assigns_id_and_token_and_starts_created() {
    let manager = SessionManager::new(test_config());
    let session = manager.create().await.unwrap();
    assert_eq!(session.status().await, SessionStatus::Created);
    assert!(!session.id.is_empty());
    assert!(!session.token.is_empty());
    assert_ne!(session.id, session.token);
}

#[tokio::test]
async fn create_enforces_max_sessions_cap() {
    let manager = SessionManager::new(test_config());
    manager.create().await.unwrap();
    manager.create().await.unwrap();
    let err = manager.create().await.unwrap_err();
    assert!(matches!(err, SessionError::TooManySessions));
}

#[tokio::test]
async fn get_returns_none_for_unknown_id() {
    let manager = SessionManager::new(test_config());
    assert!(manager.get("does-not-exist").await.is_none());
}

#[tokio::test]
async fn end_on_never_started_session_is_idempotent() {
    let manager = SessionManager::new(test_config());
    let session = manager.create().await.unwrap();
    manager.end(&session.id).await.unwrap();
    manager.end(&session.id).await.unwrap();
    assert!(manager.get(&session.id).await.is_none());
}

#[tokio::test]
async fn start_on_missing_session_errors() {
    let manager = SessionManager::new(test_config());
    let err = manager.start("nope", None).await.unwrap_err();
    assert!(matches!(err, SessionError::NotFound));
}

#[tokio::test]
async fn single_writer_invariant_rejects_second_connect() {
    let manager = SessionManager::new(test_config());
    let session = manager.create().await.unwrap();
    assert!(session.try_connect());
    assert!(!session.try_connect());
    session.disconnect().await;
    assert!(session.try_connect());
}

#[tokio::test]
async fn snapshot_reflects_step_count() {
    let manager = SessionManager::new(test_config());
    let session = manager.create().await.unwrap();
    session
        .steps
        .append(
            StepAction::Navigate {
                from_url: None,
                to_url: "https://example.com".to_owned(),
                trigger: crate::browser::NavigationTrigger::User,
            },
            None,
            1,
        )
        .await;
    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.step_count, 1);
    assert_eq!(snapshot.status, SessionStatus::Created);
}
