use super::*;
use crate::session::step::MouseButton;
use std::time::Duration;

#[tokio::test]
async fn paired_down_up_emits_one_click() {
    let recorder = StepRecorder::new();
    let t0 = Instant::now();
    recorder.on_mouse_down(t0, 10.0, 20.0, MouseButton::Left, None).await;
    let steps = recorder.on_mouse_up(t0 + Duration::from_millis(50), 10.0, 20.0, MouseButton::Left).await;
    assert_eq!(steps.len(), 1);
    assert!(matches!(steps[0].action, StepAction::Click { .. }));
}

#[tokio::test]
async fn up_outside_pairing_window_is_dropped() {
    let recorder = StepRecorder::new();
    let t0 = Instant::now();
    recorder.on_mouse_down(t0, 10.0, 20.0, MouseButton::Left, None).await;
    let steps = recorder.on_mouse_up(t0 + Duration::from_millis(600), 10.0, 20.0, MouseButton::Left).await;
    assert!(steps.is_empty());
}

#[tokio::test]
async fn up_at_different_position_is_dropped() {
    let recorder = StepRecorder::new();
    let t0 = Instant::now();
    recorder.on_mouse_down(t0, 10.0, 20.0, MouseButton::Left, None).await;
    let steps = recorder.on_mouse_up(t0 + Duration::from_millis(10), 400.0, 400.0, MouseButton::Left).await;
    assert!(steps.is_empty());
}

#[tokio::test]
async fn navigate_dedups_same_url() {
    let recorder = StepRecorder::new();
    let first = recorder.on_navigate("https://a".to_owned(), NavigationTrigger::User).await;
    assert_eq!(first.len(), 1);
    let second = recorder.on_navigate("https://a".to_owned(), NavigationTrigger::User).await;
    assert!(second.is_empty());
    let third = recorder.on_navigate("https://b".to_owned(), NavigationTrigger::User).await;
    assert_eq!(third.len(), 1);
}

#[tokio::test]
async fn keyboard_chars_coalesce_into_one_type_step_on_enter() {
    let recorder = StepRecorder::new();
    let t0 = Instant::now();
    assert!(recorder.on_key_char(t0, None, 'h').await.is_empty());
    assert!(recorder.on_key_char(t0 + Duration::from_millis(10), None, 'i').await.is_empty());
    let steps = recorder.on_key_enter(t0 + Duration::from_millis(20)).await;
    assert_eq!(steps.len(), 1);
    match &steps[0].action {
        StepAction::Type { text, submitted, .. } => {
            assert_eq!(text, "hi");
            assert!(submitted);
        }
        other => panic!("expected Type, got {other:?}"),
    }
}

#[tokio::test]
async fn idle_poll_flushes_stale_type_buffer_unsubmitted() {
    let recorder = StepRecorder::new();
    let t0 = Instant::now();
    recorder.on_key_char(t0, None, 'x').await;
    let steps = recorder.poll(t0 + Duration::from_millis(1100)).await;
    assert_eq!(steps.len(), 1);
    match &steps[0].action {
        StepAction::Type { submitted, .. } => assert!(!submitted),
        other => panic!("expected Type, got {other:?}"),
    }
}

#[tokio::test]
async fn non_text_key_flushes_pending_type_then_emits_keypress() {
    let recorder = StepRecorder::new();
    let t0 = Instant::now();
    recorder.on_key_char(t0, None, 'x').await;
    let steps = recorder.on_key_non_text("Escape".to_owned(), vec![]).await;
    assert_eq!(steps.len(), 2);
    assert!(matches!(steps[0].action, StepAction::Type { .. }));
    assert!(matches!(steps[1].action, StepAction::Keypress { .. }));
}

#[tokio::test]
async fn scroll_events_within_window_are_summed() {
    let recorder = StepRecorder::new();
    let t0 = Instant::now();
    assert!(recorder.on_scroll(t0, 1.0, 1.0, 10.0, 10.0).await.is_empty());
    let steps = recorder.on_scroll(t0 + Duration::from_millis(100), 1.0, 1.0, 5.0, 5.0).await;
    assert!(steps.is_empty());

    let flushed = recorder.poll(t0 + Duration::from_millis(400)).await;
    assert_eq!(flushed.len(), 1);
    match &flushed[0].action {
        StepAction::Scroll { delta_x, delta_y, .. } => {
            assert_eq!(*delta_x, 15.0);
            assert_eq!(*delta_y, 15.0);
        }
        other => panic!("expected Scroll, got {other:?}"),
    }
}

#[tokio::test]
async fn stale_pending_click_is_dropped_by_poll_without_emitting() {
    let recorder = StepRecorder::new();
    let t0 = Instant::now();
    recorder.on_mouse_down(t0, 0.0, 0.0, MouseButton::Left, None).await;
    let steps = recorder.poll(t0 + Duration::from_millis(600)).await;
    assert!(steps.is_empty());
    let steps = recorder.on_mouse_up(t0 + Duration::from_millis(610), 0.0, 0.0, MouseButton::Left).await;
    assert!(steps.is_empty());
}
