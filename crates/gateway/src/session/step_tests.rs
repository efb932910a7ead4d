use super::*;

fn navigate(to: &str) -> StepAction {
    StepAction::Navigate { from_url: None, to_url: to.to_owned(), trigger: NavigationTrigger::User }
}

#[tokio::test]
async fn append_assigns_dense_indexes() {
    let store = StepStore::new(10);
    let (s0, _) = store.append(navigate("https://a"), None, 1).await;
    let (s1, _) = store.append(navigate("https://b"), None, 2).await;
    assert_eq!(s0.index, 0);
    assert_eq!(s1.index, 1);
}

#[tokio::test]
async fn delete_compacts_indexes() {
    let store = StepStore::new(10);
    let (s0, _) = store.append(navigate("https://a"), None, 1).await;
    let (s1, _) = store.append(navigate("https://b"), None, 2).await;
    let (_s2, _) = store.append(navigate("https://c"), None, 3).await;

    assert!(store.delete(&s1.id).await);
    let steps = store.list().await;
    assert_eq!(steps.iter().map(|s| s.index).collect::<Vec<_>>(), vec![0, 1]);
    assert_eq!(steps[0].id, s0.id);
}

#[tokio::test]
async fn overflow_drops_oldest_and_reindexes() {
    let store = StepStore::new(2);
    let (s0, overflow0) = store.append(navigate("https://a"), None, 1).await;
    assert!(overflow0.is_none());
    let (_s1, overflow1) = store.append(navigate("https://b"), None, 2).await;
    assert!(overflow1.is_none());
    let (s2, overflow2) = store.append(navigate("https://c"), None, 3).await;

    let overflow2 = overflow2.expect("third append over cap 2 should overflow");
    assert_eq!(overflow2.dropped_id, s0.id);

    let steps = store.list().await;
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[1].id, s2.id);
    assert_eq!(steps.iter().map(|s| s.index).collect::<Vec<_>>(), vec![0, 1]);
}

#[tokio::test]
async fn update_caption_changes_only_that_step() {
    let store = StepStore::new(10);
    let (s0, _) = store.append(navigate("https://a"), None, 1).await;
    let (s1, _) = store.append(navigate("https://b"), None, 2).await;

    let updated = store.update_caption(&s1.id, "renamed".to_owned()).await.unwrap();
    assert_eq!(updated.caption, "renamed");

    let steps = store.list().await;
    assert_eq!(steps[0].id, s0.id);
    assert_ne!(steps[0].caption, "renamed");
}

#[tokio::test]
async fn replace_all_normalizes_indexes() {
    let store = StepStore::new(10);
    let bogus = Step {
        id: "a".to_owned(),
        index: 99,
        action: navigate("https://a"),
        caption: "x".to_owned(),
        screenshot_path: None,
        created_at_ms: 0,
    };
    store.replace_all(vec![bogus]).await;
    let steps = store.list().await;
    assert_eq!(steps[0].index, 0);
}
