use super::*;
use crate::error::Error;

#[tokio::test]
async fn upsert_same_id_twice_yields_one_merged_record() {
    let store = store();

    store.upsert(task("a", TaskState::Pending)).await.unwrap();
    let patch = TaskRecord {
        id: "a".into(),
        state: TaskState::Processing,
        last_feed: Some(42),
        ..TaskRecord::default()
    };
    let stored = store.upsert(patch).await.unwrap();

    let all = store.all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(stored.state, TaskState::Processing);
    assert_eq!(stored.last_feed, Some(42));
    assert_eq!(stored.prompt, "prompt for a", "absent fields must be retained");
    assert_eq!(all[0], stored);
}

#[tokio::test]
async fn upsert_rejects_empty_id() {
    let store = store();
    let err = store.upsert(TaskRecord::default()).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(store.all().await.unwrap().is_empty());
}

#[tokio::test]
async fn new_records_are_prepended_and_updates_keep_position() {
    let store = store();
    for id in ["a", "b", "c"] {
        store.upsert(task(id, TaskState::Pending)).await.unwrap();
    }
    store.upsert(task("a", TaskState::Processing)).await.unwrap();

    let ids: Vec<String> = store.all().await.unwrap().into_iter().map(|t| t.id).collect();
    assert_eq!(ids, vec!["c", "b", "a"]);
}

#[tokio::test]
async fn retention_cap_evicts_exactly_the_oldest_insert() {
    let (store, _) = store_with(StoreConfig {
        retention_cap: Some(3),
        ..StoreConfig::default()
    });

    for id in ["1", "2", "3", "4"] {
        store.upsert(task(id, TaskState::Pending)).await.unwrap();
    }

    let all = store.all().await.unwrap();
    assert_eq!(all.len(), 3);
    assert!(store.get("1").await.unwrap().is_none());
    assert!(store.get("2").await.unwrap().is_some());
}

#[tokio::test]
async fn default_cap_is_two_hundred() {
    let store = store();
    for i in 0..201 {
        store
            .upsert(task(&format!("t{i}"), TaskState::Pending))
            .await
            .unwrap();
    }
    let all = store.all().await.unwrap();
    assert_eq!(all.len(), 200);
    assert!(store.get("t0").await.unwrap().is_none());
    assert_eq!(all[0].id, "t200");
}

#[tokio::test]
async fn disabled_cap_keeps_everything_until_cleanup() {
    let (store, _) = store_with(StoreConfig {
        retention_cap: None,
        cleanup_keep: 2,
        ..StoreConfig::default()
    });
    for id in ["a", "b", "c", "d"] {
        store.upsert(task(id, TaskState::Pending)).await.unwrap();
    }
    assert_eq!(store.all().await.unwrap().len(), 4);

    assert_eq!(store.cleanup().await.unwrap(), 2);
    let ids: Vec<String> = store.all().await.unwrap().into_iter().map(|t| t.id).collect();
    assert_eq!(ids, vec!["d", "c"]);

    assert_eq!(store.retention_trim(5).await.unwrap(), 0);
}

#[tokio::test]
async fn poll_snapshot_is_ignored_once_finished() {
    let store = store();
    store.upsert(completed_with_video("a")).await.unwrap();

    let result = store
        .apply_poll_snapshot(task("a", TaskState::Processing))
        .await
        .unwrap();

    assert!(result.is_none());
    let stored = store.get("a").await.unwrap().unwrap();
    assert_eq!(stored.state, TaskState::Completed);
}

#[tokio::test]
async fn poll_snapshot_never_moves_state_backwards() {
    let store = store();
    store.upsert(task("a", TaskState::Processing)).await.unwrap();

    let stale = TaskRecord {
        last_feed: Some(7),
        ..task("a", TaskState::Pending)
    };
    let stored = store.apply_poll_snapshot(stale).await.unwrap().unwrap();

    assert_eq!(stored.state, TaskState::Processing);
    assert_eq!(stored.last_feed, Some(7));
}

#[tokio::test]
async fn poll_snapshot_advances_completed_without_video() {
    let store = store();
    store.upsert(task("a", TaskState::Completed)).await.unwrap();

    let stored = store
        .apply_poll_snapshot(completed_with_video("a"))
        .await
        .unwrap()
        .unwrap();
    assert!(stored.is_finished());
}

#[tokio::test]
async fn poll_snapshot_inserts_unknown_ids() {
    let store = store();
    let stored = store
        .apply_poll_snapshot(task("new", TaskState::Pending))
        .await
        .unwrap();
    assert!(stored.is_some());
    assert_eq!(store.all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn update_state_stamps_timestamps() {
    let store = store();
    store.upsert(task("a", TaskState::Completed)).await.unwrap();

    let updated = store
        .update_state("a", TaskState::Pending)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated.state, TaskState::Pending);
    assert!(updated.last_feed.is_some());
    assert!(updated.updated_at.is_some());
    assert!(store.update_state("missing", TaskState::Failed).await.unwrap().is_none());
}

#[tokio::test]
async fn delete_variants() {
    let store = store();
    for id in ["a", "b", "c", "d"] {
        store.upsert(task(id, TaskState::Pending)).await.unwrap();
    }

    assert!(store.delete("a").await.unwrap());
    assert!(!store.delete("a").await.unwrap());
    assert!(store.delete_record(&task("b", TaskState::Pending)).await.unwrap());
    assert_eq!(store.delete_many(&["c", "zzz"]).await.unwrap(), 1);
    assert_eq!(store.all().await.unwrap().len(), 1);

    store.clear().await.unwrap();
    assert!(store.all().await.unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_upserts_do_not_lose_records() {
    let store = Arc::new(store());
    let mut handles = Vec::new();
    for i in 0..20 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .upsert(task(&format!("t{i}"), TaskState::Pending))
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(store.all().await.unwrap().len(), 20);
}

#[tokio::test]
async fn corrupt_collection_is_an_error() {
    let (store, kv) = store_with(StoreConfig::default());
    kv.set("vidu-tasks", "{not an array").await.unwrap();

    let err = store.all().await.unwrap_err();
    assert!(matches!(err, Error::Serialization(_)));
    let err = store.upsert(task("a", TaskState::Pending)).await.unwrap_err();
    assert!(matches!(err, Error::Serialization(_)));
    assert_eq!(
        kv.get("vidu-tasks").await.unwrap().as_deref(),
        Some("{not an array"),
        "corrupt data must not be overwritten"
    );
}
