use crate::storage::{KvStore, MemoryKv};

#[tokio::test]
async fn set_get_remove_round_trip() {
    let kv = MemoryKv::new();

    assert_eq!(kv.get("vidu-tasks").await.unwrap(), None);

    kv.set("vidu-tasks", "[]").await.unwrap();
    assert_eq!(kv.get("vidu-tasks").await.unwrap().as_deref(), Some("[]"));

    kv.set("vidu-tasks", "[1]").await.unwrap();
    assert_eq!(kv.get("vidu-tasks").await.unwrap().as_deref(), Some("[1]"));

    kv.remove("vidu-tasks").await.unwrap();
    assert_eq!(kv.get("vidu-tasks").await.unwrap(), None);
}

#[tokio::test]
async fn removing_a_missing_key_is_a_noop() {
    let kv = MemoryKv::new();
    kv.remove("absent").await.unwrap();
}
