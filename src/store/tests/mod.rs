use std::sync::Arc;

use crate::config::StoreConfig;
use crate::storage::{KvStore, MemoryKv};
use crate::store::TaskStore;
use crate::types::{TaskRecord, TaskState, VideoOutput};

mod tasks;

fn store_with(config: StoreConfig) -> (TaskStore, Arc<MemoryKv>) {
    let kv = Arc::new(MemoryKv::new());
    let store = TaskStore::new(kv.clone() as Arc<dyn KvStore>, &config);
    (store, kv)
}

fn store() -> TaskStore {
    store_with(StoreConfig::default()).0
}

fn task(id: &str, state: TaskState) -> TaskRecord {
    TaskRecord {
        id: id.to_string(),
        state,
        model: "vidu2.0".to_string(),
        prompt: format!("prompt for {id}"),
        created_at: "2025-01-01T00:00:00Z".to_string(),
        ..TaskRecord::default()
    }
}

fn completed_with_video(id: &str) -> TaskRecord {
    TaskRecord {
        video: Some(VideoOutput {
            download_url: Some(format!("https://cdn.example.com/{id}.mp4")),
            thumbnail_url: None,
        }),
        ..task(id, TaskState::Completed)
    }
}
