//! Local task repository
//!
//! [`TaskStore`] keeps the whole task collection as one JSON array under a
//! single key of a [`KvStore`]. Every operation reads the full collection and
//! every mutation writes it back. Read-modify-write sequences are serialized
//! through an internal async mutex, so concurrent upserts inside one process
//! never lose each other.
//!
//! Records are kept newest-inserted first; the retention cap evicts from the
//! tail. Exposed ordering is selected by [`SortPolicy`].
//!
//! [`PreferenceStore`] is the sibling store for the single preference object.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{SortPolicy, StoreConfig};
use crate::error::{Error, Result};
use crate::storage::KvStore;
use crate::types::{TaskRecord, TaskState};

mod preferences;

pub use preferences::{PreferenceStore, Preferences};

/// Aggregate view over the stored tasks
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskStats {
    /// Number of records
    pub total: usize,
    /// `pending`
    pub pending: usize,
    /// `processing` or `running`
    pub processing: usize,
    /// `completed`
    pub completed: usize,
    /// `failed`
    pub failed: usize,
    /// Not failed and not completed with a download URL
    pub active: usize,
    /// `completed / total` as a rounded percentage, 0 when empty
    pub success_rate: u32,
    /// Sum of `credits_used`
    pub total_credits: f64,
    /// Sum of `estimated_cost`, rounded to two decimals
    pub total_cost: f64,
}

/// Key-value-backed repository of task records
pub struct TaskStore {
    kv: Arc<dyn KvStore>,
    key: String,
    retention_cap: Option<usize>,
    sort: SortPolicy,
    cleanup_keep: usize,
    write_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskStore")
            .field("key", &self.key)
            .field("retention_cap", &self.retention_cap)
            .field("sort", &self.sort)
            .finish()
    }
}

impl TaskStore {
    /// Create a store over `kv` using the keys and policies in `config`
    pub fn new(kv: Arc<dyn KvStore>, config: &StoreConfig) -> Self {
        Self {
            kv,
            key: config.tasks_key.clone(),
            retention_cap: config.retention_cap,
            sort: config.sort,
            cleanup_keep: config.cleanup_keep,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<Vec<TaskRecord>> {
        match self.kv.get(&self.key).await? {
            None => Ok(Vec::new()),
            Some(raw) if raw.trim().is_empty() => Ok(Vec::new()),
            Some(raw) => Ok(serde_json::from_str(&raw)?),
        }
    }

    async fn persist(&self, tasks: &[TaskRecord]) -> Result<()> {
        let raw = serde_json::to_string(tasks)?;
        self.kv.set(&self.key, &raw).await
    }

    fn insert_front(&self, tasks: &mut Vec<TaskRecord>, record: TaskRecord) {
        tasks.insert(0, record);
        if let Some(cap) = self.retention_cap {
            tasks.truncate(cap);
        }
    }

    /// Merge-patch `record` into the store, keyed on its id
    ///
    /// Existing records keep their position; new ones are inserted at the front
    /// and the retention cap is applied. Returns the stored record.
    pub async fn upsert(&self, record: TaskRecord) -> Result<TaskRecord> {
        if record.id.is_empty() {
            return Err(Error::Validation("task id must not be empty".to_string()));
        }

        let _guard = self.write_lock.lock().await;
        let mut tasks = self.load().await?;

        let stored = match tasks.iter_mut().find(|t| t.id == record.id) {
            Some(existing) => {
                existing.merge_from(&record)?;
                existing.clone()
            }
            None => {
                self.insert_front(&mut tasks, record.clone());
                record
            }
        };

        self.persist(&tasks).await?;
        Ok(stored)
    }

    /// Upsert several records in order
    pub async fn upsert_many(&self, records: Vec<TaskRecord>) -> Result<()> {
        for record in records {
            self.upsert(record).await?;
        }
        Ok(())
    }

    /// The polling-path write
    ///
    /// Returns `None` (and writes nothing) when the stored record is already
    /// finished. A snapshot whose state is behind the stored one keeps the
    /// stored state; its other fields are still merged.
    pub async fn apply_poll_snapshot(&self, record: TaskRecord) -> Result<Option<TaskRecord>> {
        if record.id.is_empty() {
            return Err(Error::Validation("task id must not be empty".to_string()));
        }

        let _guard = self.write_lock.lock().await;
        let mut tasks = self.load().await?;

        let stored = match tasks.iter_mut().find(|t| t.id == record.id) {
            Some(existing) if existing.is_finished() => return Ok(None),
            Some(existing) => {
                let previous = existing.state;
                existing.merge_from(&record)?;
                if let (Some(old), Some(new)) = (previous.rank(), existing.state.rank()) {
                    if new < old {
                        existing.state = previous;
                    }
                }
                existing.clone()
            }
            None => {
                self.insert_front(&mut tasks, record.clone());
                record
            }
        };

        self.persist(&tasks).await?;
        Ok(Some(stored))
    }

    /// All records in the configured order
    pub async fn all(&self) -> Result<Vec<TaskRecord>> {
        let tasks = self.load().await?;
        Ok(match self.sort {
            SortPolicy::Insertion => tasks,
            SortPolicy::CreatedDesc => sort_by_created(tasks),
        })
    }

    /// All records, newest `created_at` first; unparseable timestamps last
    pub async fn sorted_by_created(&self) -> Result<Vec<TaskRecord>> {
        Ok(sort_by_created(self.load().await?))
    }

    /// Look up one record
    pub async fn get(&self, id: &str) -> Result<Option<TaskRecord>> {
        Ok(self.load().await?.into_iter().find(|t| t.id == id))
    }

    /// Records in the given state
    pub async fn by_state(&self, state: TaskState) -> Result<Vec<TaskRecord>> {
        self.filtered(|t| t.state == state).await
    }

    /// Records produced by the given model
    pub async fn by_model(&self, model: &str) -> Result<Vec<TaskRecord>> {
        self.filtered(|t| t.model == model).await
    }

    /// Records polling has not finished: not failed, and not completed with a
    /// download URL
    pub async fn active(&self) -> Result<Vec<TaskRecord>> {
        self.filtered(|t| !t.is_finished()).await
    }

    /// Records that are `pending`, `processing` or `running`
    pub async fn processing(&self) -> Result<Vec<TaskRecord>> {
        self.filtered(|t| {
            matches!(
                t.state,
                TaskState::Pending | TaskState::Processing | TaskState::Running
            )
        })
        .await
    }

    /// Case-insensitive substring search over prompt, id and model
    ///
    /// A blank keyword returns everything.
    pub async fn search(&self, keyword: &str) -> Result<Vec<TaskRecord>> {
        if keyword.trim().is_empty() {
            return self.all().await;
        }
        let needle = keyword.to_lowercase();
        self.filtered(|t| t.matches_keyword(&needle)).await
    }

    async fn filtered<F>(&self, predicate: F) -> Result<Vec<TaskRecord>>
    where
        F: Fn(&TaskRecord) -> bool,
    {
        Ok(self.all().await?.into_iter().filter(predicate).collect())
    }

    /// Set a record's state, stamping `last_feed` and `updated_at`
    ///
    /// This is the manual path and is not subject to the forward-only rule.
    pub async fn update_state(&self, id: &str, state: TaskState) -> Result<Option<TaskRecord>> {
        let _guard = self.write_lock.lock().await;
        let mut tasks = self.load().await?;

        let Some(task) = tasks.iter_mut().find(|t| t.id == id) else {
            return Ok(None);
        };
        let now = chrono::Utc::now();
        task.state = state;
        task.last_feed = Some(now.timestamp_millis());
        task.updated_at = Some(now.to_rfc3339());
        let updated = task.clone();

        self.persist(&tasks).await?;
        Ok(Some(updated))
    }

    /// Remove one record; returns whether it existed
    pub async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.delete_many(&[id]).await? > 0)
    }

    /// Remove the record with the same id as `record`
    pub async fn delete_record(&self, record: &TaskRecord) -> Result<bool> {
        self.delete(&record.id).await
    }

    /// Remove every listed id; returns how many records were removed
    pub async fn delete_many<S: AsRef<str>>(&self, ids: &[S]) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut tasks = self.load().await?;

        let before = tasks.len();
        tasks.retain(|t| !ids.iter().any(|id| id.as_ref() == t.id));
        let removed = before - tasks.len();

        if removed > 0 {
            self.persist(&tasks).await?;
        }
        Ok(removed)
    }

    /// Remove every record
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.persist(&[]).await
    }

    /// Keep only the `max_count` most recently inserted records; returns how
    /// many were dropped
    pub async fn retention_trim(&self, max_count: usize) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut tasks = self.load().await?;

        if tasks.len() <= max_count {
            return Ok(0);
        }
        let dropped = tasks.len() - max_count;
        tasks.truncate(max_count);
        self.persist(&tasks).await?;
        Ok(dropped)
    }

    /// [`retention_trim`](Self::retention_trim) with the configured `cleanup_keep`
    pub async fn cleanup(&self) -> Result<usize> {
        self.retention_trim(self.cleanup_keep).await
    }

    /// Counts, success rate and cost totals
    pub async fn stats(&self) -> Result<TaskStats> {
        let tasks = self.load().await?;
        let mut stats = TaskStats {
            total: tasks.len(),
            ..TaskStats::default()
        };

        let mut cost = 0.0;
        for task in &tasks {
            match task.state {
                TaskState::Pending => stats.pending += 1,
                TaskState::Processing | TaskState::Running => stats.processing += 1,
                TaskState::Completed => stats.completed += 1,
                TaskState::Failed => stats.failed += 1,
                TaskState::Unknown => {}
            }
            if !task.is_finished() {
                stats.active += 1;
            }
            stats.total_credits += task.credits_used.unwrap_or(0.0);
            cost += task.estimated_cost.unwrap_or(0.0);
        }

        if stats.total > 0 {
            stats.success_rate =
                ((stats.completed as f64 / stats.total as f64) * 100.0).round() as u32;
        }
        stats.total_cost = (cost * 100.0).round() / 100.0;

        Ok(stats)
    }

    /// Pretty-printed JSON array of every record, in stored order
    pub async fn export_all(&self) -> Result<String> {
        let tasks = self.load().await?;
        Ok(serde_json::to_string_pretty(&tasks)?)
    }

    /// Replace the collection with an exported JSON array
    ///
    /// Every entry must carry a non-empty `id`, `state`, `model` (or
    /// `category`) and `prompt`, ids must be unique and the array must fit the
    /// retention cap; otherwise nothing is written. Returns the
    /// number of imported records.
    pub async fn import_all(&self, data: &str) -> Result<usize> {
        let entries: Vec<Value> = serde_json::from_str(data)
            .map_err(|e| Error::Import(format!("expected a JSON array of tasks: {e}")))?;

        for (index, entry) in entries.iter().enumerate() {
            for field in ["id", "state", "prompt"] {
                if !has_text(entry, field) {
                    return Err(Error::Import(format!(
                        "record {index} has no '{field}'"
                    )));
                }
            }
            if !has_text(entry, "model") && !has_text(entry, "category") {
                return Err(Error::Import(format!("record {index} has no 'model'")));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for entry in &entries {
            let id = entry.get("id").and_then(Value::as_str).unwrap_or_default();
            if !seen.insert(id) {
                return Err(Error::Import(format!("duplicate task id '{id}'")));
            }
        }

        if let Some(cap) = self.retention_cap {
            if entries.len() > cap {
                return Err(Error::Import(format!(
                    "{} tasks exceed the retention cap of {cap}",
                    entries.len()
                )));
            }
        }

        let tasks = entries
            .into_iter()
            .map(serde_json::from_value::<TaskRecord>)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Import(format!("malformed task: {e}")))?;

        let _guard = self.write_lock.lock().await;
        self.persist(&tasks).await?;
        tracing::info!(count = tasks.len(), "imported tasks");
        Ok(tasks.len())
    }
}

fn has_text(entry: &Value, field: &str) -> bool {
    entry
        .get(field)
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty())
}

fn sort_by_created(mut tasks: Vec<TaskRecord>) -> Vec<TaskRecord> {
    let key = |t: &TaskRecord| {
        chrono::DateTime::parse_from_rfc3339(&t.created_at)
            .ok()
            .map(|dt| dt.timestamp_millis())
    };
    // None sorts last; equal keys keep stored order
    tasks.sort_by(|a, b| key(b).cmp(&key(a)));
    tasks
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
