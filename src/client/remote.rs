//! Remote task lookup, listing and deletion.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::types::{DeleteOutcome, Event};
use crate::wire::ViduV2Response;

use super::ViduClient;
use super::polling::{PollHandle, PollProfile};

const GENERATIONS_PATH: &str = "/ent/v2/generations";

fn generation_path(id: &str) -> String {
    format!("{GENERATIONS_PATH}/{}", urlencoding::encode(id))
}

fn require_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(Error::Validation("task id is required".into()));
    }
    Ok(())
}

impl ViduClient {
    /// Fetch one task from the service without touching the local store
    pub async fn fetch_task(&self, id: &str) -> Result<ViduV2Response> {
        require_id(id)?;
        let path = generation_path(id);
        let value = self.gateway.get(&path).await?;
        serde_json::from_value(value).map_err(|e| Error::Decode {
            url: self.gateway.url_for(&path),
            message: e.to_string(),
        })
    }

    /// One page of the remote task list, as returned by the service
    ///
    /// `page` defaults to 1 and `limit` to 20.
    pub async fn list_remote_tasks(&self, page: Option<u32>, limit: Option<u32>) -> Result<Value> {
        let path = format!(
            "{GENERATIONS_PATH}?page={}&limit={}",
            page.unwrap_or(1),
            limit.unwrap_or(20)
        );
        self.gateway.get(&path).await
    }

    /// Delete a task remotely (best effort) and locally
    ///
    /// A running polling session for the task is cancelled first. A failed
    /// remote delete is logged and reported in the outcome; the local record is
    /// removed regardless.
    pub async fn delete_task(&self, id: &str) -> Result<DeleteOutcome> {
        require_id(id)?;

        self.poller.cancel(id).await;

        let remote_deleted = match self.gateway.delete(&generation_path(id)).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(task_id = %id, error = %e, "remote delete failed, removing local record only");
                false
            }
        };

        let local_deleted = self.store.delete(id).await?;
        if local_deleted {
            self.emit_event(Event::TaskDeleted { id: id.to_string() });
        }

        tracing::info!(task_id = %id, remote_deleted, local_deleted, "task deleted");
        Ok(DeleteOutcome {
            remote_deleted,
            local_deleted,
        })
    }

    /// Restart polling for every stored task that is not finished
    ///
    /// Tasks with a category use the classic profile, others `reference_v2`.
    /// Tasks already being polled are joined rather than polled twice.
    pub async fn refresh_active(&self) -> Result<Vec<PollHandle>> {
        if !self.is_accepting() {
            return Err(Error::ShuttingDown);
        }

        let mut handles = Vec::new();
        for record in self.store.active().await? {
            let profile = match &record.category {
                Some(category) => PollProfile::classic(
                    category.clone(),
                    Some(record.prompt.clone()).filter(|p| !p.is_empty()),
                    self.config.polling.classic,
                ),
                None => PollProfile::reference_v2(self.config.polling.reference_v2),
            };
            if let Some(handle) = self.poller.start(&record.id, profile).await? {
                handles.push(handle);
            }
        }

        tracing::debug!(sessions = handles.len(), "refreshed active tasks");
        Ok(handles)
    }
}
