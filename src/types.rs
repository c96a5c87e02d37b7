//! Core types for vidu-bridge

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Lifecycle state of a generation task
///
/// `Completed` and `Failed` are terminal. Any value the service sends that is
/// not recognised (including an empty string) decodes as `Unknown` and keeps
/// polling going.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Accepted, not started
    Pending,
    /// Being generated
    Processing,
    /// Transient alias of `Processing` reported by some endpoints
    Running,
    /// Generation finished
    Completed,
    /// Generation failed
    Failed,
    /// Missing or unrecognised state
    #[default]
    #[serde(other)]
    Unknown,
}

impl TaskState {
    /// Whether polling stops at this state (`Completed` still requires a
    /// deliverable, see [`TaskRecord::is_finished`])
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }

    /// Whether the task is still expected to change
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Position along `pending -> processing -> {completed, failed}`
    ///
    /// `Unknown` has no position and never replaces a known state.
    pub fn rank(&self) -> Option<u8> {
        match self {
            TaskState::Pending => Some(0),
            TaskState::Processing | TaskState::Running => Some(1),
            TaskState::Completed | TaskState::Failed => Some(2),
            TaskState::Unknown => None,
        }
    }

    /// Lowercase wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Processing => "processing",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Unknown => "unknown",
        }
    }

    fn is_unknown(&self) -> bool {
        matches!(self, TaskState::Unknown)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deliverable of a completed task
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoOutput {
    /// Download URL of the generated clip
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,

    /// Poster frame
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

/// A generation task as persisted in the local store
///
/// Fields the service sends that are not modelled here are kept in `extra`
/// and written back unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Server-assigned id
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,

    /// Lifecycle state
    #[serde(
        default,
        skip_serializing_if = "TaskState::is_unknown",
        deserialize_with = "null_as_default"
    )]
    pub state: TaskState,

    /// Model identifier
    #[serde(
        default,
        skip_serializing_if = "String::is_empty",
        deserialize_with = "null_as_default"
    )]
    pub model: String,

    /// Prompt text
    #[serde(
        default,
        skip_serializing_if = "String::is_empty",
        deserialize_with = "null_as_default"
    )]
    pub prompt: String,

    /// Creation timestamp as sent by the service
    #[serde(
        default,
        skip_serializing_if = "String::is_empty",
        deserialize_with = "null_as_default"
    )]
    pub created_at: String,

    /// Generation flow the task belongs to (`text2video`, `image2video`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Epoch millis of the last successful status fetch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_feed: Option<i64>,

    /// RFC 3339 time of the last local state change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,

    /// Output video, present once the task completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoOutput>,

    /// Clip length in seconds
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_u32"
    )]
    pub duration: Option<u32>,

    /// Aspect ratio, e.g. "16:9"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,

    /// Resolution, e.g. "720p"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,

    /// Camera movement amplitude
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movement_amplitude: Option<String>,

    /// Reference images submitted with the task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,

    /// Seed submitted with the task
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_string"
    )]
    pub seed: Option<String>,

    /// Style preset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,

    /// Credits charged for the task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credits_used: Option<f64>,

    /// Estimated monetary cost
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<f64>,

    /// Everything else the service sent
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskRecord {
    /// Create a record with only an id and a state
    pub fn new(id: impl Into<String>, state: TaskState) -> Self {
        Self {
            id: id.into(),
            state,
            ..Self::default()
        }
    }

    /// Download URL, if a non-empty one is present
    pub fn download_url(&self) -> Option<&str> {
        self.video
            .as_ref()
            .and_then(|v| v.download_url.as_deref())
            .filter(|url| !url.is_empty())
    }

    /// Terminal for polling: failed, or completed with a deliverable
    pub fn is_finished(&self) -> bool {
        match self.state {
            TaskState::Failed => true,
            TaskState::Completed => self.download_url().is_some(),
            _ => false,
        }
    }

    /// Merge-patch `patch` into `self`: fields present in the patch overwrite,
    /// absent fields are retained. The id never changes.
    pub fn merge_from(&mut self, patch: &TaskRecord) -> Result<()> {
        let mut base = match serde_json::to_value(&*self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        if let Value::Object(incoming) = serde_json::to_value(patch)? {
            for (key, value) in incoming {
                if key == "id" {
                    continue;
                }
                base.insert(key, value);
            }
        }
        let id = std::mem::take(&mut self.id);
        *self = serde_json::from_value(Value::Object(base))?;
        self.id = id;
        Ok(())
    }

    /// Case-insensitive substring match over prompt, id and model
    pub fn matches_keyword(&self, keyword_lower: &str) -> bool {
        self.prompt.to_lowercase().contains(keyword_lower)
            || self.id.to_lowercase().contains(keyword_lower)
            || self.model.to_lowercase().contains(keyword_lower)
    }
}

// `null` decodes like an absent field
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// Accept 4, 4.0, "4" and "4s"
pub(crate) fn lenient_u32<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                    .map(|f| f as u64)
            })
            .and_then(|v| u32::try_from(v).ok()),
        Some(Value::String(s)) => s.trim().trim_end_matches(['s', 'S']).parse().ok(),
        _ => None,
    })
}

// Accept both 0 and "0"
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// How a polling session ended
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PollOutcome {
    /// Task completed with a download URL
    Completed,
    /// Task reported `failed`
    Failed,
    /// Attempt budget used up without a terminal state
    Exhausted {
        /// Number of fetches made
        attempts: u32,
    },
    /// A status fetch failed and the session was abandoned
    Errored {
        /// Error description
        message: String,
    },
    /// Stopped through its cancellation token
    Cancelled,
}

/// Result of deleting a task remotely and locally
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    /// The service accepted the DELETE
    pub remote_deleted: bool,
    /// A local record was removed
    pub local_deleted: bool,
}

/// Event emitted during the task lifecycle
///
/// `RequestFailed` is the user-visible notification sink; `TaskUpdated` is the
/// "task changed" signal UIs refresh on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A submission was accepted and its record stored
    TaskCreated {
        /// Task id
        id: String,
        /// Model or category
        model: String,
    },

    /// A polling snapshot or manual state change was stored
    TaskUpdated {
        /// Task id
        id: String,
        /// State after the update
        state: TaskState,
    },

    /// A task was removed from the local store
    TaskDeleted {
        /// Task id
        id: String,
    },

    /// A polling session started
    PollingStarted {
        /// Task id
        id: String,
        /// Profile name (`reference_v2` or `classic`)
        profile: String,
    },

    /// A polling session ended
    PollingStopped {
        /// Task id
        id: String,
        /// How it ended
        outcome: PollOutcome,
    },

    /// A request to the service failed
    RequestFailed {
        /// Resolved request URL
        url: String,
        /// HTTP status, when one was received
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
        /// Human-readable message
        message: String,
    },
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_and_empty_states_decode_as_unknown() {
        let state: TaskState = serde_json::from_value(json!("queued")).unwrap();
        assert_eq!(state, TaskState::Unknown);
        let state: TaskState = serde_json::from_value(json!("")).unwrap();
        assert_eq!(state, TaskState::Unknown);
        let record: TaskRecord = serde_json::from_value(json!({"id": "a"})).unwrap();
        assert_eq!(record.state, TaskState::Unknown);
    }

    #[test]
    fn running_ranks_with_processing() {
        assert_eq!(TaskState::Running.rank(), TaskState::Processing.rank());
        assert!(TaskState::Pending.rank() < TaskState::Running.rank());
        assert!(TaskState::Running.is_active());
        assert!(TaskState::Failed.is_terminal());
        assert_eq!(TaskState::Unknown.rank(), None);
    }

    #[test]
    fn completed_without_download_url_is_not_finished() {
        let mut record = TaskRecord::new("t1", TaskState::Completed);
        assert!(!record.is_finished());

        record.video = Some(VideoOutput {
            download_url: Some(String::new()),
            thumbnail_url: None,
        });
        assert!(!record.is_finished());

        record.video = Some(VideoOutput {
            download_url: Some("https://cdn/x.mp4".into()),
            thumbnail_url: None,
        });
        assert!(record.is_finished());
        assert!(TaskRecord::new("t2", TaskState::Failed).is_finished());
    }

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let raw = json!({
            "id": "t1",
            "state": "processing",
            "model": "vidu2.0",
            "creations_count": 1,
            "err_code": ""
        });
        let record: TaskRecord = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(record.extra["creations_count"], 1);
        assert_eq!(serde_json::to_value(&record).unwrap(), raw);
    }

    #[test]
    fn lenient_fields_accept_strings_and_numbers() {
        let record: TaskRecord =
            serde_json::from_value(json!({"id": "t", "duration": "8", "seed": 42})).unwrap();
        assert_eq!(record.duration, Some(8));
        assert_eq!(record.seed.as_deref(), Some("42"));
    }

    #[test]
    fn merge_overwrites_present_fields_and_keeps_absent_ones() {
        let mut stored = TaskRecord {
            id: "t1".into(),
            state: TaskState::Pending,
            prompt: "a cat".into(),
            model: "vidu2.0".into(),
            duration: Some(4),
            ..TaskRecord::default()
        };
        let patch = TaskRecord {
            id: "ignored".into(),
            state: TaskState::Processing,
            last_feed: Some(10),
            ..TaskRecord::default()
        };

        stored.merge_from(&patch).unwrap();

        assert_eq!(stored.id, "t1");
        assert_eq!(stored.state, TaskState::Processing);
        assert_eq!(stored.prompt, "a cat");
        assert_eq!(stored.duration, Some(4));
        assert_eq!(stored.last_feed, Some(10));
    }

    #[test]
    fn merge_with_unknown_state_keeps_stored_state() {
        let mut stored = TaskRecord::new("t1", TaskState::Processing);
        stored.merge_from(&TaskRecord::new("t1", TaskState::Unknown)).unwrap();
        assert_eq!(stored.state, TaskState::Processing);
    }

    #[test]
    fn events_are_tagged() {
        let event = Event::PollingStopped {
            id: "t1".into(),
            outcome: PollOutcome::Exhausted { attempts: 3 },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "polling_stopped");
        assert_eq!(json["outcome"]["outcome"], "exhausted");
        assert_eq!(json["outcome"]["attempts"], 3);
    }
}
