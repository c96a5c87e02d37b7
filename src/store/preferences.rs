use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::storage::KvStore;

/// Persisted default generation parameters and UI toggles
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    /// Owner of these preferences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Model preselected for new submissions (default: "vidu2.0")
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Clip length in seconds (default: 4)
    #[serde(default = "default_duration")]
    pub default_duration: u32,

    /// Aspect ratio (default: "16:9")
    #[serde(default = "default_aspect_ratio")]
    pub default_aspect_ratio: String,

    /// Resolution (default: "720p")
    #[serde(default = "default_resolution")]
    pub default_resolution: String,

    /// Movement amplitude (default: "auto")
    #[serde(default = "default_movement_amplitude")]
    pub default_movement_amplitude: String,

    /// Style preset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_style: Option<String>,

    /// Start polling automatically after submission (default: true)
    #[serde(default = "default_true")]
    pub auto_poll: bool,

    /// Preferred polling interval in milliseconds (default: 5000)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Show notifications (default: true)
    #[serde(default = "default_true")]
    pub show_notifications: bool,

    /// Download finished videos automatically (default: false)
    #[serde(default)]
    pub auto_download: bool,

    /// Autoplay videos in listings (default: false)
    #[serde(default)]
    pub auto_play_videos: bool,

    /// Show thumbnails (default: true)
    #[serde(default = "default_true")]
    pub show_thumbnails: bool,

    /// Grid rather than list view (default: true)
    #[serde(default = "default_true")]
    pub grid_view: bool,

    /// Notify when a task completes (default: true)
    #[serde(default = "default_true")]
    pub notify_on_completion: bool,

    /// Notify when a task fails (default: true)
    #[serde(default = "default_true")]
    pub notify_on_failure: bool,

    /// Keys written by other clients
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            user_id: None,
            default_model: default_model(),
            default_duration: default_duration(),
            default_aspect_ratio: default_aspect_ratio(),
            default_resolution: default_resolution(),
            default_movement_amplitude: default_movement_amplitude(),
            default_style: None,
            auto_poll: true,
            poll_interval_ms: default_poll_interval_ms(),
            show_notifications: true,
            auto_download: false,
            auto_play_videos: false,
            show_thumbnails: true,
            grid_view: true,
            notify_on_completion: true,
            notify_on_failure: true,
            extra: Map::new(),
        }
    }
}

fn default_model() -> String {
    "vidu2.0".into()
}

fn default_duration() -> u32 {
    4
}

fn default_aspect_ratio() -> String {
    "16:9".into()
}

fn default_resolution() -> String {
    "720p".into()
}

fn default_movement_amplitude() -> String {
    "auto".into()
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

/// Single-object store for [`Preferences`]
pub struct PreferenceStore {
    kv: Arc<dyn KvStore>,
    key: String,
    write_lock: tokio::sync::Mutex<()>,
}

impl PreferenceStore {
    /// Create a store over `kv` under `key`
    pub fn new(kv: Arc<dyn KvStore>, key: impl Into<String>) -> Self {
        Self {
            kv,
            key: key.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Stored preferences, or defaults when nothing is stored
    pub async fn get(&self) -> Result<Preferences> {
        match self.kv.get(&self.key).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Preferences::default()),
        }
    }

    /// Whether anything has been saved
    pub async fn is_saved(&self) -> Result<bool> {
        Ok(self.kv.get(&self.key).await?.is_some())
    }

    /// Replace the stored preferences
    pub async fn save(&self, preferences: &Preferences) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write(preferences).await
    }

    /// Merge a JSON object into the current preferences and store the result
    pub async fn update(&self, patch: Value) -> Result<Preferences> {
        let Value::Object(patch) = patch else {
            return Err(Error::Validation(
                "preference update must be a JSON object".to_string(),
            ));
        };

        let _guard = self.write_lock.lock().await;
        let mut current = match serde_json::to_value(self.get().await?)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        current.extend(patch);

        let updated: Preferences = serde_json::from_value(Value::Object(current))
            .map_err(|e| Error::Validation(format!("invalid preference value: {e}")))?;
        self.write(&updated).await?;
        Ok(updated)
    }

    /// Remove the stored preferences; `get` returns defaults afterwards
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.kv.remove(&self.key).await
    }

    async fn write(&self, preferences: &Preferences) -> Result<()> {
        let raw = serde_json::to_string(preferences)?;
        self.kv.set(&self.key, &raw).await
    }
}
