//! Response shapes of the versioned (`/ent/v2`) API and their translation into
//! [`TaskRecord`]s

use serde::{Deserialize, Serialize};

use crate::config::GenerationDefaults;
use crate::types::{TaskRecord, TaskState, VideoOutput, lenient_u32, null_as_default};

/// Task object returned by `reference2video` and `generations/{id}`
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ViduV2Response {
    /// Task id
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    /// Task type
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    /// Lifecycle state
    #[serde(default, deserialize_with = "null_as_default")]
    pub state: TaskState,
    /// Model identifier
    #[serde(default, deserialize_with = "null_as_default")]
    pub model: String,
    /// Style preset
    #[serde(default)]
    pub style: Option<String>,
    /// Submitted input
    #[serde(default)]
    pub input: Option<ViduV2Input>,
    /// Effective generation parameters
    #[serde(default)]
    pub output_params: Option<ViduV2OutputParams>,
    /// Error code reported for failed tasks
    #[serde(default)]
    pub err_code: Option<String>,
    /// Creation timestamp
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: String,
    /// Output video
    #[serde(default)]
    pub video: Option<VideoOutput>,
}

/// Submitted input as echoed back by the service
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ViduV2Input {
    /// Creation id
    #[serde(default)]
    pub creation_id: Option<String>,
    /// Prompt list; the first entry carries the user prompt
    #[serde(default, deserialize_with = "null_as_default")]
    pub prompts: Vec<ViduV2Prompt>,
    /// Seed used
    #[serde(default)]
    pub seed: Option<serde_json::Value>,
}

/// One prompt entry
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ViduV2Prompt {
    /// Prompt type
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    /// Prompt text
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    /// Whether this is a negative prompt
    #[serde(default, deserialize_with = "null_as_default")]
    pub negative: bool,
}

/// Effective generation parameters
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ViduV2OutputParams {
    /// Number of clips
    #[serde(default, deserialize_with = "lenient_u32")]
    pub sample_count: Option<u32>,
    /// Clip length in seconds
    #[serde(default, deserialize_with = "lenient_u32")]
    pub duration: Option<u32>,
    /// Aspect ratio
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    /// Resolution
    #[serde(default)]
    pub resolution: Option<String>,
    /// Movement amplitude
    #[serde(default)]
    pub movement_amplitude: Option<String>,
}

impl ViduV2Response {
    /// First prompt's text, or empty
    pub fn prompt(&self) -> &str {
        self.input
            .as_ref()
            .and_then(|i| i.prompts.first())
            .map(|p| p.content.as_str())
            .unwrap_or("")
    }

    /// Flatten into the stored record shape, filling missing output parameters
    /// from `defaults`. `last_feed` is set to `now_ms`.
    pub fn to_record(&self, defaults: &GenerationDefaults, now_ms: i64) -> TaskRecord {
        let params = self.output_params.clone().unwrap_or_default();
        let non_empty = |v: Option<String>, fallback: &str| {
            v.filter(|s| !s.is_empty())
                .unwrap_or_else(|| fallback.to_string())
        };

        TaskRecord {
            id: self.id.clone(),
            state: self.state,
            model: self.model.clone(),
            prompt: self.prompt().to_string(),
            created_at: self.created_at.clone(),
            last_feed: Some(now_ms),
            video: self.video.clone(),
            duration: Some(params.duration.filter(|d| *d > 0).unwrap_or(defaults.duration)),
            aspect_ratio: Some(non_empty(params.aspect_ratio, &defaults.aspect_ratio)),
            resolution: Some(non_empty(params.resolution, &defaults.resolution)),
            movement_amplitude: Some(non_empty(
                params.movement_amplitude,
                &defaults.movement_amplitude,
            )),
            style: self.style.clone().filter(|s| !s.is_empty()),
            ..TaskRecord::default()
        }
    }
}
