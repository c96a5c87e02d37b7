//! Task creation for the reference, text and image generation flows.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::models;
use crate::types::{Event, TaskRecord};
use crate::wire::ViduV2Response;

use super::ViduClient;
use super::polling::{PollHandle, PollProfile};

const REFERENCE_PATH: &str = "/ent/v2/reference2video";
const TEXT_PATH: &str = "/v1/videos/text2video";
const IMAGE_PATH: &str = "/v1/videos/image2video";

/// Reference-to-video generation request
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReferenceToVideoRequest {
    /// Model identifier (required)
    pub model: String,
    /// Reference image URLs (at least one)
    pub images: Vec<String>,
    /// Text prompt (required)
    pub prompt: String,
    /// Clip length in seconds
    pub duration: Option<u32>,
    /// Generation seed
    pub seed: Option<String>,
    /// Aspect ratio, e.g. "16:9"
    pub aspect_ratio: Option<String>,
    /// Resolution, e.g. "720p"
    pub resolution: Option<String>,
    /// Movement amplitude, e.g. "auto"
    pub movement_amplitude: Option<String>,
}

/// Body actually sent to `reference2video`, with defaults applied
#[derive(Debug, Serialize)]
struct ReferencePayload<'a> {
    model: &'a str,
    images: &'a [String],
    prompt: &'a str,
    duration: u32,
    seed: String,
    aspect_ratio: String,
    resolution: String,
    movement_amplitude: String,
}

/// Text-to-video generation request
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TextToVideoRequest {
    /// Text prompt (required)
    pub prompt: String,
    /// Extra body fields, sent alongside the prompt (and overriding it)
    #[serde(default)]
    pub options: Map<String, Value>,
}

/// Image-to-video generation request, uploaded as multipart form data
#[derive(Clone, Debug, Default)]
pub struct ImageToVideoRequest {
    /// Image bytes (required)
    pub image: Vec<u8>,
    /// File name reported for the upload
    pub file_name: String,
    /// MIME type of the image, e.g. "image/png"
    pub mime_type: Option<String>,
    /// Text prompt (required)
    pub prompt: String,
    /// Clip length in seconds
    pub duration: Option<u32>,
    /// Aspect ratio
    pub aspect_ratio: Option<String>,
    /// Style preset
    pub style: Option<String>,
    /// Motion strength
    pub motion_strength: Option<String>,
    /// Additional form fields
    pub extra_fields: BTreeMap<String, String>,
}

/// Result of a successful creation call
#[derive(Debug)]
pub struct Submission {
    /// Record as stored right after creation
    pub record: TaskRecord,
    /// Polling session started for the new task, if the service returned an id
    pub poll: Option<PollHandle>,
}

impl ViduClient {
    /// Create a reference-to-video task
    ///
    /// Validates the request before any network call, applies the configured
    /// generation defaults and, when the service returns a task id, stores the
    /// initial record and starts a `reference_v2` polling session. The first
    /// status fetch happens after the profile's initial delay; this method
    /// does not wait for it.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for a missing model, images or prompt
    /// - any gateway error of the creation call, unchanged; nothing is stored
    pub async fn submit_reference_to_video(
        &self,
        request: ReferenceToVideoRequest,
    ) -> Result<Submission> {
        if request.model.trim().is_empty() || request.images.is_empty() {
            return Err(Error::Validation(
                "model and images are required, and images must be a non-empty array".into(),
            ));
        }
        if request.prompt.trim().is_empty() {
            return Err(Error::Validation("prompt is required".into()));
        }
        self.ensure_accepting()?;

        let defaults = &self.config.defaults;
        let non_empty = |v: &Option<String>, fallback: &str| {
            v.clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| fallback.to_string())
        };
        let payload = ReferencePayload {
            model: &request.model,
            images: &request.images,
            prompt: &request.prompt,
            duration: request.duration.filter(|d| *d > 0).unwrap_or(defaults.duration),
            seed: non_empty(&request.seed, &defaults.seed),
            aspect_ratio: non_empty(&request.aspect_ratio, &defaults.aspect_ratio),
            resolution: non_empty(&request.resolution, &defaults.resolution),
            movement_amplitude: non_empty(&request.movement_amplitude, &defaults.movement_amplitude),
        };

        let value = self.gateway.post_json(REFERENCE_PATH, &payload).await?;
        let response: ViduV2Response =
            serde_json::from_value(value).map_err(|e| Error::Decode {
                url: self.gateway.url_for(REFERENCE_PATH),
                message: e.to_string(),
            })?;

        let now_ms = chrono::Utc::now().timestamp_millis();
        let mut record = response.to_record(defaults, now_ms);
        if record.model.is_empty() {
            record.model = request.model.clone();
        }
        if record.prompt.is_empty() {
            record.prompt = request.prompt.clone();
        }
        record.images = Some(request.images.clone());
        record.seed = Some(payload.seed.clone());

        let duration_label = format!("{}s", record.duration.unwrap_or(payload.duration));
        if let Some(price) = models::model_price(
            &record.model,
            record.resolution.as_deref(),
            Some(&duration_label),
        ) {
            record.credits_used = Some(f64::from(price.credits));
            record.estimated_cost = Some(price.price);
        }

        let profile = PollProfile::reference_v2(self.config.polling.reference_v2);
        self.accept_created(record, profile).await
    }

    /// Create a text-to-video task
    ///
    /// The body is `{prompt, ...options}`. Polling uses the classic profile
    /// with category `text2video`.
    pub async fn submit_text_to_video(&self, request: TextToVideoRequest) -> Result<Submission> {
        if request.prompt.trim().is_empty() {
            return Err(Error::Validation("prompt is required".into()));
        }
        self.ensure_accepting()?;

        let mut body = Map::new();
        body.insert("prompt".into(), Value::String(request.prompt.clone()));
        body.extend(request.options.clone());

        let value = self.gateway.post_json(TEXT_PATH, &body).await?;
        let mut record = self.classic_record(TEXT_PATH, value, "text2video", &request.prompt)?;
        if record.model.is_empty() {
            if let Some(model) = request.options.get("model").and_then(Value::as_str) {
                record.model = model.to_string();
            }
        }

        let profile = PollProfile::classic(
            "text2video",
            Some(request.prompt),
            self.config.polling.classic,
        );
        self.accept_created(record, profile).await
    }

    /// Create an image-to-video task from an uploaded image
    ///
    /// The image goes in the `image_file` form field. The prompt is stamped on
    /// every polled snapshot, since the classic status endpoint may omit it.
    pub async fn submit_image_to_video(&self, request: ImageToVideoRequest) -> Result<Submission> {
        if request.image.is_empty() {
            return Err(Error::Validation("image is required".into()));
        }
        if request.prompt.trim().is_empty() {
            return Err(Error::Validation("prompt is required".into()));
        }
        self.ensure_accepting()?;

        let file_name = if request.file_name.is_empty() {
            "image.png".to_string()
        } else {
            request.file_name.clone()
        };
        let mut part = reqwest::multipart::Part::bytes(request.image.clone()).file_name(file_name);
        if let Some(mime) = &request.mime_type {
            part = part
                .mime_str(mime)
                .map_err(|e| Error::Validation(format!("invalid image MIME type '{mime}': {e}")))?;
        }

        let mut form = reqwest::multipart::Form::new()
            .part("image_file", part)
            .text("prompt", request.prompt.clone());
        if let Some(duration) = request.duration {
            form = form.text("duration", duration.to_string());
        }
        let optional = [
            ("aspect_ratio", &request.aspect_ratio),
            ("style", &request.style),
            ("motion_strength", &request.motion_strength),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                form = form.text(name, value.clone());
            }
        }
        for (name, value) in &request.extra_fields {
            form = form.text(name.clone(), value.clone());
        }

        let value = self.gateway.post_multipart(IMAGE_PATH, form).await?;
        let mut record = self.classic_record(IMAGE_PATH, value, "image2video", &request.prompt)?;
        record.duration = record.duration.or(request.duration);
        record.aspect_ratio = record.aspect_ratio.or(request.aspect_ratio);
        record.style = record.style.or(request.style);

        let profile = PollProfile::classic(
            "image2video",
            Some(request.prompt),
            self.config.polling.classic,
        );
        self.accept_created(record, profile).await
    }

    fn classic_record(
        &self,
        path: &str,
        value: Value,
        category: &str,
        prompt: &str,
    ) -> Result<TaskRecord> {
        let mut record: TaskRecord = serde_json::from_value(value).map_err(|e| Error::Decode {
            url: self.gateway.url_for(path),
            message: e.to_string(),
        })?;
        record.category = Some(category.to_string());
        record.last_feed = Some(chrono::Utc::now().timestamp_millis());
        if record.prompt.is_empty() {
            record.prompt = prompt.to_string();
        }
        Ok(record)
    }

    /// Store a freshly created record and hand it to the poller
    async fn accept_created(&self, record: TaskRecord, profile: PollProfile) -> Result<Submission> {
        if record.id.is_empty() {
            tracing::warn!("creation response carried no task id; nothing stored");
            return Ok(Submission { record, poll: None });
        }

        let record = self.store.upsert(record).await?;
        tracing::info!(task_id = %record.id, model = %record.model, "task created");
        let model = match (&record.category, record.model.is_empty()) {
            (Some(category), true) => category.clone(),
            _ => record.model.clone(),
        };
        self.emit_event(Event::TaskCreated {
            id: record.id.clone(),
            model,
        });

        let poll = match self.poller.start(&record.id, profile).await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(task_id = %record.id, error = %e, "could not start polling");
                None
            }
        };

        Ok(Submission { record, poll })
    }

    fn ensure_accepting(&self) -> Result<()> {
        if self.is_accepting() {
            Ok(())
        } else {
            Err(Error::ShuttingDown)
        }
    }
}
