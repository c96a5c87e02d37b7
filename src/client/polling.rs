//! Polling engine: one cancellable background session per task id.
//!
//! A session repeatedly fetches a task's status, stores each snapshot and stops
//! on the first terminal state, on an exhausted attempt budget, on a failed
//! fetch, or on cancellation. Starting a session for an id that already has one
//! joins the running session instead of racing it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{GenerationDefaults, PollTiming};
use crate::error::{Error, Result};
use crate::gateway::RequestGateway;
use crate::store::TaskStore;
use crate::types::{Event, PollOutcome, TaskRecord, TaskState};
use crate::wire::ViduV2Response;

/// Which status endpoint a session polls and how responses are stored
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollFlow {
    /// `/ent/v2/generations/{id}`; nested responses are flattened with defaults
    ReferenceV2,
    /// `/v1/videos/{category}/{id}`; responses are merged as sent, with the
    /// category and prompt stamped on
    Classic {
        /// `text2video` or `image2video`
        category: String,
        /// Prompt carried into every snapshot when non-empty
        prompt: Option<String>,
    },
}

/// A named polling configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollProfile {
    /// Endpoint and mapping
    pub flow: PollFlow,
    /// Attempt budget and pacing
    pub timing: PollTiming,
}

impl PollProfile {
    /// Versioned reference-to-video flow
    pub fn reference_v2(timing: PollTiming) -> Self {
        Self {
            flow: PollFlow::ReferenceV2,
            timing,
        }
    }

    /// Classic text/image-to-video flow
    pub fn classic(category: impl Into<String>, prompt: Option<String>, timing: PollTiming) -> Self {
        Self {
            flow: PollFlow::Classic {
                category: category.into(),
                prompt,
            },
            timing,
        }
    }

    /// Replace the timing
    pub fn with_timing(mut self, timing: PollTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Profile name used in events and logs
    pub fn name(&self) -> &'static str {
        match self.flow {
            PollFlow::ReferenceV2 => "reference_v2",
            PollFlow::Classic { .. } => "classic",
        }
    }

    /// Status path for a task id
    pub fn status_path(&self, id: &str) -> String {
        let id = urlencoding::encode(id);
        match &self.flow {
            PollFlow::ReferenceV2 => format!("/ent/v2/generations/{id}"),
            PollFlow::Classic { category, .. } => {
                let category = if category == "image2video" {
                    "image2video"
                } else {
                    "text2video"
                };
                format!("/v1/videos/{category}/{id}")
            }
        }
    }

    /// Turn a status response into the record to store
    pub fn translate(
        &self,
        url: &str,
        value: Value,
        defaults: &GenerationDefaults,
        now_ms: i64,
    ) -> Result<TaskRecord> {
        let decode = |e: serde_json::Error| Error::Decode {
            url: url.to_string(),
            message: e.to_string(),
        };

        match &self.flow {
            PollFlow::ReferenceV2 => {
                let response: ViduV2Response = serde_json::from_value(value).map_err(decode)?;
                Ok(response.to_record(defaults, now_ms))
            }
            PollFlow::Classic { category, prompt } => {
                let mut record: TaskRecord = serde_json::from_value(value).map_err(decode)?;
                record.last_feed = Some(now_ms);
                record.category = Some(category.clone());
                if let Some(prompt) = prompt.as_ref().filter(|p| !p.is_empty()) {
                    record.prompt = prompt.clone();
                }
                Ok(record)
            }
        }
    }
}

/// Handle to a running (or just finished) polling session
#[derive(Debug, Clone)]
pub struct PollHandle {
    id: String,
    joined: bool,
    token: CancellationToken,
    outcome: watch::Receiver<Option<PollOutcome>>,
}

impl PollHandle {
    /// Task id being polled
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether this handle attached to a session that was already running
    pub fn is_joined(&self) -> bool {
        self.joined
    }

    /// Request cancellation of the session
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Outcome if the session has already ended
    pub fn outcome(&self) -> Option<PollOutcome> {
        self.outcome.borrow().clone()
    }

    /// Wait for the session to end
    pub async fn wait(mut self) -> PollOutcome {
        match self.outcome.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or(PollOutcome::Cancelled),
            Err(_) => PollOutcome::Cancelled,
        }
    }
}

struct Session {
    generation: u64,
    token: CancellationToken,
    outcome: watch::Receiver<Option<PollOutcome>>,
}

/// Session registry and polling loop
#[derive(Clone)]
pub struct PollingEngine {
    gateway: RequestGateway,
    store: Arc<TaskStore>,
    defaults: Arc<GenerationDefaults>,
    event_tx: tokio::sync::broadcast::Sender<Event>,
    sessions: Arc<tokio::sync::Mutex<HashMap<String, Session>>>,
    next_generation: Arc<AtomicU64>,
    accepting_new: Arc<AtomicBool>,
}

impl PollingEngine {
    /// Create an engine writing into `store`
    pub fn new(
        gateway: RequestGateway,
        store: Arc<TaskStore>,
        defaults: GenerationDefaults,
        event_tx: tokio::sync::broadcast::Sender<Event>,
    ) -> Self {
        Self {
            gateway,
            store,
            defaults: Arc::new(defaults),
            event_tx,
            sessions: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
            next_generation: Arc::new(AtomicU64::new(1)),
            accepting_new: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Start polling `id`, or join the session already polling it
    ///
    /// Returns `Ok(None)` for an empty id. The first fetch happens after the
    /// profile's initial delay, inside the (cancellable) session.
    pub async fn start(&self, id: &str, profile: PollProfile) -> Result<Option<PollHandle>> {
        if id.is_empty() {
            return Ok(None);
        }
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(id) {
            if session.outcome.borrow().is_none() {
                debug!(task_id = %id, "joining existing polling session");
                return Ok(Some(PollHandle {
                    id: id.to_string(),
                    joined: true,
                    token: session.token.clone(),
                    outcome: session.outcome.clone(),
                }));
            }
        }

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let token = CancellationToken::new();
        let (outcome_tx, outcome_rx) = watch::channel(None);
        sessions.insert(
            id.to_string(),
            Session {
                generation,
                token: token.clone(),
                outcome: outcome_rx.clone(),
            },
        );
        drop(sessions);

        info!(task_id = %id, profile = profile.name(), "polling started");
        self.emit_event(Event::PollingStarted {
            id: id.to_string(),
            profile: profile.name().to_string(),
        });

        let engine = self.clone();
        let task_id = id.to_string();
        let session_token = token.clone();
        tokio::spawn(async move {
            let outcome = engine.run(&task_id, &profile, &session_token).await;
            engine
                .finish(&task_id, generation, outcome, outcome_tx)
                .await;
        });

        Ok(Some(PollHandle {
            id: id.to_string(),
            joined: false,
            token,
            outcome: outcome_rx,
        }))
    }

    /// Cancel the session polling `id`; returns whether one was running
    pub async fn cancel(&self, id: &str) -> bool {
        let sessions = self.sessions.lock().await;
        match sessions.get(id) {
            Some(session) => {
                session.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every running session; returns how many were signalled
    pub async fn cancel_all(&self) -> usize {
        let sessions = self.sessions.lock().await;
        for (id, session) in sessions.iter() {
            debug!(task_id = %id, "cancelling polling session");
            session.token.cancel();
        }
        sessions.len()
    }

    /// Ids currently being polled
    pub async fn active_sessions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Whether `id` has a running session
    pub async fn is_polling(&self, id: &str) -> bool {
        self.sessions.lock().await.contains_key(id)
    }

    /// Refuse new sessions from now on
    pub fn stop_accepting(&self) {
        self.accepting_new.store(false, Ordering::SeqCst);
    }

    /// Wait until every session registered at call time has ended
    pub async fn wait_idle(&self) {
        let pending: Vec<watch::Receiver<Option<PollOutcome>>> = self
            .sessions
            .lock()
            .await
            .values()
            .map(|s| s.outcome.clone())
            .collect();

        for mut outcome in pending {
            let _ = outcome.wait_for(Option::is_some).await;
        }
    }

    async fn run(&self, id: &str, profile: &PollProfile, token: &CancellationToken) -> PollOutcome {
        let timing = profile.timing;

        if !timing.initial_delay.is_zero() {
            tokio::select! {
                _ = token.cancelled() => return PollOutcome::Cancelled,
                _ = tokio::time::sleep(timing.initial_delay) => {}
            }
        }

        let path = profile.status_path(id);
        let url = self.gateway.url_for(&path);

        for attempt in 1..=timing.max_attempts {
            let fetched = tokio::select! {
                _ = token.cancelled() => return PollOutcome::Cancelled,
                result = self.gateway.get(&path) => result,
            };

            let value = match fetched {
                Ok(value) => value,
                Err(e) => {
                    warn!(task_id = %id, attempt, error = %e, "status fetch failed, abandoning polling");
                    return PollOutcome::Errored {
                        message: e.to_string(),
                    };
                }
            };

            let now_ms = chrono::Utc::now().timestamp_millis();
            let snapshot = match profile.translate(&url, value, &self.defaults, now_ms) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(task_id = %id, attempt, error = %e, "unreadable status response, abandoning polling");
                    return PollOutcome::Errored {
                        message: e.to_string(),
                    };
                }
            };

            debug!(task_id = %id, attempt, state = %snapshot.state, "status fetched");

            if !snapshot.id.is_empty() {
                match self.store.apply_poll_snapshot(snapshot.clone()).await {
                    Ok(Some(stored)) => self.emit_event(Event::TaskUpdated {
                        id: stored.id,
                        state: stored.state,
                    }),
                    Ok(None) => {
                        debug!(task_id = %id, "stored record already finished");
                        return self.stored_outcome(&snapshot.id).await;
                    }
                    Err(e) => {
                        warn!(task_id = %id, error = %e, "failed to store status snapshot");
                        return PollOutcome::Errored {
                            message: e.to_string(),
                        };
                    }
                }
            }

            if let Some(outcome) = terminal_outcome(&snapshot) {
                return outcome;
            }

            if attempt < timing.max_attempts {
                tokio::select! {
                    _ = token.cancelled() => return PollOutcome::Cancelled,
                    _ = tokio::time::sleep(timing.interval) => {}
                }
            }
        }

        PollOutcome::Exhausted {
            attempts: timing.max_attempts,
        }
    }

    async fn stored_outcome(&self, id: &str) -> PollOutcome {
        match self.store.get(id).await {
            Ok(Some(record)) if record.state == TaskState::Failed => PollOutcome::Failed,
            _ => PollOutcome::Completed,
        }
    }

    async fn finish(
        &self,
        id: &str,
        generation: u64,
        outcome: PollOutcome,
        outcome_tx: watch::Sender<Option<PollOutcome>>,
    ) {
        let mut sessions = self.sessions.lock().await;
        if sessions.get(id).is_some_and(|s| s.generation == generation) {
            sessions.remove(id);
        }

        info!(task_id = %id, outcome = ?outcome, "polling stopped");
        self.emit_event(Event::PollingStopped {
            id: id.to_string(),
            outcome: outcome.clone(),
        });
        outcome_tx.send_replace(Some(outcome));
    }

    fn emit_event(&self, event: Event) {
        // send() returns Err if there are no receivers, which is fine
        self.event_tx.send(event).ok();
    }
}

/// Outcome a snapshot ends the session with, if any
fn terminal_outcome(record: &TaskRecord) -> Option<PollOutcome> {
    match record.state {
        TaskState::Failed => Some(PollOutcome::Failed),
        TaskState::Completed if record.is_finished() => Some(PollOutcome::Completed),
        _ => None,
    }
}
