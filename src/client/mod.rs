//! Client facade tying the gateway, the stores and the polling engine together.
//!
//! The `ViduClient` struct and its methods are organized by concern:
//! - [`submit`] - Task creation for the three generation flows
//! - [`remote`] - Remote task lookup, listing and deletion
//! - [`polling`] - Background status polling sessions
//! - [`lifecycle`] - Shutdown coordination

mod lifecycle;
pub mod polling;
mod remote;
mod submit;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use polling::{PollFlow, PollHandle, PollProfile, PollingEngine};
pub use submit::{ImageToVideoRequest, ReferenceToVideoRequest, Submission, TextToVideoRequest};

use crate::auth::{AuthResolver, Credentials};
use crate::config::Config;
use crate::error::Result;
use crate::gateway::RequestGateway;
use crate::storage::KvStore;
use crate::store::{PreferenceStore, TaskStore};

/// Video generation client (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct ViduClient {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: std::sync::Arc<Config>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<crate::types::Event>,
    /// Backend shared by both stores
    pub(crate) kv: std::sync::Arc<dyn KvStore>,
    /// Local task repository
    pub(crate) store: std::sync::Arc<TaskStore>,
    /// User preferences
    pub(crate) preferences: std::sync::Arc<PreferenceStore>,
    /// Every outgoing request goes through here
    pub(crate) gateway: RequestGateway,
    /// Status polling sessions
    pub(crate) poller: PollingEngine,
    /// Set to false during shutdown
    pub(crate) accepting_new: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl ViduClient {
    /// Create a client on top of an already opened backend
    ///
    /// The configured `api.api_key`, if any, becomes the service key. It takes
    /// precedence over a session token, which is only sent when no key is set.
    pub fn new(config: Config, kv: std::sync::Arc<dyn KvStore>) -> Result<Self> {
        config.validate()?;

        // Subscribers lagging more than 1000 events miss the oldest ones
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        let auth = AuthResolver::new(Credentials {
            service_key: config.api.api_key.clone(),
            ..Credentials::default()
        });
        let gateway = RequestGateway::new(&config.api, auth, event_tx.clone())?;

        let store = std::sync::Arc::new(TaskStore::new(kv.clone(), &config.store));
        let preferences = std::sync::Arc::new(PreferenceStore::new(
            kv.clone(),
            &config.store.preferences_key,
        ));
        let poller = PollingEngine::new(
            gateway.clone(),
            store.clone(),
            config.defaults.clone(),
            event_tx.clone(),
        );

        tracing::info!(
            server = config.api.server.as_deref().unwrap_or(&config.api.proxy_origin),
            tasks_key = %config.store.tasks_key,
            "Vidu client initialized"
        );

        Ok(Self {
            config: std::sync::Arc::new(config),
            event_tx,
            kv,
            store,
            preferences,
            gateway,
            poller,
            accepting_new: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true)),
        })
    }

    /// Open the configured persistence backend and create a client on it
    pub async fn open(config: Config) -> Result<Self> {
        let kv = crate::storage::open_backend(&config.persistence).await?;
        Self::new(config, kv)
    }

    /// Subscribe to client events
    ///
    /// Each subscriber receives every event independently. A subscriber more
    /// than 1000 events behind gets `RecvError::Lagged`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use vidu_bridge::{Config, ViduClient};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let client = ViduClient::open(Config::default()).await?;
    ///
    ///     let mut events = client.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             tracing::info!(?event, "vidu event");
    ///         }
    ///     });
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<crate::types::Event> {
        self.event_tx.subscribe()
    }

    /// Current configuration
    pub fn get_config(&self) -> std::sync::Arc<Config> {
        std::sync::Arc::clone(&self.config)
    }

    /// Local task repository
    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// Preference store
    pub fn preferences(&self) -> &PreferenceStore {
        &self.preferences
    }

    /// Polling engine
    pub fn poller(&self) -> &PollingEngine {
        &self.poller
    }

    /// Request gateway
    pub fn gateway(&self) -> &RequestGateway {
        &self.gateway
    }

    /// Current credentials
    pub fn credentials(&self) -> Credentials {
        self.gateway.auth().credentials()
    }

    /// Modify the credentials used by subsequent requests, including the ones
    /// issued by running polling sessions
    pub fn update_credentials<F>(&self, f: F)
    where
        F: FnOnce(&mut Credentials),
    {
        self.gateway.auth().update(f);
    }

    /// Set the session token pair sent as `x-vtoken` and `x-ctoken`
    pub fn set_session_tokens(&self, v_token: Option<String>, c_token: Option<String>) {
        self.update_credentials(|c| {
            c.v_token = v_token;
            c.c_token = c_token;
        });
    }

    /// Emit an event to all subscribers
    ///
    /// With no subscribers the event is silently dropped.
    pub(crate) fn emit_event(&self, event: crate::types::Event) {
        self.event_tx.send(event).ok();
    }

    pub(crate) fn is_accepting(&self) -> bool {
        self.accepting_new.load(std::sync::atomic::Ordering::SeqCst)
    }
}
