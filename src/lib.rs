//! # vidu-bridge
//!
//! Async client and relay proxy for the Vidu video-generation API.
//!
//! Generation jobs on Vidu are long-running: a creation call returns a task id
//! and the result has to be polled for. This crate covers that whole lifecycle:
//!
//! - **Submission** of reference-, text- and image-to-video tasks
//! - **Polling** in cancellable background sessions, one per task id
//! - **Local persistence** of task records in memory or SQLite
//! - **Relaying** browser requests through a proxy that injects the service key
//!
//! ## Quick Start
//!
//! ```no_run
//! use vidu_bridge::{Config, ReferenceToVideoRequest, ViduClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.api.server = Some("https://api.vidu.com".to_string());
//!     config.api.api_key = Some("vidu-key".to_string());
//!
//!     let client = ViduClient::open(config).await?;
//!
//!     let submission = client
//!         .submit_reference_to_video(ReferenceToVideoRequest {
//!             model: "vidu2.0".to_string(),
//!             images: vec!["https://example.com/cat.png".to_string()],
//!             prompt: "a cat playing piano".to_string(),
//!             ..Default::default()
//!         })
//!         .await?;
//!
//!     if let Some(poll) = submission.poll {
//!         println!("finished: {:?}", poll.wait().await);
//!     }
//!
//!     client.shutdown().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Per-request authentication headers
pub mod auth;
/// Client facade: submission, remote queries and polling
pub mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// HTTP request gateway
pub mod gateway;
/// Model catalog and pricing
pub mod models;
/// Credential-hiding relay proxy
pub mod proxy;
/// Key-value persistence backends
pub mod storage;
/// Task and preference stores
pub mod store;
/// Core types and events
pub mod types;
/// Versioned API response shapes
pub mod wire;

// Re-export commonly used types
pub use auth::{AuthResolver, Credentials};
pub use client::{
    ImageToVideoRequest, PollHandle, PollProfile, PollingEngine, ReferenceToVideoRequest,
    Submission, TextToVideoRequest, ViduClient,
};
pub use config::{Config, PollTiming, ProxyConfig, StorageBackend};
pub use error::{ApiError, Error, ErrorDetail, Result, StorageError, ToHttpStatus};
pub use gateway::RequestGateway;
pub use storage::{KvStore, MemoryKv, SqliteKv};
pub use store::{PreferenceStore, Preferences, TaskStats, TaskStore};
pub use types::{DeleteOutcome, Event, PollOutcome, TaskRecord, TaskState, VideoOutput};

/// Run the client until a termination signal arrives, then shut it down.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use vidu_bridge::{Config, ViduClient, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = ViduClient::open(Config::default()).await?;
///     client.refresh_active().await?;
///
///     run_with_shutdown(client).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(client: ViduClient) -> Result<()> {
    wait_for_signal().await;
    client.shutdown().await
}

#[cfg(unix)]
pub(crate) async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
pub(crate) async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
