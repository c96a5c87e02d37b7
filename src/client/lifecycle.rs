//! Shutdown coordination.

use crate::error::Result;

use super::ViduClient;

impl ViduClient {
    /// Gracefully shut down the client
    ///
    /// 1. Stops accepting new submissions and polling sessions
    /// 2. Cancels every running polling session
    /// 3. Waits (up to 10 seconds) for the sessions to wind down
    /// 4. Closes the persistence backend
    ///
    /// Records already stored stay as they are; their sessions can be resumed
    /// later with [`ViduClient::refresh_active`].
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.accepting_new
            .store(false, std::sync::atomic::Ordering::SeqCst);
        self.poller.stop_accepting();
        tracing::info!("Stopped accepting new tasks");

        let cancelled = self.poller.cancel_all().await;
        tracing::info!(sessions = cancelled, "Signaled cancellation to polling sessions");

        let shutdown_timeout = std::time::Duration::from_secs(10);
        match tokio::time::timeout(shutdown_timeout, self.poller.wait_idle()).await {
            Ok(()) => tracing::info!("All polling sessions stopped"),
            Err(_) => tracing::warn!(
                "Timeout waiting for polling sessions to stop, proceeding with shutdown"
            ),
        }

        self.kv.close().await;
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }
}
