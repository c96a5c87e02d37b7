//! Shared state for the relay proxy

use crate::config::ProxyConfig;
use crate::error::{Error, Result};
use std::sync::Arc;

/// State handed to every relay handler
///
/// Cloned per request (cheap Arc clones).
#[derive(Clone)]
pub struct ProxyState {
    /// Proxy configuration
    pub config: Arc<ProxyConfig>,

    /// Client used for upstream calls
    pub http: reqwest::Client,
}

impl ProxyState {
    /// Create state with an upstream client honoring `upstream_timeout`
    pub fn new(config: Arc<ProxyConfig>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.upstream_timeout)
            .build()
            .map_err(|e| Error::ProxyServer(format!("failed to build upstream client: {e}")))?;
        Ok(Self { config, http })
    }
}
