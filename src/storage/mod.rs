//! Key-value persistence providers
//!
//! The task and preference stores keep one JSON document per key. A backend
//! only has to get, set and remove whole documents:
//! - [`memory`] - process-local map
//! - [`sqlite`] - `kv_store` table in a SQLite file

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{PersistenceConfig, StorageBackend};
use crate::error::Result;

mod memory;
mod sqlite;

pub use memory::MemoryKv;
pub use sqlite::SqliteKv;

/// String-keyed document storage
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read the document stored under `key`
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the document stored under `key`
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete the document stored under `key` (no-op when absent)
    async fn remove(&self, key: &str) -> Result<()>;

    /// Release backend resources
    async fn close(&self) {}
}

/// Open the backend selected by the configuration
pub async fn open_backend(config: &PersistenceConfig) -> Result<Arc<dyn KvStore>> {
    match &config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryKv::new())),
        StorageBackend::Sqlite { path } => Ok(Arc::new(SqliteKv::open(path).await?)),
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
