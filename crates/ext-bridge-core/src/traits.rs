//! Persistence capability consumed by the settings store.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::ChangeFeed;

/// Storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Stored value for '{key}' is malformed: {reason}")]
    Malformed { key: String, reason: String },
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Flat, string-keyed persistence with change notifications.
///
/// Every mutation that actually changes a value must be published on
/// [`StorageBackend::changes`] after it is durably applied.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Value under `key`, or `None` if never set.
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Write every entry of `items`, replacing prior values wholesale.
    async fn set(&self, items: Map<String, Value>) -> Result<(), StorageError>;

    /// Remove the given keys. Missing keys are ignored.
    async fn remove(&self, keys: &[&str]) -> Result<(), StorageError>;

    /// Snapshot of the whole namespace.
    async fn get_all(&self) -> Result<Map<String, Value>, StorageError>;

    /// Remove every key.
    async fn clear(&self) -> Result<(), StorageError>;

    /// Feed that receives `{ key: { oldValue, newValue } }` per mutation.
    fn changes(&self) -> &ChangeFeed;
}
