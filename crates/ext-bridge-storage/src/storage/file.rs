//! JSON file storage backend.
//!
//! The whole namespace lives in one JSON object. Every mutation rewrites the
//! file through a temporary sibling and a rename, so a crash leaves either the
//! old or the new contents on disk. Mutations are serialized by an async mutex
//! held across the write.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ext_bridge_core::{
    ChangeFeed, StorageChanges,
    change::record_change,
    traits::{StorageBackend, StorageError},
};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

/// File-backed storage that survives restarts.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
    feed: ChangeFeed,
}

impl FileBackend {
    /// Open (or lazily create) the store at `path`.
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be read or is not a JSON
    /// object.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let values = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => Map::new(),
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes)? {
                Value::Object(map) => map,
                other => {
                    return Err(StorageError::Malformed {
                        key: path.display().to_string(),
                        reason: format!("expected a JSON object, found {other}"),
                    });
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), keys = values.len(), "Opened file storage");

        Ok(Self {
            path,
            values: Mutex::new(values),
            feed: ChangeFeed::new(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, values: &Map<String, Value>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(values)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Apply `mutate` to a copy, persist it, then commit and publish.
    ///
    /// The in-memory view only changes once the write succeeded. Publishing
    /// happens before the lock is released.
    async fn mutate<F>(&self, mutate: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut Map<String, Value>, &mut StorageChanges) + Send,
    {
        let mut guard = self.values.lock().await;
        let mut next = guard.clone();
        let mut changes = StorageChanges::new();
        mutate(&mut next, &mut changes);
        if changes.is_empty() {
            return Ok(());
        }

        if let Err(e) = self.persist(&next).await {
            tracing::error!(path = %self.path.display(), "Failed to persist storage: {e}");
            return Err(e);
        }
        *guard = next;
        self.feed.publish(&changes);
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, items: Map<String, Value>) -> Result<(), StorageError> {
        self.mutate(move |values, changes| {
            for (key, value) in items {
                let old = values.insert(key.clone(), value.clone());
                record_change(changes, &key, old, Some(value));
            }
        })
        .await
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), StorageError> {
        self.mutate(|values, changes| {
            for key in keys {
                let old = values.remove(*key);
                record_change(changes, key, old, None);
            }
        })
        .await
    }

    async fn get_all(&self) -> Result<Map<String, Value>, StorageError> {
        Ok(self.values.lock().await.clone())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.mutate(|values, changes| {
            for (key, old) in std::mem::take(values) {
                record_change(changes, &key, Some(old), None);
            }
        })
        .await
    }

    fn changes(&self) -> &ChangeFeed {
        &self.feed
    }
}
