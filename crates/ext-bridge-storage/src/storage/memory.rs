//! In-memory storage backend.

use std::sync::RwLock;

use async_trait::async_trait;
use ext_bridge_core::{
    ChangeFeed, StorageChanges,
    change::record_change,
    traits::{StorageBackend, StorageError},
};
use serde_json::{Map, Value};

/// In-memory backend.
///
/// Useful for tests and single-process simulations.
/// Data is lost on restart. Changes are published under the write lock, so
/// listeners see them in the order they were applied.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    values: RwLock<Map<String, Value>>,
    feed: ChangeFeed,
}

impl MemoryBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend pre-populated with `values`. No changes are published.
    #[must_use]
    pub fn with_values(values: Map<String, Value>) -> Self {
        Self {
            values: RwLock::new(values),
            feed: ChangeFeed::new(),
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self
            .values
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .get(key)
            .cloned())
    }

    async fn set(&self, items: Map<String, Value>) -> Result<(), StorageError> {
        let mut changes = StorageChanges::new();
        {
            let mut values = self
                .values
                .write()
                .map_err(|e| StorageError::Internal(e.to_string()))?;

            for (key, value) in items {
                let old = values.insert(key.clone(), value.clone());
                record_change(&mut changes, &key, old, Some(value));
            }
            self.feed.publish(&changes);
        }
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), StorageError> {
        let mut changes = StorageChanges::new();
        {
            let mut values = self
                .values
                .write()
                .map_err(|e| StorageError::Internal(e.to_string()))?;

            for key in keys {
                let old = values.remove(*key);
                record_change(&mut changes, key, old, None);
            }
            self.feed.publish(&changes);
        }
        Ok(())
    }

    async fn get_all(&self) -> Result<Map<String, Value>, StorageError> {
        Ok(self
            .values
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .clone())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let mut changes = StorageChanges::new();
        {
            let mut values = self
                .values
                .write()
                .map_err(|e| StorageError::Internal(e.to_string()))?;

            for (key, old) in std::mem::take(&mut *values) {
                record_change(&mut changes, &key, Some(old), None);
            }
            self.feed.publish(&changes);
        }
        Ok(())
    }

    fn changes(&self) -> &ChangeFeed {
        &self.feed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn items(key: &str, value: Value) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(key.to_string(), value);
        map
    }

    #[tokio::test]
    async fn test_missing_key_is_none() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.get("settings").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_replaces_wholesale() {
        let backend = MemoryBackend::new();
        backend
            .set(items("settings", json!({ "a": 1, "b": 2 })))
            .await
            .unwrap();
        backend.set(items("settings", json!({ "a": 3 }))).await.unwrap();
        assert_eq!(
            backend.get("settings").await.unwrap(),
            Some(json!({ "a": 3 }))
        );
    }

    #[tokio::test]
    async fn test_mutations_publish_changes() {
        let backend = MemoryBackend::new();
        let mut sub = backend.changes().subscribe();

        backend.set(items("userData", json!(1))).await.unwrap();
        let change = sub.recv().await.unwrap();
        assert_eq!(change["userData"].old_value, None);
        assert_eq!(change["userData"].new_value, Some(json!(1)));

        // Same value again: nothing changed, nothing published.
        backend.set(items("userData", json!(1))).await.unwrap();
        backend.remove(&["userData", "missing"]).await.unwrap();
        let change = sub.recv().await.unwrap();
        assert_eq!(change.len(), 1);
        assert_eq!(change["userData"].new_value, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_publish_in_commit_order() {
        let backend = std::sync::Arc::new(MemoryBackend::new());
        let mut sub = backend.changes().subscribe();

        let mut writers = tokio::task::JoinSet::new();
        for n in 0..64 {
            let backend = std::sync::Arc::clone(&backend);
            writers.spawn(async move { backend.set(items("userData", json!(n))).await });
        }
        while let Some(joined) = writers.join_next().await {
            joined.unwrap().unwrap();
        }

        let mut previous = None;
        while let Some(changes) = sub.try_recv() {
            let entry = &changes["userData"];
            assert_eq!(entry.old_value, previous);
            previous.clone_from(&entry.new_value);
        }
        assert_eq!(previous, backend.get("userData").await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_removes_every_key() {
        let mut initial = items("settings", json!(true));
        initial.insert("userData".to_string(), json!(2));
        initial.insert("other".to_string(), json!("x"));
        let backend = MemoryBackend::with_values(initial);
        let mut sub = backend.changes().subscribe();

        backend.clear().await.unwrap();
        assert!(backend.get_all().await.unwrap().is_empty());
        assert_eq!(sub.recv().await.unwrap().len(), 3);
    }
}
