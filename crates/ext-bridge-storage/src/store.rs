//! Typed settings store.

use std::sync::Arc;

use ext_bridge_core::{
    ChangeSubscription, ListenerId, Settings, SettingsPatch, StorageChanges, UserData,
    traits::{StorageBackend, StorageError},
};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;

use crate::keys::{SettingsKey, StorageKey, UserDataKey};

/// Typed view over a shared [`StorageBackend`].
///
/// Cheap to clone; every clone talks to the same backend, which is the only
/// source of truth. Read-modify-write helpers are last-write-wins when two
/// contexts race.
#[derive(Clone)]
pub struct SettingsStore {
    backend: Arc<dyn StorageBackend>,
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore").finish_non_exhaustive()
    }
}

impl SettingsStore {
    /// Create a store over `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Store over a fresh in-memory backend.
    #[cfg(feature = "memory")]
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(crate::storage::MemoryBackend::new()))
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Current value for `K`, or `None` if absent.
    ///
    /// # Errors
    /// Returns error on backend failure or if the stored value does not match
    /// the key's shape.
    pub async fn get<K: StorageKey>(&self) -> Result<Option<K::Value>, StorageError> {
        let Some(raw) = self.backend.get(K::NAME).await? else {
            return Ok(None);
        };
        serde_json::from_value(raw)
            .map(Some)
            .map_err(|e| StorageError::Malformed {
                key: K::NAME.to_string(),
                reason: e.to_string(),
            })
    }

    /// Current value for `K`, falling back to its default when absent.
    ///
    /// # Errors
    /// Same as [`SettingsStore::get`].
    pub async fn get_or_default<K: StorageKey>(&self) -> Result<K::Value, StorageError> {
        Ok(self.get::<K>().await?.unwrap_or_else(K::default_value))
    }

    /// Replace the value for `K` wholesale.
    ///
    /// # Errors
    /// Returns error if serialization or the backend write fails.
    pub async fn set<K: StorageKey>(&self, value: &K::Value) -> Result<(), StorageError> {
        let mut items = Map::new();
        items.insert(K::NAME.to_string(), serde_json::to_value(value)?);
        self.backend.set(items).await
    }

    /// Remove `K`.
    ///
    /// # Errors
    /// Returns error on backend failure.
    pub async fn remove<K: StorageKey>(&self) -> Result<(), StorageError> {
        self.backend.remove(&[K::NAME]).await
    }

    /// Every stored key, known or not.
    ///
    /// # Errors
    /// Returns error on backend failure.
    pub async fn get_all(&self) -> Result<Map<String, Value>, StorageError> {
        self.backend.get_all().await
    }

    /// Remove every key in the namespace, not just the known ones.
    ///
    /// # Errors
    /// Returns error on backend failure.
    pub async fn clear(&self) -> Result<(), StorageError> {
        tracing::info!("Clearing storage");
        self.backend.clear().await
    }

    /// Write the built-in default for every known key that is absent.
    ///
    /// Idempotent. Returns the keys that were written.
    ///
    /// # Errors
    /// Returns error on backend failure.
    pub async fn initialize_defaults(&self) -> Result<Vec<&'static str>, StorageError> {
        let mut items = Map::new();
        self.default_if_absent::<SettingsKey>(&mut items).await?;
        self.default_if_absent::<UserDataKey>(&mut items).await?;

        let written: Vec<&'static str> = [SettingsKey::NAME, UserDataKey::NAME]
            .into_iter()
            .filter(|key| items.contains_key(*key))
            .collect();
        if !items.is_empty() {
            self.backend.set(items).await?;
            tracing::info!(?written, "Initialized storage defaults");
        }
        Ok(written)
    }

    async fn default_if_absent<K: StorageKey>(
        &self,
        items: &mut Map<String, Value>,
    ) -> Result<(), StorageError> {
        if self.backend.get(K::NAME).await?.is_none() {
            items.insert(K::NAME.to_string(), serde_json::to_value(K::default_value())?);
        }
        Ok(())
    }

    /// Register `callback` for every change in the namespace.
    ///
    /// The callback runs on its own task and sees each change set exactly
    /// once, in publication order. Must be called within a tokio runtime.
    pub fn on_change<F>(&self, mut callback: F) -> ListenerHandle
    where
        F: FnMut(&StorageChanges) + Send + 'static,
    {
        let mut subscription = self.backend.changes().subscribe();
        let id = subscription.id();
        let task = tokio::spawn(async move {
            while let Some(changes) = subscription.recv().await {
                callback(&changes);
            }
        });
        ListenerHandle {
            id,
            backend: Arc::clone(&self.backend),
            task,
        }
    }

    /// Raw subscription for callers that want to await changes themselves.
    #[must_use]
    pub fn subscribe(&self) -> ChangeSubscription {
        self.backend.changes().subscribe()
    }

    /// The settings record, or `None` before initialization.
    ///
    /// # Errors
    /// Same as [`SettingsStore::get`].
    pub async fn settings(&self) -> Result<Option<Settings>, StorageError> {
        self.get::<SettingsKey>().await
    }

    /// Shallow-merge `patch` over the current settings (defaulted if absent)
    /// and store the full result. Returns `(before, after)`.
    ///
    /// # Errors
    /// Returns error on backend failure or a malformed stored record.
    pub async fn update_settings(
        &self,
        patch: &SettingsPatch,
    ) -> Result<(Settings, Settings), StorageError> {
        let before = self.get_or_default::<SettingsKey>().await?;
        let after = before.merged(patch);
        self.set::<SettingsKey>(&after).await?;
        tracing::debug!(?before, ?after, "Updated settings");
        Ok((before, after))
    }

    /// Set the enabled flag. Returns `(before, after)`.
    ///
    /// # Errors
    /// Same as [`SettingsStore::update_settings`].
    pub async fn set_enabled(&self, enabled: bool) -> Result<(Settings, Settings), StorageError> {
        self.update_settings(&SettingsPatch::enabled(enabled)).await
    }

    /// Count a visit at `now_ms` and return the updated record.
    ///
    /// # Errors
    /// Returns error on backend failure or a malformed stored record.
    pub async fn record_visit(&self, now_ms: i64) -> Result<UserData, StorageError> {
        let data = self.get_or_default::<UserDataKey>().await?.visited(now_ms);
        self.set::<UserDataKey>(&data).await?;
        Ok(data)
    }
}

/// De-registration handle returned by [`SettingsStore::on_change`].
pub struct ListenerHandle {
    id: ListenerId,
    backend: Arc<dyn StorageBackend>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl ListenerHandle {
    #[must_use]
    pub const fn id(&self) -> ListenerId {
        self.id
    }

    /// Stop receiving changes. Changes already queued are still delivered.
    pub fn remove(self) {
        self.backend.changes().unsubscribe(self.id);
    }

    /// Whether the listener task is still running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}
