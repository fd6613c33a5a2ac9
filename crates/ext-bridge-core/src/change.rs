//! Storage change notifications.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// `{ oldValue, newValue }` for a single key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
}

/// One mutation's worth of changes, keyed by storage key.
pub type StorageChanges = BTreeMap<String, StorageChange>;

/// Listener registration id.
pub type ListenerId = u64;

/// Fan-out of storage changes to any number of listeners.
///
/// Every listener owns an unbounded queue, so a slow listener never loses a
/// change and never blocks the writer.
#[derive(Debug, Default)]
pub struct ChangeFeed {
    next_id: AtomicU64,
    listeners: RwLock<HashMap<ListenerId, mpsc::UnboundedSender<StorageChanges>>>,
}

impl ChangeFeed {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new listener.
    pub fn subscribe(&self) -> ChangeSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(id, tx);
        ChangeSubscription { id, rx }
    }

    /// Drop a listener. Changes already queued for it are still delivered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    /// Deliver `changes` to every listener. Empty change sets are dropped.
    pub fn publish(&self, changes: &StorageChanges) {
        if changes.is_empty() {
            return;
        }
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        listeners.retain(|id, tx| {
            let alive = tx.send(changes.clone()).is_ok();
            if !alive {
                tracing::debug!(listener = id, "Dropping closed storage listener");
            }
            alive
        });
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

/// Receiving side of a [`ChangeFeed`] registration.
#[derive(Debug)]
pub struct ChangeSubscription {
    id: ListenerId,
    rx: mpsc::UnboundedReceiver<StorageChanges>,
}

impl ChangeSubscription {
    #[must_use]
    pub const fn id(&self) -> ListenerId {
        self.id
    }

    /// Next change set, or `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<StorageChanges> {
        self.rx.recv().await
    }

    /// Pending change set without waiting.
    pub fn try_recv(&mut self) -> Option<StorageChanges> {
        self.rx.try_recv().ok()
    }

    #[must_use]
    pub fn into_stream(self) -> UnboundedReceiverStream<StorageChanges> {
        UnboundedReceiverStream::new(self.rx)
    }
}

/// Diff helper used by backends: records `old -> new` when they differ.
pub fn record_change(
    changes: &mut StorageChanges,
    key: &str,
    old_value: Option<Value>,
    new_value: Option<Value>,
) {
    if old_value != new_value {
        changes.insert(
            key.to_string(),
            StorageChange {
                old_value,
                new_value,
            },
        );
    }
}
