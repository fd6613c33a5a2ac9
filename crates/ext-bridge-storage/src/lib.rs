//! Typed settings persistence for extension contexts.
//!
//! Provides:
//! - `SettingsStore` - Typed access, defaulting and change listeners
//! - Storage backends (memory, JSON file)

pub mod keys;
pub mod storage;
pub mod store;

pub use keys::{SettingsKey, StorageKey, UserDataKey};
pub use store::{ListenerHandle, SettingsStore};
