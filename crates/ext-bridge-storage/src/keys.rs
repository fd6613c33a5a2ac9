//! Typed storage keys.

use ext_bridge_core::{Settings, UserData};
use serde::{Serialize, de::DeserializeOwned};

/// A storage key with a fixed value type and a built-in default.
pub trait StorageKey {
    /// Exact key name in the flat namespace.
    const NAME: &'static str;
    type Value: Serialize + DeserializeOwned + Send + Sync + 'static;

    fn default_value() -> Self::Value;
}

/// `settings`
#[derive(Debug, Clone, Copy)]
pub struct SettingsKey;

impl StorageKey for SettingsKey {
    const NAME: &'static str = "settings";
    type Value = Settings;

    fn default_value() -> Settings {
        Settings::default()
    }
}

/// `userData`
#[derive(Debug, Clone, Copy)]
pub struct UserDataKey;

impl StorageKey for UserDataKey {
    const NAME: &'static str = "userData";
    type Value = UserData;

    fn default_value() -> UserData {
        UserData::default()
    }
}
