//! Core abstractions shared by every extension context.
//!
//! This crate provides the fundamental building blocks:
//! - `MessageKind`, `Message` and the payload types of the wire protocol
//! - `MessageResponse` - Structured `{ success, data, error }` reply
//! - `Settings` / `UserData` - The persisted records
//! - `ChangeFeed` - Storage change notifications
//! - `StorageBackend` trait and `BridgeConfig`

pub mod change;
pub mod config;
pub mod kind;
pub mod message;
pub mod response;
pub mod sender;
pub mod settings;
pub mod traits;

pub use change::{
    ChangeFeed, ChangeSubscription, ListenerId, StorageChange, StorageChanges, record_change,
};
pub use config::{BridgeConfig, ConfigError, StorageBackendKind, StorageConfig};
pub use kind::MessageKind;
pub use message::{
    Ack, ContentAction, ContentActionResult, Envelope, ExtensionStateChanged, GetSettings,
    GetTabInfo, Message, PageInfo, ToggleExtension, UpdateSettings,
};
pub use response::{MessageResponse, UNKNOWN_MESSAGE_TYPE, WireResponse};
pub use sender::{Origin, SenderContext, Tab, TabId, WindowId};
pub use settings::{Settings, SettingsPatch, Theme, UserData};
pub use traits::{StorageBackend, StorageError};
