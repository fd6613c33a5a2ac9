//! The extension's execution contexts.
//!
//! Provides:
//! - `BackgroundController` - Lifecycle, background handlers, state fan-out
//! - `ContentScript` - Per-tab listener and page actions
//! - `Popup` / `OptionsPage` - UI controllers that only send messages

pub mod background;
pub mod content;
pub mod error;
pub mod menu;
pub mod options;
pub mod popup;

pub use background::{
    BackgroundController, BackgroundHandle, FanOutReport, LifecycleEvent, LifecycleState,
};
pub use content::ContentScript;
pub use error::ContextError;
pub use menu::MenuItem;
pub use options::OptionsPage;
pub use popup::{Popup, PopupView};
