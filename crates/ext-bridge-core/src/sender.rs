//! Sender descriptors attached to every inbound message.

use serde::{Deserialize, Serialize};

/// Tab identifier assigned by the host.
pub type TabId = u32;

/// Browser window identifier assigned by the host.
pub type WindowId = u32;

/// A host tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: TabId,
    pub window_id: WindowId,
    pub url: String,
    pub title: String,
}

/// Which kind of context sent a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Background,
    ContentScript,
    Popup,
    Options,
}

/// Opaque description of a message's origin, handed to handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderContext {
    pub origin: Origin,
    /// Present when the sender is a content script.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab: Option<Tab>,
}

impl SenderContext {
    #[must_use]
    pub const fn background() -> Self {
        Self {
            origin: Origin::Background,
            tab: None,
        }
    }

    #[must_use]
    pub const fn popup() -> Self {
        Self {
            origin: Origin::Popup,
            tab: None,
        }
    }

    #[must_use]
    pub const fn options() -> Self {
        Self {
            origin: Origin::Options,
            tab: None,
        }
    }

    #[must_use]
    pub const fn content_script(tab: Tab) -> Self {
        Self {
            origin: Origin::ContentScript,
            tab: Some(tab),
        }
    }

    /// Tab id of the sender, if it lives in a tab.
    #[must_use]
    pub fn tab_id(&self) -> Option<TabId> {
        self.tab.as_ref().map(|tab| tab.id)
    }
}
