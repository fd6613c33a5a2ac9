//! The closed set of message kinds.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Discriminant of a message.
///
/// The set is closed: new contracts are added as new variants, never by
/// loosening the payload of an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    /// Ask for the url and title of a page.
    GetTabInfo,
    /// Flip the global enabled flag.
    ToggleExtension,
    /// Read the settings record.
    GetSettings,
    /// Shallow-merge a partial settings record.
    UpdateSettings,
    /// Run a page-level action inside a content script.
    ContentAction,
    /// Background fan-out telling content scripts the enabled flag changed.
    ExtensionStateChanged,
}

impl MessageKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::GetTabInfo,
        Self::ToggleExtension,
        Self::GetSettings,
        Self::UpdateSettings,
        Self::ContentAction,
        Self::ExtensionStateChanged,
    ];

    /// Wire tag of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GetTabInfo => "GET_TAB_INFO",
            Self::ToggleExtension => "TOGGLE_EXTENSION",
            Self::GetSettings => "GET_SETTINGS",
            Self::UpdateSettings => "UPDATE_SETTINGS",
            Self::ContentAction => "CONTENT_ACTION",
            Self::ExtensionStateChanged => "EXTENSION_STATE_CHANGED",
        }
    }

    /// Parse a wire tag. Unrecognized tags yield `None`.
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
