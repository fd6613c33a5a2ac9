//! Context menu entries registered by the background.

use serde::{Deserialize, Serialize};

/// A context menu entry. Clicking it sends `CONTENT_ACTION { action: id }`
/// to the clicked tab, so `id` doubles as the content action name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: String,
    pub title: String,
}

impl MenuItem {
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }

    /// Entries registered on install.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("highlight", "Highlight selection"),
            Self::new("getSelection", "Read selection"),
        ]
    }
}
