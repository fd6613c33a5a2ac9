//! Transport failures.

use ext_bridge_core::TabId;
use thiserror::Error;

/// Why a message did not get a reply.
///
/// Channel adapters never return these to callers directly; they are
/// flattened into `{ success: false, error }` responses.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Could not establish connection. Receiving end does not exist.")]
    NoReceiver,
    #[error("No active tab found")]
    NoActiveTab,
    #[error("No tab with id: {0}")]
    TabNotFound(TabId),
    #[error("Cannot access contents of privileged page: {0}")]
    PrivilegedPage(String),
    #[error("The message port closed before a response was received.")]
    PortClosed,
    #[error("No response within {0} ms")]
    Timeout(u64),
    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}
