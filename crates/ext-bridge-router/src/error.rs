//! Handler failures.

use ext_bridge_core::{MessageKind, StorageError};
use thiserror::Error;

/// Why a handler did not produce a value.
///
/// Only the `Display` text crosses the context boundary, as the `error` field
/// of the response.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),
    #[error("Invalid payload for {kind}: {source}")]
    InvalidPayload {
        kind: MessageKind,
        source: serde_json::Error,
    },
    #[error("Failed to encode response for {kind}: {source}")]
    Encode {
        kind: MessageKind,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl HandlerError {
    /// Failure with a free-form description.
    #[must_use]
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
