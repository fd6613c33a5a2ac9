//! Controller errors.

use ext_bridge_core::{Ack, MessageResponse, StorageError};
use ext_bridge_transport::TransportError;
use thiserror::Error;

/// Controller error.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Background is not initialized")]
    NotReady,
    #[error("Unknown menu item: {0}")]
    UnknownMenuItem(String),
    /// Another context answered with `success: false`.
    #[error("{0}")]
    Rejected(String),
}

/// Turn a reply into its data or a [`ContextError::Rejected`].
pub(crate) fn accepted<T>(response: MessageResponse<T>) -> Result<T, ContextError> {
    response.into_result().map_err(ContextError::Rejected)
}

/// Like [`accepted`], but an [`Ack`] with `success: false` is a rejection too.
pub(crate) fn acknowledged(response: MessageResponse<Ack>) -> Result<(), ContextError> {
    if accepted(response)?.success {
        Ok(())
    } else {
        Err(ContextError::Rejected(
            "Background did not apply the change".to_string(),
        ))
    }
}
