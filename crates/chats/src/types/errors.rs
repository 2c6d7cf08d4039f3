//! Error types for the engines.

use duo_store::{StorageError, StoreError};
use thiserror::Error;

/// Result type alias for engine operations
pub type ChatResult<T> = Result<T, ChatError>;

/// Per-operation failures surfaced to the caller.
///
/// Validation problems are not errors: the operations treat them as no-ops.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Failed to send message: {0}")]
    SendFailed(#[source] StoreError),

    #[error("Failed to upload drawing: {0}")]
    UploadFailed(#[source] StorageError),

    #[error("Invalid drawing: {reason}")]
    InvalidDrawing { reason: String },

    #[error("Failed to update like: {0}")]
    LikeFailed(#[source] StoreError),

    #[error("Failed to create list: {0}")]
    CreateListFailed(#[source] StoreError),

    #[error("Failed to update list: {0}")]
    UpdateListFailed(#[source] StoreError),

    #[error("Failed to delete list: {0}")]
    DeleteListFailed(#[source] StoreError),

    #[error("Failed to add message to list: {0}")]
    AddToListFailed(#[source] StoreError),

    #[error("Failed to remove message from list: {0}")]
    RemoveFromListFailed(#[source] StoreError),

    #[error("Failed to toggle item: {0}")]
    ToggleCompletedFailed(#[source] StoreError),

    #[error("Failed to load list items: {0}")]
    ListItemsFailed(#[source] StoreError),

    #[error("Message not found: {id}")]
    MessageNotFound { id: String },

    #[error("List item not found: {id}")]
    ItemNotFound { id: String },

    #[error("Session is closed")]
    SessionClosed,
}

impl ChatError {
    /// Create a not found error for messages
    pub fn message_not_found(id: impl Into<String>) -> Self {
        Self::MessageNotFound { id: id.into() }
    }

    /// Create a not found error for list items
    pub fn item_not_found(id: impl Into<String>) -> Self {
        Self::ItemNotFound { id: id.into() }
    }

    /// Create an invalid drawing error
    pub fn invalid_drawing(reason: impl Into<String>) -> Self {
        Self::InvalidDrawing {
            reason: reason.into(),
        }
    }
}
