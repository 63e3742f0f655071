//! Error types for editing operations.

use thiserror::Error;

use crate::layer::LayerId;
use crate::tool::{OperationId, ToolKind};

/// Result type for editing operations.
pub type EditorResult<T> = Result<T, EditorError>;

/// Errors that can occur while editing a document.
///
/// Apart from operation outcomes, file I/O and document encoding, every
/// variant is a synchronous validation error: the call that returned it
/// changed nothing.
#[derive(Debug, Error)]
pub enum EditorError {
    /// Bad layer reference, bad index or otherwise inconsistent request.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Mutation attempted on a locked layer.
    #[error("Layer is locked: {0}")]
    Locked(LayerId),

    /// Blend mode name not in the supported set.
    #[error("Unknown blend mode: {0}")]
    UnknownBlendMode(String),

    /// The tool needs a prompt and none was given.
    #[error("{0} requires a prompt")]
    MissingPrompt(ToolKind),

    /// The tool needs a target region and the selection is empty.
    #[error("{0} requires a selection")]
    MissingSelection(ToolKind),

    /// Another operation is still queued or processing.
    #[error("Operation {0} is still active")]
    Busy(OperationId),

    /// History index outside the recorded range.
    #[error("History index {index} out of range (length {len})")]
    OutOfRange {
        /// The requested index.
        index: usize,
        /// The number of history entries.
        len: usize,
    },

    /// The operation was cancelled before it finished.
    #[error("Operation cancelled")]
    Cancelled,

    /// The operation failed; the document is unchanged.
    #[error("Operation failed: {0}")]
    OperationFailed(String),

    /// Document serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Reading or writing a document file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EditorError {
    /// Shorthand for an [`EditorError::InvalidState`] with a formatted message.
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// Returns true if this error was raised before any state change.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        !matches!(
            self,
            Self::Cancelled | Self::OperationFailed(_) | Self::Io(_) | Self::Serialization(_)
        )
    }
}
