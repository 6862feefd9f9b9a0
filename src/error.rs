//! Error types for the oa-tokendiff crate.

use std::path::PathBuf;

use crate::token::Side;

/// Diff engine error types.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// Internal engine state contradicts itself. Never recoverable: the
    /// whole diff computation is aborted and no partial result is produced.
    #[error("invariant violated: {message} [{context}]")]
    InvariantViolation { message: String, context: String },

    /// A token handed in across the tokenizer boundary is malformed.
    #[error("invalid token {index} on side {side}: {reason}")]
    InvalidToken {
        side: Side,
        index: usize,
        reason: String,
    },

    /// I/O error with context.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DiffError {
    /// Build an [`DiffError::InvariantViolation`].
    pub fn invariant(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
            context: context.into(),
        }
    }
}

/// Convenience result type for oa-tokendiff operations.
pub type DiffResult<T> = Result<T, DiffError>;
