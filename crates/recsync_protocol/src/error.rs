//! Error types for the protocol crate.

use recsync_codec::CodecError;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised by path handling, patching and message parsing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// A path string could not be tokenized or addresses something unreachable.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath {
        /// The offending path.
        path: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A message does not have the shape its action requires.
    #[error("invalid message {message}: {reason}")]
    InvalidMessage {
        /// Rendered message.
        message: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Codec-level failure (JSON, typed values, non-finite numbers).
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl ProtocolError {
    /// Creates an invalid path error.
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid message error.
    pub fn invalid_message(message: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidMessage {
            message: message.to_string(),
            reason: reason.into(),
        }
    }
}
