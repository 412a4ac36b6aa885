//! Error types for the client engine.

use recsync_codec::CodecError;
use recsync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    /// An inbound frame could not be parsed. Reported on the error channel.
    #[error("protocol parse error: {message}")]
    ProtocolParse {
        /// Parser message.
        message: String,
    },

    /// A frame exceeds the configured packet limit.
    #[error("packet of {size} bytes exceeds limit of {max}")]
    PacketTooLarge {
        /// Frame size in bytes.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The connection is not open.
    #[error("not connected to server")]
    NotConnected,

    /// A wait exceeded its deadline.
    #[error("timed out in state {current}, expected {expected}")]
    Timeout {
        /// State when the deadline fired.
        current: String,
        /// State that was awaited.
        expected: String,
    },

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// A caller-supplied argument was rejected before any state changed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The server refused the connection.
    #[error("connection rejected by server")]
    AuthDenied,

    /// Credentials were rejected; the caller may retry.
    #[error("authentication failed: {reason}")]
    AuthFailed {
        /// Reason given by the server.
        reason: String,
    },

    /// The server stopped accepting credentials on this connection.
    #[error("too many authentication attempts")]
    TooManyAuthAttempts,

    /// The client did not authenticate in time.
    #[error("authentication timed out")]
    AuthTimeout,

    /// No inbound traffic within the heartbeat window.
    #[error("heartbeat timed out")]
    HeartbeatTimeout,

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The server reported an error.
    #[error("server error: {0}")]
    Server(String),

    /// A record was about to be disposed while still in use.
    #[error("lifecycle invariant violated for record {name:?}: {reason}")]
    LifecycleInvariantViolation {
        /// Record name.
        name: String,
        /// Which invariant failed.
        reason: String,
    },

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(CodecError),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl ClientError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Maps a decoder error on inbound data.
    pub(crate) fn inbound(error: CodecError) -> Self {
        match error {
            CodecError::PacketTooLarge { size, max } => Self::PacketTooLarge { size, max },
            other => Self::ProtocolParse {
                message: other.to_string(),
            },
        }
    }

    /// Returns true if this error ends the connection for good.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ClientError::AuthDenied
                | ClientError::TooManyAuthAttempts
                | ClientError::AuthTimeout
                | ClientError::LifecycleInvariantViolation { .. }
        )
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport { retryable, .. } => *retryable,
            ClientError::Timeout { .. }
            | ClientError::NotConnected
            | ClientError::HeartbeatTimeout
            | ClientError::Server(_) => true,
            _ => false,
        }
    }
}

impl From<CodecError> for ClientError {
    fn from(error: CodecError) -> Self {
        match error {
            CodecError::PacketTooLarge { size, max } => Self::PacketTooLarge { size, max },
            other => Self::Codec(other),
        }
    }
}
