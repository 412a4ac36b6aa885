//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding frames and values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A frame could not be parsed.
    #[error("malformed frame: {message}")]
    Malformed {
        /// Description of the framing error.
        message: String,
    },

    /// A frame exceeds the configured maximum packet size.
    #[error("packet of {size} bytes exceeds maximum of {max} bytes")]
    PacketTooLarge {
        /// Size of the offending frame in bytes.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The topic byte is not a known topic.
    #[error("unknown topic byte 0x{0:02x}")]
    UnknownTopic(u8),

    /// The action code is not a known action.
    #[error("unknown action code {0:?}")]
    UnknownAction(String),

    /// Argument lengths do not fit in a single-byte header size.
    #[error("frame header of {0} bytes exceeds 127 bytes")]
    HeaderTooLarge(usize),

    /// A frame field is not valid UTF-8.
    #[error("invalid UTF-8 in frame field")]
    InvalidUtf8,

    /// Unexpected end of input.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// JSON text could not be parsed or produced.
    #[error("invalid JSON: {message}")]
    InvalidJson {
        /// Description of the JSON error.
        message: String,
    },

    /// A typed scalar has an unknown tag or a bad payload.
    #[error("invalid typed value: {message}")]
    InvalidTypedValue {
        /// Description of the error.
        message: String,
    },

    /// NaN and infinities have no JSON representation.
    #[error("non-finite numbers are not JSON-compatible")]
    NonFiniteNumber,
}

impl CodecError {
    /// Create a malformed frame error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Create an invalid JSON error.
    pub fn invalid_json(message: impl Into<String>) -> Self {
        Self::InvalidJson {
            message: message.into(),
        }
    }

    /// Create an invalid typed value error.
    pub fn invalid_typed(message: impl Into<String>) -> Self {
        Self::InvalidTypedValue {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_json(err.to_string())
    }
}
