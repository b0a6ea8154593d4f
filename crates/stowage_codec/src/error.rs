//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode a value.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Input ended before the declared length was read.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// The type tag is not a known codex type.
    #[error("unknown type tag: {0}")]
    UnknownTag(u8),

    /// The value had a different type than expected.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Name of the expected type.
        expected: &'static str,
        /// Name of the type that was found.
        found: &'static str,
    },

    /// Invalid UTF-8 string.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// Containers nested deeper than the decoder allows.
    #[error("nesting depth exceeds {0}")]
    TooDeep(usize),

    /// Bytes were left over after a complete value.
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),
}

impl CodecError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }
}
