//! Error types for the wire protocol.

use stowage_codec::CodecError;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while reading, writing, or decoding protocol units.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Frame length prefix is zero or above the frame cap.
    #[error("invalid frame length: {0}")]
    FrameLengthInvalid(u32),

    /// A declared inner length overflows the buffer.
    #[error("payload too short")]
    PayloadTooShort,

    /// The message does not start with the magic byte.
    #[error("invalid magic number: {0:#04x}")]
    MagicNumberInvalid(u8),

    /// The message carries a protocol version this build does not speak.
    #[error("invalid protocol version: {0}")]
    InvalidProtocolVersion(u8),

    /// The message type byte is not a known type.
    #[error("unknown message type: {0}")]
    UnknownMessageType(u8),

    /// The message declares an empty payload.
    #[error("empty payload")]
    EmptyPayload,

    /// The response carries a status code outside the known set.
    #[error("unknown status code: {0}")]
    UnknownStatus(u16),

    /// A name or string field is not valid UTF-8.
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    /// A string is too long for its length prefix.
    #[error("{field} is too long: {len} bytes")]
    FieldTooLong {
        /// Name of the field.
        field: &'static str,
        /// Actual length in bytes.
        len: usize,
    },

    /// An embedded codex value failed to decode.
    #[error("invalid value: {0}")]
    Codec(#[from] CodecError),

    /// Socket I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Returns true if the peer closed the connection cleanly.
    pub fn is_eof(&self) -> bool {
        matches!(self, ProtocolError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
    }

    /// Returns true if the error is an I/O failure rather than bad input.
    pub fn is_io(&self) -> bool {
        matches!(self, ProtocolError::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eof_detection() {
        let eof = ProtocolError::Io(std::io::ErrorKind::UnexpectedEof.into());
        assert!(eof.is_eof());
        assert!(eof.is_io());
        assert!(!ProtocolError::PayloadTooShort.is_io());
    }

    #[test]
    fn error_display() {
        assert_eq!(
            ProtocolError::MagicNumberInvalid(0x7F).to_string(),
            "invalid magic number: 0x7f"
        );
    }
}
