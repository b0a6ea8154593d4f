//! Error types for the client.

use stowage_codec::CodecError;
use stowage_protocol::{ProtocolError, Status};
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors returned by the client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The server answered with a non-OK status.
    #[error("{status}: {message}")]
    Status {
        /// Status code of the response.
        status: Status,
        /// Diagnostic text sent with the status; often empty.
        message: String,
    },

    /// The connection is closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The server did not answer in time.
    #[error("request timed out")]
    Timeout,

    /// The server does not speak this client's protocol version.
    #[error("protocol version {local} not supported by server (supports {remote:?})")]
    VersionMismatch {
        /// Version this client speaks.
        local: u8,
        /// Versions the server advertised.
        remote: Vec<u8>,
    },

    /// An OK response carried a payload of the wrong shape.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Framing or payload error.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A response value failed to decode.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Socket I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Creates an unexpected-response error.
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::UnexpectedResponse(message.into())
    }

    /// Status code carried by the error, if the server sent one.
    pub fn status(&self) -> Option<Status> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true when the server reported the key or object missing.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(Status::NotFound)
    }

    /// Returns true if the operation may succeed on a new attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::ConnectionClosed | Self::Io(_) => true,
            Self::Status { status, .. } => *status == Status::InternalServerError,
            _ => false,
        }
    }
}
