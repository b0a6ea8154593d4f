//! Error types for the server.

use stowage_core::CoreError;
use stowage_protocol::{ProtocolError, Status};
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors raised while handling a command or running the server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The command payload is malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Login credentials were rejected.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// No active, verified user on the connection.
    #[error("unauthorized")]
    Unauthorized,

    /// The user lacks the required permission.
    #[error("forbidden")]
    Forbidden,

    /// The collection's engine does not support the command.
    #[error("command not allowed on {0} collection")]
    CommandNotAllowed(&'static str),

    /// No handler is registered for the command id.
    #[error("command not found: {0}")]
    CommandNotFound(u16),

    /// Key or object missing.
    #[error("not found")]
    NotFound,

    /// Engine, registry or storage error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Payload decoding error.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Creates a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Status code reported to the client.
    pub fn status(&self) -> Status {
        match self {
            Self::BadRequest(_) => Status::BadRequest,
            Self::InvalidCredentials => Status::InvalidCredentials,
            Self::Unauthorized => Status::Unauthorized,
            Self::Forbidden => Status::Forbidden,
            Self::CommandNotAllowed(_) => Status::CommandNotAllowed,
            Self::CommandNotFound(_) => Status::CommandNotFound,
            Self::NotFound => Status::NotFound,
            Self::Core(err) => core_status(err),
            Self::Protocol(err) if err.is_io() => Status::InternalServerError,
            Self::Protocol(_) => Status::BadRequest,
            Self::Config(_) | Self::Internal(_) | Self::Io(_) => Status::InternalServerError,
        }
    }

    /// Returns true if the client caused the error.
    pub fn is_client_error(&self) -> bool {
        !self.is_server_error()
    }

    /// Returns true if the server failed.
    pub fn is_server_error(&self) -> bool {
        self.status() == Status::InternalServerError
    }

    /// Text sent back with the status; empty for server errors.
    pub fn client_message(&self) -> String {
        match self {
            Self::BadRequest(message) => message.clone(),
            _ if self.is_server_error() => String::new(),
            _ => self.to_string(),
        }
    }
}

fn core_status(err: &CoreError) -> Status {
    match err {
        CoreError::KeyNotFound { .. } => Status::NotFound,
        CoreError::KeyExists { .. }
        | CoreError::DatabaseAlreadyExists { .. }
        | CoreError::CollectionAlreadyExists { .. } => Status::AlreadyExists,
        CoreError::DatabaseNotFound { .. } => Status::DatabaseNotFound,
        CoreError::CollectionNotFound { .. } => Status::CollectionNotFound,
        CoreError::TypeMismatch { .. } | CoreError::InvalidArgument { .. } => Status::BadRequest,
        _ => Status::InternalServerError,
    }
}

impl From<&ServerError> for Status {
    fn from(err: &ServerError) -> Self {
        err.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_keep_their_kind() {
        let cases = [
            (CoreError::key_not_found("k"), Status::NotFound),
            (CoreError::database_not_found("d"), Status::DatabaseNotFound),
            (CoreError::collection_not_found("d", "c"), Status::CollectionNotFound),
            (CoreError::type_mismatch("List", "String"), Status::BadRequest),
            (CoreError::DatabaseAlreadyExists { name: "d".into() }, Status::AlreadyExists),
            (CoreError::corruption("bad"), Status::InternalServerError),
        ];
        for (err, status) in cases {
            assert_eq!(ServerError::from(err).status(), status);
        }
    }

    #[test]
    fn server_errors_hide_details() {
        let err = ServerError::Internal("/var/lib/stowage/sys/files".into());
        assert!(err.is_server_error());
        assert!(err.client_message().is_empty());

        let err = ServerError::bad_request("invalid TTL");
        assert!(err.is_client_error());
        assert_eq!(err.client_message(), "invalid TTL");
    }

    #[test]
    fn protocol_errors() {
        assert_eq!(
            ServerError::from(ProtocolError::PayloadTooShort).status(),
            Status::BadRequest
        );
    }
}
