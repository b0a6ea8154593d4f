//! Error types for Stowage core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the engines, the registry and the user directory.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] stowage_storage::StorageError),

    /// Codex error.
    #[error("codec error: {0}")]
    Codec(#[from] stowage_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON (de)serialization of a registry or users file failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Key or object does not exist.
    #[error("key not found: {key}")]
    KeyNotFound {
        /// The missing key.
        key: String,
    },

    /// Target key already exists.
    #[error("key already exists: {key}")]
    KeyExists {
        /// The existing key.
        key: String,
    },

    /// The entry at the indexed offset belongs to another key.
    #[error("key mismatch at offset {offset}: expected {expected}")]
    KeyMismatch {
        /// Key the index pointed at.
        expected: String,
        /// Offset of the entry.
        offset: u64,
    },

    /// Stored data does not match its checksum.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Expected checksum.
        expected: u32,
        /// Actual checksum.
        actual: u32,
    },

    /// A shard file is unreadable.
    #[error("corruption: {message}")]
    Corruption {
        /// Description of the corruption.
        message: String,
    },

    /// Database does not exist.
    #[error("database not found: {name}")]
    DatabaseNotFound {
        /// Database name.
        name: String,
    },

    /// Database already exists.
    #[error("database already exists: {name}")]
    DatabaseAlreadyExists {
        /// Database name.
        name: String,
    },

    /// Collection does not exist.
    #[error("collection not found: {database}.{name}")]
    CollectionNotFound {
        /// Database name.
        database: String,
        /// Collection name.
        name: String,
    },

    /// Collection already exists.
    #[error("collection already exists: {database}.{name}")]
    CollectionAlreadyExists {
        /// Database name.
        database: String,
        /// Collection name.
        name: String,
    },

    /// A stored value has the wrong type for the operation.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Expected codex type.
        expected: &'static str,
        /// Actual codex type.
        found: &'static str,
    },

    /// An argument is outside the accepted domain.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// Another process holds the data directory.
    #[error("data directory locked: another process has exclusive access")]
    DataDirLocked,

    /// The engine has been shut down.
    #[error("engine is closed")]
    EngineClosed,

    /// A background task was requested outside a tokio runtime.
    #[error("no tokio runtime available")]
    NoRuntime,
}

impl CoreError {
    /// Creates a key not found error.
    pub fn key_not_found(key: impl Into<String>) -> Self {
        Self::KeyNotFound { key: key.into() }
    }

    /// Creates a corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a database not found error.
    pub fn database_not_found(name: impl Into<String>) -> Self {
        Self::DatabaseNotFound { name: name.into() }
    }

    /// Creates a collection not found error.
    pub fn collection_not_found(database: impl Into<String>, name: impl Into<String>) -> Self {
        Self::CollectionNotFound {
            database: database.into(),
            name: name.into(),
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(expected: &'static str, found: &'static str) -> Self {
        Self::TypeMismatch { expected, found }
    }

    /// Returns true if the error was caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::KeyNotFound { .. }
                | Self::KeyExists { .. }
                | Self::DatabaseNotFound { .. }
                | Self::DatabaseAlreadyExists { .. }
                | Self::CollectionNotFound { .. }
                | Self::CollectionAlreadyExists { .. }
                | Self::TypeMismatch { .. }
                | Self::InvalidArgument { .. }
        )
    }

    /// Returns true if stored data failed verification.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::KeyMismatch { .. } | Self::ChecksumMismatch { .. } | Self::Corruption { .. }
        )
    }
}
