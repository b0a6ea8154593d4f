//! # Stowage Storage
//!
//! Append-only byte stores used by the object engine's shard logs.
//!
//! Backends are opaque: they know offsets and lengths, never entry formats.
//! The object engine owns the entry layout and the index built on top.
//!
//! ## Available Backends
//!
//! - [`FileBackend`] - one file on disk, with an atomic replace for compaction
//! - [`InMemoryBackend`] - a `Vec<u8>`, for tests
//!
//! ## Example
//!
//! ```rust
//! use stowage_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"entry").unwrap();
//! assert_eq!(backend.read_at(offset, 5).unwrap(), b"entry");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
