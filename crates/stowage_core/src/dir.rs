//! Data directory management.
//!
//! ```text
//! <data_dir>/
//! ├─ LOCK              # Advisory lock for single-server access
//! ├─ registry.json     # Default registry file
//! ├─ users.json        # Default users file
//! └─ <db>/<coll>/      # Object collections
//!    └─ shard_{0..15}.bin
//! ```
//!
//! The LOCK file ensures only one server serves a data directory at a time.

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const REGISTRY_FILE: &str = "registry.json";
const USERS_FILE: &str = "users.json";

/// The server's data directory, held under an exclusive lock.
///
/// The lock is released when the value is dropped.
#[derive(Debug)]
pub struct DataDir {
    path: PathBuf,
    _lock_file: File,
}

impl DataDir {
    /// Opens the data directory, creating it if needed, and takes the lock.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DataDirLocked`] if another process holds the
    /// lock, or an I/O error if the directory cannot be created.
    pub fn open(path: &Path) -> CoreResult<Self> {
        fs::create_dir_all(path)?;
        if !path.is_dir() {
            return Err(CoreError::invalid_argument(format!(
                "data path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::DataDirLocked);
        }

        tracing::debug!(path = %path.display(), "locked data directory");
        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Root path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Default registry file.
    #[must_use]
    pub fn registry_path(&self) -> PathBuf {
        self.path.join(REGISTRY_FILE)
    }

    /// Default users file.
    #[must_use]
    pub fn users_path(&self) -> PathBuf {
        self.path.join(USERS_FILE)
    }

    /// Directory holding an object collection's shards.
    #[must_use]
    pub fn collection_dir(&self, database: &str, collection: &str) -> PathBuf {
        self.path.join(database).join(collection)
    }

    /// Removes a database's directory, if any.
    pub fn remove_database_dir(&self, database: &str) -> CoreResult<()> {
        let dir = self.path.join(database);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }
}
