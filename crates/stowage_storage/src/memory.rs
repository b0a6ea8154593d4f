//! In-memory storage backend for tests.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};

/// A storage backend over a plain byte vector.
///
/// Used to exercise log scanning and recovery without touching disk.
///
/// ```rust
/// use stowage_storage::{InMemoryBackend, StorageBackend};
///
/// let backend = InMemoryBackend::with_data(b"preloaded".to_vec());
/// assert_eq!(backend.size().unwrap(), 9);
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    data: Vec<u8>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend holding `data`, e.g. a log captured mid-write.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Returns the stored bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let size = self.data.len() as u64;
        let end = offset.saturating_add(len as u64);
        if end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        let start = offset as usize;
        Ok(self.data[start..start + len].to_vec())
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let offset = self.data.len() as u64;
        self.data.extend_from_slice(data);
        Ok(offset)
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let size = self.data.len() as u64;
        if new_size > size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size,
            });
        }
        self.data.truncate(new_size as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_read() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"hello").unwrap();
        let offset = backend.append(b"world").unwrap();

        assert_eq!(offset, 5);
        assert_eq!(backend.read_at(offset, 5).unwrap(), b"world");
    }

    #[test]
    fn read_extending_past_end_fails() {
        let backend = InMemoryBackend::with_data(b"short".to_vec());
        assert!(matches!(
            backend.read_at(3, 10),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn truncate_partial() {
        let mut backend = InMemoryBackend::with_data(b"complete+partial".to_vec());
        backend.truncate(8).unwrap();
        assert_eq!(backend.data(), b"complete");
        assert!(backend.truncate(100).is_err());
    }
}
