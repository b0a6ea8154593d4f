//! One object shard: an append-only file plus its in-memory index.

use crate::clock::now_millis;
use crate::error::{CoreError, CoreResult};
use crate::object::entry::{encode_entry, read_entry, scan, ObjectMeta};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use stowage_storage::{FileBackend, StorageBackend};

/// Outcome of compacting one shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    /// Live objects written to the new file.
    pub live_objects: usize,
    /// File size before compaction.
    pub bytes_before: u64,
    /// File size after compaction.
    pub bytes_after: u64,
}

struct ShardState {
    backend: FileBackend,
    index: HashMap<String, ObjectMeta>,
    dirty: bool,
}

pub(crate) struct ObjectShard {
    path: PathBuf,
    state: RwLock<ShardState>,
}

impl ObjectShard {
    /// Opens the shard file, rebuilding the index and dropping a partial
    /// trailing entry.
    pub fn open(path: &Path) -> CoreResult<Self> {
        let mut backend = FileBackend::open_with_create_dirs(path)?;
        let scanned = scan(&backend)?;
        let size = backend.size()?;
        if scanned.valid_len < size {
            tracing::warn!(
                path = %path.display(),
                valid = scanned.valid_len,
                size,
                "truncating partial entry at end of shard"
            );
            backend.truncate(scanned.valid_len)?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            state: RwLock::new(ShardState {
                backend,
                index: scanned.index,
                dirty: scanned.has_garbage,
            }),
        })
    }

    pub fn put(&self, key: &str, data: &[u8]) -> CoreResult<()> {
        if data.is_empty() {
            return Err(CoreError::invalid_argument("object data must not be empty"));
        }
        let entry = encode_entry(key, data)?;
        let checksum = crc32fast::hash(data);

        let mut state = self.state.write();
        let offset = state.backend.append(&entry)?;
        let now = now_millis();
        let created_at = state.index.get(key).map_or(now, |m| m.created_at);
        let previous = state.index.insert(
            key.to_string(),
            ObjectMeta {
                offset,
                size: data.len() as u64,
                checksum,
                created_at,
                modified_at: now,
            },
        );
        if previous.is_some() {
            state.dirty = true;
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> CoreResult<Vec<u8>> {
        let state = self.state.read();
        let meta = *state
            .index
            .get(key)
            .ok_or_else(|| CoreError::key_not_found(key))?;
        read_verified(&state.backend, key, &meta)
    }

    pub fn meta(&self, key: &str) -> Option<ObjectMeta> {
        self.state.read().index.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.read().index.contains_key(key)
    }

    /// Removes `key` from the index; its bytes stay on disk until compaction.
    pub fn delete(&self, key: &str) -> CoreResult<()> {
        let mut state = self.state.write();
        if state.index.remove(key).is_none() {
            return Err(CoreError::key_not_found(key));
        }
        state.dirty = true;
        Ok(())
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.state
            .read()
            .index
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.state.read().index.len()
    }

    pub fn data_size(&self) -> u64 {
        self.state.read().index.values().map(|m| m.size).sum()
    }

    pub fn is_dirty(&self) -> bool {
        self.state.read().dirty
    }

    pub fn sync(&self) -> CoreResult<()> {
        self.state.write().backend.sync()?;
        Ok(())
    }

    /// Rewrites the file with live entries only.
    ///
    /// Holds the write lock throughout, so readers wait for it.
    pub fn compact(&self) -> CoreResult<CompactionStats> {
        let mut state = self.state.write();
        let bytes_before = state.backend.size()?;

        let tmp_path = self.path.with_extension("bin.tmp");
        let mut tmp = FileBackend::create_empty(&tmp_path)?;

        let mut live: Vec<(&String, &ObjectMeta)> = state.index.iter().collect();
        live.sort_by_key(|(_, meta)| meta.offset);

        let mut rebuilt = HashMap::with_capacity(live.len());
        for (key, meta) in live {
            let data = read_verified(&state.backend, key, meta)?;
            let offset = tmp.append(&encode_entry(key, &data)?)?;
            rebuilt.insert(key.clone(), ObjectMeta { offset, ..*meta });
        }

        let bytes_after = tmp.size()?;
        state.backend = tmp.persist_as(&self.path)?;
        let live_objects = rebuilt.len();
        state.index = rebuilt;
        state.dirty = false;

        Ok(CompactionStats {
            live_objects,
            bytes_before,
            bytes_after,
        })
    }
}

fn read_verified(backend: &FileBackend, key: &str, meta: &ObjectMeta) -> CoreResult<Vec<u8>> {
    let entry = read_entry(backend, meta.offset)?
        .ok_or_else(|| CoreError::corruption(format!("entry at offset {} is truncated", meta.offset)))?;
    if entry.key != key.as_bytes() {
        return Err(CoreError::KeyMismatch {
            expected: key.to_string(),
            offset: meta.offset,
        });
    }
    let actual = crc32fast::hash(&entry.data);
    if actual != meta.checksum {
        return Err(CoreError::ChecksumMismatch {
            expected: meta.checksum,
            actual,
        });
    }
    Ok(entry.data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::{Seek, SeekFrom, Write};
    use tempfile::tempdir;

    #[test]
    fn put_get_delete() {
        let dir = tempdir().unwrap();
        let shard = ObjectShard::open(&dir.path().join("shard_0.bin")).unwrap();
        shard.put("k1", b"hello").unwrap();
        assert_eq!(shard.get("k1").unwrap(), b"hello");
        assert_eq!(shard.meta("k1").unwrap().checksum, 0x3610_A686);

        shard.delete("k1").unwrap();
        assert!(shard.is_dirty());
        assert!(matches!(shard.get("k1"), Err(CoreError::KeyNotFound { .. })));
        assert!(matches!(shard.delete("k1"), Err(CoreError::KeyNotFound { .. })));
    }

    #[test]
    fn empty_data_rejected() {
        let dir = tempdir().unwrap();
        let shard = ObjectShard::open(&dir.path().join("shard_0.bin")).unwrap();
        assert!(matches!(shard.put("k", b""), Err(CoreError::InvalidArgument { .. })));
    }

    #[test]
    fn overwrite_keeps_created_at() {
        let dir = tempdir().unwrap();
        let shard = ObjectShard::open(&dir.path().join("shard_0.bin")).unwrap();
        shard.put("k", b"one").unwrap();
        let first = shard.meta("k").unwrap();
        shard.put("k", b"two!").unwrap();
        let second = shard.meta("k").unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.size, 4);
        assert!(second.offset > first.offset);
    }

    #[test]
    fn flipped_byte_fails_checksum() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shard_0.bin");
        let shard = ObjectShard::open(&path).unwrap();
        shard.put("k1", b"hello").unwrap();

        // data starts after keyLen(4) + "k1"(2) + dataLen(4)
        let mut file = OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(10)).unwrap();
        file.write_all(b"j").unwrap();
        file.sync_all().unwrap();

        assert!(matches!(
            shard.get("k1"),
            Err(CoreError::ChecksumMismatch { expected: 0x3610_A686, .. })
        ));
    }

    #[test]
    fn reopen_rebuilds_index() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shard_0.bin");
        {
            let shard = ObjectShard::open(&path).unwrap();
            shard.put("a", b"1").unwrap();
            shard.put("b", b"2").unwrap();
            shard.sync().unwrap();
        }
        let shard = ObjectShard::open(&path).unwrap();
        assert_eq!(shard.get("b").unwrap(), b"2");
        assert_eq!(shard.count(), 2);
        assert!(!shard.is_dirty());
    }

    #[test]
    fn partial_tail_truncated_on_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shard_0.bin");
        {
            let shard = ObjectShard::open(&path).unwrap();
            shard.put("a", b"1").unwrap();
            shard.sync().unwrap();
        }
        let good = std::fs::metadata(&path).unwrap().len();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[9, 0, 0, 0, b'x']).unwrap();
        drop(file);

        let shard = ObjectShard::open(&path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), good);
        shard.put("c", b"3").unwrap();
        assert_eq!(shard.get("c").unwrap(), b"3");
    }

    #[test]
    fn compaction_drops_garbage_and_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shard_0.bin");
        let shard = ObjectShard::open(&path).unwrap();
        shard.put("keep", b"data").unwrap();
        shard.put("gone", b"data").unwrap();
        shard.put("keep", b"newer").unwrap();
        shard.delete("gone").unwrap();

        let first = shard.compact().unwrap();
        assert_eq!(first.live_objects, 1);
        assert!(first.bytes_after < first.bytes_before);
        assert!(!shard.is_dirty());
        assert_eq!(shard.get("keep").unwrap(), b"newer");

        let second = shard.compact().unwrap();
        assert_eq!(second.bytes_after, first.bytes_after);
        assert_eq!(shard.get("keep").unwrap(), b"newer");
        assert!(!path.with_extension("bin.tmp").exists());

        drop(shard);
        let reopened = ObjectShard::open(&path).unwrap();
        assert_eq!(reopened.keys_with_prefix(""), vec!["keep".to_string()]);
        assert!(!reopened.is_dirty());
    }
}
