//! On-disk entry layout for object shards.
//!
//! ```text
//! u32 keyLen | key | u32 dataLen | data      (little-endian)
//! ```
//!
//! An entry with `dataLen == 0` is a tombstone. A scan stops at the first
//! entry that does not fit in the file; everything before it is valid.

use crate::clock::now_millis;
use crate::error::{CoreError, CoreResult};
use std::collections::HashMap;
use stowage_storage::StorageBackend;

const LEN_SIZE: u64 = 4;

/// Index record for one stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectMeta {
    /// File offset of the entry.
    pub offset: u64,
    /// Data length in bytes.
    pub size: u64,
    /// CRC32 (IEEE) of the data.
    pub checksum: u32,
    /// Unix milliseconds of the first write.
    pub created_at: i64,
    /// Unix milliseconds of the latest write.
    pub modified_at: i64,
}

/// One decoded entry.
#[derive(Debug)]
pub(crate) struct RawEntry {
    pub key: Vec<u8>,
    pub data: Vec<u8>,
}

impl RawEntry {
    pub fn encoded_len(&self) -> u64 {
        2 * LEN_SIZE + self.key.len() as u64 + self.data.len() as u64
    }
}

/// Result of scanning a shard file.
#[derive(Debug, Default)]
pub(crate) struct ScanResult {
    pub index: HashMap<String, ObjectMeta>,
    /// Bytes covered by complete entries.
    pub valid_len: u64,
    /// Tombstones or superseded entries were seen.
    pub has_garbage: bool,
}

/// Encodes an entry.
pub(crate) fn encode_entry(key: &str, data: &[u8]) -> CoreResult<Vec<u8>> {
    let key_len = u32::try_from(key.len())
        .map_err(|_| CoreError::invalid_argument("key too long"))?;
    let data_len = u32::try_from(data.len())
        .map_err(|_| CoreError::invalid_argument("object too large"))?;

    let mut buf = Vec::with_capacity(8 + key.len() + data.len());
    buf.extend_from_slice(&key_len.to_le_bytes());
    buf.extend_from_slice(key.as_bytes());
    buf.extend_from_slice(&data_len.to_le_bytes());
    buf.extend_from_slice(data);
    Ok(buf)
}

fn read_len(backend: &dyn StorageBackend, offset: u64) -> CoreResult<u32> {
    let b = backend.read_at(offset, LEN_SIZE as usize)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Reads the entry at `offset`, or `None` if it runs past the end.
pub(crate) fn read_entry(backend: &dyn StorageBackend, offset: u64) -> CoreResult<Option<RawEntry>> {
    let size = backend.size()?;
    if offset + LEN_SIZE > size {
        return Ok(None);
    }
    let key_len = u64::from(read_len(backend, offset)?);
    let key_at = offset + LEN_SIZE;
    if key_at + key_len + LEN_SIZE > size {
        return Ok(None);
    }
    let key = backend.read_at(key_at, key_len as usize)?;
    let data_len_at = key_at + key_len;
    let data_len = u64::from(read_len(backend, data_len_at)?);
    let data_at = data_len_at + LEN_SIZE;
    if data_at + data_len > size {
        return Ok(None);
    }
    let data = backend.read_at(data_at, data_len as usize)?;
    Ok(Some(RawEntry { key, data }))
}

/// Rebuilds the index from a shard file. The newest entry per key wins.
pub(crate) fn scan(backend: &dyn StorageBackend) -> CoreResult<ScanResult> {
    let now = now_millis();
    let mut result = ScanResult::default();
    let mut offset = 0u64;

    while let Some(entry) = read_entry(backend, offset)? {
        let key = String::from_utf8(entry.key.clone())
            .map_err(|_| CoreError::corruption(format!("non UTF-8 key at offset {offset}")))?;

        if entry.data.is_empty() {
            result.index.remove(&key);
            result.has_garbage = true;
        } else {
            let meta = ObjectMeta {
                offset,
                size: entry.data.len() as u64,
                checksum: crc32fast::hash(&entry.data),
                created_at: now,
                modified_at: now,
            };
            if result.index.insert(key, meta).is_some() {
                result.has_garbage = true;
            }
        }
        offset += entry.encoded_len();
    }

    result.valid_len = offset;
    Ok(result)
}
