//! Key to shard assignment.
//!
//! `shard = FNV1a_32(key) mod count`. The object engine derives file names
//! from the shard index, so this mapping must never change.

const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

/// 32-bit FNV-1a hash.
#[must_use]
pub fn fnv1a32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &b| {
        (hash ^ u32::from(b)).wrapping_mul(FNV_PRIME)
    })
}

/// Returns the shard index for `key` among `count` shards.
#[must_use]
pub fn shard_of(key: &str, count: usize) -> usize {
    fnv1a32(key.as_bytes()) as usize % count
}
