//! Object engine.
//!
//! Each collection owns [`OBJECT_SHARD_COUNT`] append-only shard files and an
//! in-memory index per shard. Reads verify the stored key and a CRC32 of the
//! data. Deletes only touch the index; a background compactor rewrites
//! shards that carry dead entries.

mod engine;
mod entry;
mod shard;

pub use engine::{ObjectEngine, OBJECT_SHARD_COUNT};
pub use entry::ObjectMeta;
pub use shard::CompactionStats;
