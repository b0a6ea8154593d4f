//! Key-value engine.
//!
//! - [`KvEngine`] - 256 shards, each a locked map of key to [`KvEntry`]
//! - [`DerivedOp`] - numeric, string, list and map read-modify-write operations

mod derived;
mod engine;

pub use derived::{apply as apply_derived, BitOp, DerivedOp, DerivedOutcome, NumOp};
pub use engine::{KvEngine, KvEntry, KV_SHARD_COUNT};
