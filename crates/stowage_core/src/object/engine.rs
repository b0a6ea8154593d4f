//! Persistent object engine for one collection.

use crate::config::ObjectConfig;
use crate::error::{CoreError, CoreResult};
use crate::object::entry::ObjectMeta;
use crate::object::shard::{CompactionStats, ObjectShard};
use crate::shard::shard_of;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tokio::sync::watch;

/// Number of object shards per collection.
pub const OBJECT_SHARD_COUNT: usize = 16;

/// Sharded append-log object store.
///
/// Layout:
///
/// ```text
/// {data_dir}/{database}/{collection}/
/// ├─ shard_0.bin
/// ├─ ...
/// └─ shard_15.bin
/// ```
///
/// All methods perform blocking file I/O. Async callers should run them on
/// a blocking thread.
pub struct ObjectEngine {
    database: String,
    collection: String,
    dir: PathBuf,
    shards: Vec<ObjectShard>,
    stop: watch::Sender<bool>,
}

impl ObjectEngine {
    /// Opens (or creates) the collection's shard files and, if enabled,
    /// starts the background compactor on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if a shard file cannot be opened or is corrupt.
    pub fn open(database: &str, collection: &str, config: &ObjectConfig) -> CoreResult<Arc<Self>> {
        let dir = config.data_dir.join(database).join(collection);
        let shards = (0..OBJECT_SHARD_COUNT)
            .map(|i| ObjectShard::open(&shard_path(&dir, i)))
            .collect::<CoreResult<Vec<_>>>()?;

        let (stop, _) = watch::channel(false);
        let engine = Arc::new(Self {
            database: database.to_string(),
            collection: collection.to_string(),
            dir,
            shards,
            stop,
        });

        tracing::debug!(
            database,
            collection,
            objects = engine.count(),
            "opened object engine"
        );

        if config.enable_compaction {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(run_compactor(
                        Arc::downgrade(&engine),
                        engine.stop.subscribe(),
                        config.compaction_interval,
                        config.inter_shard_delay,
                    ));
                }
                Err(_) => tracing::warn!(database, collection, "no tokio runtime, compactor not started"),
            }
        }
        Ok(engine)
    }

    fn shard(&self, key: &str) -> &ObjectShard {
        &self.shards[shard_of(key, OBJECT_SHARD_COUNT)]
    }

    /// Directory holding the shard files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stores `data` under `key`, replacing any previous object.
    ///
    /// # Errors
    ///
    /// Rejects empty data, since a zero-length entry marks a tombstone.
    pub fn put(&self, key: &str, data: &[u8]) -> CoreResult<()> {
        self.shard(key).put(key, data)
    }

    /// Reads and verifies the object stored under `key`.
    ///
    /// # Errors
    ///
    /// [`CoreError::KeyNotFound`], or [`CoreError::KeyMismatch`] /
    /// [`CoreError::ChecksumMismatch`] when the file is corrupt.
    pub fn get(&self, key: &str) -> CoreResult<Vec<u8>> {
        self.shard(key).get(key)
    }

    /// Returns the index record for `key`.
    pub fn metadata(&self, key: &str) -> CoreResult<ObjectMeta> {
        self.shard(key)
            .meta(key)
            .ok_or_else(|| CoreError::key_not_found(key))
    }

    /// Removes `key` from the index.
    pub fn delete(&self, key: &str) -> CoreResult<()> {
        self.shard(key).delete(key)
    }

    /// Returns true if `key` is stored.
    pub fn exists(&self, key: &str) -> bool {
        self.shard(key).contains(key)
    }

    /// Sorted keys starting with `prefix`.
    pub fn list(&self, prefix: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .shards
            .iter()
            .flat_map(|s| s.keys_with_prefix(prefix))
            .collect();
        keys.sort_unstable();
        keys
    }

    /// Copies `src` to `dst`, replacing `dst`.
    pub fn copy(&self, src: &str, dst: &str) -> CoreResult<()> {
        let data = self.get(src)?;
        self.put(dst, &data)
    }

    /// Copies `src` to `dst`, then deletes `src`.
    pub fn move_object(&self, src: &str, dst: &str) -> CoreResult<()> {
        if src == dst {
            return self.metadata(src).map(|_| ());
        }
        self.copy(src, dst)?;
        self.delete(src)
    }

    /// Like [`ObjectEngine::move_object`], but fails if `dst` exists.
    pub fn rename(&self, src: &str, dst: &str) -> CoreResult<()> {
        if self.exists(dst) {
            return Err(CoreError::KeyExists {
                key: dst.to_string(),
            });
        }
        self.move_object(src, dst)
    }

    /// Number of stored objects.
    pub fn count(&self) -> usize {
        self.shards.iter().map(ObjectShard::count).sum()
    }

    /// Total data bytes of stored objects.
    pub fn size(&self) -> u64 {
        self.shards.iter().map(ObjectShard::data_size).sum()
    }

    /// Compacts one shard.
    pub fn compact_shard(&self, index: usize) -> CoreResult<CompactionStats> {
        let shard = self
            .shards
            .get(index)
            .ok_or_else(|| CoreError::invalid_argument(format!("no shard {index}")))?;
        let stats = shard.compact()?;
        tracing::info!(
            database = %self.database,
            collection = %self.collection,
            shard = index,
            live = stats.live_objects,
            reclaimed = stats.bytes_before.saturating_sub(stats.bytes_after),
            "compacted shard"
        );
        Ok(stats)
    }

    /// Indexes of shards with reclaimable space.
    pub fn dirty_shards(&self) -> Vec<usize> {
        self.shards
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_dirty())
            .map(|(i, _)| i)
            .collect()
    }

    /// Syncs every shard file.
    pub fn sync(&self) -> CoreResult<()> {
        self.shards.iter().try_for_each(ObjectShard::sync)
    }

    /// Stops the compactor.
    pub fn shutdown(&self) {
        self.stop.send_replace(true);
    }

    /// Stops the compactor and removes the collection's files.
    pub fn destroy(&self) -> CoreResult<()> {
        self.shutdown();
        if self.dir.exists() {
            std::fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ObjectEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectEngine")
            .field("database", &self.database)
            .field("collection", &self.collection)
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

fn shard_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("shard_{index}.bin"))
}

/// Returns false once the engine is gone or asked to stop.
async fn pause(stop: &mut watch::Receiver<bool>, duration: std::time::Duration) -> bool {
    tokio::select! {
        () = tokio::time::sleep(duration) => !*stop.borrow(),
        changed = stop.changed() => changed.is_ok() && !*stop.borrow(),
    }
}

async fn run_compactor(
    engine: Weak<ObjectEngine>,
    mut stop: watch::Receiver<bool>,
    interval: std::time::Duration,
    inter_shard_delay: std::time::Duration,
) {
    loop {
        if !pause(&mut stop, interval).await {
            return;
        }
        let dirty = match engine.upgrade() {
            Some(engine) => engine.dirty_shards(),
            None => return,
        };

        for (n, index) in dirty.into_iter().enumerate() {
            if n > 0 && !pause(&mut stop, inter_shard_delay).await {
                return;
            }
            let Some(engine) = engine.upgrade() else { return };
            let result = tokio::task::spawn_blocking(move || engine.compact_shard(index)).await;
            match result {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::error!(shard = index, error = %e, "compaction failed"),
                Err(e) => tracing::error!(shard = index, error = %e, "compaction task panicked"),
            }
        }
    }
}
