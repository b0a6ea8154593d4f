//! Sharded key-value engine with TTL.

use crate::clock::now_nanos;
use crate::config::KvConfig;
use crate::error::CoreResult;
use crate::kv::derived::{self, DerivedOp, DerivedOutcome};
use crate::shard::shard_of;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use stowage_codec::Value;
use tokio::sync::watch;

/// Number of KV shards.
pub const KV_SHARD_COUNT: usize = 256;

/// A stored value and its absolute deadline.
#[derive(Debug, Clone, PartialEq)]
pub struct KvEntry {
    /// Stored value.
    pub value: Value,
    /// Unix-nanosecond deadline; 0 means never.
    pub expires_at: i64,
}

impl KvEntry {
    fn is_live(&self, now: i64) -> bool {
        self.expires_at == 0 || now <= self.expires_at
    }

    fn is_expired(&self, now: i64) -> bool {
        self.expires_at > 0 && self.expires_at <= now
    }
}

type Shard = RwLock<HashMap<String, KvEntry>>;

/// An in-memory key-value store split into [`KV_SHARD_COUNT`] shards.
///
/// Every shard has its own reader-writer lock, so operations on one shard
/// are linearizable and operations on different shards are independent.
/// Batch operations take each touched shard's lock once.
///
/// Expired entries are invisible to readers immediately; the background
/// cleaner removes them from memory.
pub struct KvEngine {
    shards: Box<[Shard]>,
    stop: watch::Sender<bool>,
}

impl KvEngine {
    /// Creates an engine and, unless TTL is disabled, starts its cleaner on
    /// the current tokio runtime.
    pub fn new(config: KvConfig) -> Arc<Self> {
        let shards = (0..KV_SHARD_COUNT)
            .map(|_| RwLock::new(HashMap::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let (stop, _) = watch::channel(false);
        let engine = Arc::new(Self { shards, stop });

        if !config.disable_ttl {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let weak = Arc::downgrade(&engine);
                    let stop = engine.stop.subscribe();
                    handle.spawn(run_cleaner(weak, stop, config.cleanup_interval));
                }
                Err(_) => tracing::warn!("no tokio runtime, TTL cleaner not started"),
            }
        }
        engine
    }

    fn shard(&self, key: &str) -> &Shard {
        &self.shards[shard_of(key, KV_SHARD_COUNT)]
    }

    fn group_by_shard<K, T>(
        &self,
        items: impl IntoIterator<Item = (K, T)>,
    ) -> HashMap<usize, Vec<(K, T)>>
    where
        K: AsRef<str>,
    {
        let mut groups: HashMap<usize, Vec<(K, T)>> = HashMap::new();
        for (key, item) in items {
            groups
                .entry(shard_of(key.as_ref(), KV_SHARD_COUNT))
                .or_default()
                .push((key, item));
        }
        groups
    }

    /// Stops the background cleaner.
    pub fn shutdown(&self) {
        self.stop.send_replace(true);
    }

    /// Writes `value` under `key`.
    pub fn set(&self, key: &str, value: Value, expires_at: i64) {
        self.shard(key)
            .write()
            .insert(key.to_string(), KvEntry { value, expires_at });
    }

    /// Writes every entry, locking each shard once.
    ///
    /// Not atomic across shards.
    pub fn set_multiple(&self, entries: BTreeMap<String, Value>, expires_at: i64) {
        for (idx, items) in self.group_by_shard(entries) {
            let mut shard = self.shards[idx].write();
            for (key, value) in items {
                shard.insert(key, KvEntry { value, expires_at });
            }
        }
    }

    /// Writes only if a live entry exists. Returns whether it wrote.
    pub fn set_if_exists(&self, key: &str, value: Value, expires_at: i64) -> bool {
        let mut shard = self.shard(key).write();
        match shard.get_mut(key) {
            Some(entry) if entry.is_live(now_nanos()) => {
                *entry = KvEntry { value, expires_at };
                true
            }
            _ => false,
        }
    }

    /// Writes only if no live entry exists. Returns whether it wrote.
    pub fn set_if_not_exists(&self, key: &str, value: Value, expires_at: i64) -> bool {
        let mut shard = self.shard(key).write();
        if shard.get(key).is_some_and(|e| e.is_live(now_nanos())) {
            return false;
        }
        shard.insert(key.to_string(), KvEntry { value, expires_at });
        true
    }

    /// Returns the live value for `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.get_entry(key).map(|e| e.value)
    }

    /// Returns the live entry for `key`.
    pub fn get_entry(&self, key: &str) -> Option<KvEntry> {
        let shard = self.shard(key).read();
        shard
            .get(key)
            .filter(|e| e.is_live(now_nanos()))
            .cloned()
    }

    /// Returns the deadline of a live entry; 0 means it never expires.
    pub fn get_ttl(&self, key: &str) -> Option<i64> {
        self.get_entry(key).map(|e| e.expires_at)
    }

    /// Looks up several keys, locking each shard once.
    ///
    /// Every requested key is present in the result; missing or expired keys
    /// map to [`Value::Empty`].
    pub fn get_multiple(&self, keys: &[String]) -> BTreeMap<String, Value> {
        let now = now_nanos();
        let mut out = BTreeMap::new();
        for (idx, items) in self.group_by_shard(keys.iter().map(|k| (k.as_str(), ()))) {
            let shard = self.shards[idx].read();
            for (key, ()) in items {
                let value = shard
                    .get(key)
                    .filter(|e| e.is_live(now))
                    .map(|e| e.value.clone())
                    .unwrap_or_default();
                out.insert(key.to_string(), value);
            }
        }
        out
    }

    /// Deadlines of the requested keys that are live.
    pub fn get_multiple_ttl(&self, keys: &[String]) -> BTreeMap<String, i64> {
        let now = now_nanos();
        let mut out = BTreeMap::new();
        for (idx, items) in self.group_by_shard(keys.iter().map(|k| (k.as_str(), ()))) {
            let shard = self.shards[idx].read();
            for (key, ()) in items {
                if let Some(entry) = shard.get(key).filter(|e| e.is_live(now)) {
                    out.insert(key.to_string(), entry.expires_at);
                }
            }
        }
        out
    }

    /// Snapshot of every live entry's value.
    pub fn get_all(&self) -> BTreeMap<String, Value> {
        self.collect_live(|e| e.value.clone())
    }

    /// Snapshot of every live entry's deadline.
    pub fn get_all_ttl(&self) -> BTreeMap<String, i64> {
        self.collect_live(|e| e.expires_at)
    }

    fn collect_live<T>(&self, f: impl Fn(&KvEntry) -> T) -> BTreeMap<String, T> {
        let now = now_nanos();
        let mut out = BTreeMap::new();
        for shard in self.shards.iter() {
            let shard = shard.read();
            out.extend(
                shard
                    .iter()
                    .filter(|(_, e)| e.is_live(now))
                    .map(|(k, e)| (k.clone(), f(e))),
            );
        }
        out
    }

    /// Returns true if `key` holds a live entry.
    pub fn exists(&self, key: &str) -> bool {
        self.shard(key)
            .read()
            .get(key)
            .is_some_and(|e| e.is_live(now_nanos()))
    }

    /// Removes `key`. Returns whether an entry was removed.
    pub fn delete(&self, key: &str) -> bool {
        self.shard(key).write().remove(key).is_some()
    }

    /// Removes several keys, locking each shard once.
    pub fn delete_multiple(&self, keys: &[String]) {
        for (idx, items) in self.group_by_shard(keys.iter().map(|k| (k.as_str(), ()))) {
            let mut shard = self.shards[idx].write();
            for (key, ()) in items {
                shard.remove(key);
            }
        }
    }

    /// Drops every entry. Blocks each shard in turn.
    pub fn clear(&self) {
        for shard in self.shards.iter() {
            shard.write().clear();
        }
    }

    /// Snapshot of every stored key, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        let now = now_nanos();
        let mut keys = Vec::new();
        for shard in self.shards.iter() {
            let shard = shard.read();
            keys.extend(
                shard
                    .iter()
                    .filter(|(_, e)| e.is_live(now))
                    .map(|(k, _)| k.clone()),
            );
        }
        keys
    }

    /// Number of stored entries, possibly including expired ones not yet
    /// purged.
    pub fn count(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    /// Serialized size of every stored key and value, with the same caveat
    /// as [`KvEngine::count`].
    pub fn size(&self) -> u64 {
        self.shards
            .iter()
            .map(|s| {
                s.read()
                    .iter()
                    .map(|(k, e)| (k.len() + e.value.encoded_size()) as u64)
                    .sum::<u64>()
            })
            .sum()
    }

    /// Read-modify-write of one key under its shard's write lock.
    ///
    /// `f` receives the live value, if any, and returns the value to store
    /// (or `None` to leave the entry untouched) plus an output. The entry's
    /// deadline is kept.
    pub fn modify<T>(
        &self,
        key: &str,
        f: impl FnOnce(Option<&Value>) -> CoreResult<(Option<Value>, T)>,
    ) -> CoreResult<T> {
        let mut shard = self.shard(key).write();
        let now = now_nanos();
        let live = shard.get(key).filter(|e| e.is_live(now));
        let expires_at = live.map_or(0, |e| e.expires_at);
        let (next, out) = f(live.map(|e| &e.value))?;
        if let Some(value) = next {
            shard.insert(key.to_string(), KvEntry { value, expires_at });
        }
        Ok(out)
    }

    /// Applies a derived operation to `key`.
    ///
    /// Read-only operations borrow the value under the shard read lock.
    pub fn apply(&self, key: &str, op: DerivedOp) -> CoreResult<DerivedOutcome> {
        if op.is_read_only() {
            let shard = self.shard(key).read();
            let now = now_nanos();
            let live = shard.get(key).filter(|e| e.is_live(now));
            return derived::apply(op, live.map(|e| &e.value)).map(|(_, outcome)| outcome);
        }
        self.modify(key, |current| derived::apply(op, current))
    }

    /// Removes expired entries from every shard.
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&self) -> usize {
        let now = now_nanos();
        let mut removed = 0;
        for shard in self.shards.iter() {
            let mut shard = shard.write();
            let before = shard.len();
            shard.retain(|_, e| !e.is_expired(now));
            removed += before - shard.len();
        }
        removed
    }
}

impl std::fmt::Debug for KvEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvEngine")
            .field("shards", &self.shards.len())
            .finish_non_exhaustive()
    }
}

async fn run_cleaner(engine: Weak<KvEngine>, mut stop: watch::Receiver<bool>, every: std::time::Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(engine) = engine.upgrade() else { break };
                let removed = engine.purge_expired();
                if removed > 0 {
                    tracing::trace!(removed, "purged expired entries");
                }
            }
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }
}
