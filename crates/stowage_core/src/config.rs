//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a key-value engine.
#[derive(Debug, Clone)]
pub struct KvConfig {
    /// How often expired entries are purged.
    pub cleanup_interval: Duration,
    /// Disables the background cleaner.
    pub disable_ttl: bool,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: Duration::from_secs(1),
            disable_ttl: false,
        }
    }
}

impl KvConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cleaner interval.
    #[must_use]
    pub const fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Sets whether the cleaner is disabled.
    #[must_use]
    pub const fn disable_ttl(mut self, value: bool) -> Self {
        self.disable_ttl = value;
        self
    }
}

/// Configuration for an object engine.
#[derive(Debug, Clone)]
pub struct ObjectConfig {
    /// Root data directory; shards live under `{data_dir}/{db}/{coll}/`.
    pub data_dir: PathBuf,
    /// Pause between compaction passes.
    pub compaction_interval: Duration,
    /// Pause between two shard compactions in one pass.
    pub inter_shard_delay: Duration,
    /// Whether the background compactor runs.
    pub enable_compaction: bool,
}

impl Default for ObjectConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            compaction_interval: Duration::from_secs(5 * 60),
            inter_shard_delay: Duration::from_secs(10),
            enable_compaction: true,
        }
    }
}

impl ObjectConfig {
    /// Creates a configuration rooted at `data_dir`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Sets the pause between compaction passes.
    #[must_use]
    pub const fn compaction_interval(mut self, interval: Duration) -> Self {
        self.compaction_interval = interval;
        self
    }

    /// Sets the pause between shard compactions.
    #[must_use]
    pub const fn inter_shard_delay(mut self, delay: Duration) -> Self {
        self.inter_shard_delay = delay;
        self
    }

    /// Sets whether the background compactor runs.
    #[must_use]
    pub const fn enable_compaction(mut self, value: bool) -> Self {
        self.enable_compaction = value;
        self
    }
}

/// How a queue group member is chosen for each publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueBalancing {
    /// One process-wide counter shared by every group.
    #[default]
    Global,
    /// One counter per queue group name.
    PerGroup,
}

impl std::str::FromStr for QueueBalancing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "global" => Ok(Self::Global),
            "per-group" | "per_group" | "pergroup" => Ok(Self::PerGroup),
            other => Err(format!("unknown queue balancing mode: {other}")),
        }
    }
}

/// Configuration for a broker engine.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Capacity of each subscriber's delivery channel.
    pub channel_capacity: usize,
    /// Messages per delivered batch.
    pub batch_size: usize,
    /// Longest a partial batch waits before it is flushed.
    pub batch_timeout: Duration,
    /// Queue group member selection.
    pub queue_balancing: QueueBalancing,
    /// How often subscribers of dead connections are swept.
    pub cleanup_interval: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            batch_size: 10,
            batch_timeout: Duration::from_millis(100),
            queue_balancing: QueueBalancing::Global,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

impl BrokerConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the delivery channel capacity.
    #[must_use]
    pub const fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Sets the batch size.
    #[must_use]
    pub const fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets the batch timeout.
    #[must_use]
    pub const fn batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = timeout;
        self
    }

    /// Sets the queue balancing mode.
    #[must_use]
    pub const fn queue_balancing(mut self, mode: QueueBalancing) -> Self {
        self.queue_balancing = mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let kv = KvConfig::default();
        assert_eq!(kv.cleanup_interval, Duration::from_secs(1));
        assert!(!kv.disable_ttl);

        let obj = ObjectConfig::default();
        assert_eq!(obj.compaction_interval, Duration::from_secs(300));
        assert_eq!(obj.inter_shard_delay, Duration::from_secs(10));

        let broker = BrokerConfig::default();
        assert_eq!(broker.channel_capacity, 1024);
        assert_eq!(broker.batch_size, 10);
        assert_eq!(broker.batch_timeout, Duration::from_millis(100));
    }

    #[test]
    fn builder_pattern() {
        let broker = BrokerConfig::new()
            .batch_size(1)
            .queue_balancing(QueueBalancing::PerGroup);
        assert_eq!(broker.batch_size, 1);
        assert_eq!(broker.queue_balancing, QueueBalancing::PerGroup);

        let obj = ObjectConfig::new("/tmp/x").enable_compaction(false);
        assert!(!obj.enable_compaction);
        assert_eq!(obj.data_dir, PathBuf::from("/tmp/x"));
    }

    #[test]
    fn parse_balancing() {
        assert_eq!("global".parse::<QueueBalancing>(), Ok(QueueBalancing::Global));
        assert_eq!("per-group".parse::<QueueBalancing>(), Ok(QueueBalancing::PerGroup));
        assert!("random".parse::<QueueBalancing>().is_err());
    }
}
