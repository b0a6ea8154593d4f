//! Server configuration.

use crate::error::{ServerError, ServerResult};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use stowage_core::{BrokerConfig, CatalogConfig, KvConfig, ObjectConfig, QueueBalancing};

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 8091;

/// Credentials of an admin user created at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapAdmin {
    /// Login name.
    pub username: String,
    /// Plain-text password; hashed before it is stored.
    pub password: String,
}

/// Configuration for the Stowage server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind_addr: SocketAddr,
    /// Root of the object files, the registry and the users file.
    pub data_dir: PathBuf,
    /// Pause between object compaction rounds.
    pub compaction_interval: Duration,
    /// Pause between shards within one compaction round.
    pub inter_shard_delay: Duration,
    /// Silence after which a connection is closed.
    pub inactivity_timeout: Duration,
    /// How often idle connections are looked for.
    pub reaper_interval: Duration,
    /// Runs the KV TTL cleaner.
    pub enable_ttl: bool,
    /// Period of the KV TTL cleaner.
    pub ttl_cleanup_interval: Duration,
    /// Messages per broker delivery batch.
    pub broker_batch_size: usize,
    /// Longest a partial broker batch waits.
    pub broker_batch_timeout: Duration,
    /// Queue group member selection.
    pub queue_balancing: QueueBalancing,
    /// Users file; defaults to `<data_dir>/users.json`.
    pub users_file: Option<PathBuf>,
    /// Registry file; defaults to `<data_dir>/registry.json`.
    pub registry_file: Option<PathBuf>,
    /// Admin user added at startup.
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl ServerConfig {
    /// Creates a configuration with default values and the given address.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            data_dir: PathBuf::from("data"),
            compaction_interval: Duration::from_secs(300),
            inter_shard_delay: Duration::from_secs(10),
            inactivity_timeout: Duration::from_secs(60),
            reaper_interval: Duration::from_secs(60),
            enable_ttl: true,
            ttl_cleanup_interval: Duration::from_secs(1),
            broker_batch_size: 10,
            broker_batch_timeout: Duration::from_millis(100),
            queue_balancing: QueueBalancing::Global,
            users_file: None,
            registry_file: None,
            bootstrap_admin: None,
        }
    }

    /// Reads `STOWAGE_*` environment variables over the defaults.
    ///
    /// # Errors
    ///
    /// Fails if a variable is set to an unparsable value.
    pub fn from_env() -> ServerResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`ServerConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ServerResult<Self> {
        let mut config = Self::default();
        if let Some(v) = lookup("STOWAGE_BIND_ADDR") {
            config.bind_addr = parse("STOWAGE_BIND_ADDR", &v)?;
        }
        if let Some(v) = lookup("STOWAGE_DATA_DIR") {
            config.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("STOWAGE_COMPACTION_INTERVAL_SECS") {
            config.compaction_interval = Duration::from_secs(parse("STOWAGE_COMPACTION_INTERVAL_SECS", &v)?);
        }
        if let Some(v) = lookup("STOWAGE_INTER_SHARD_DELAY_SECS") {
            config.inter_shard_delay = Duration::from_secs(parse("STOWAGE_INTER_SHARD_DELAY_SECS", &v)?);
        }
        if let Some(v) = lookup("STOWAGE_INACTIVITY_TIMEOUT_SECS") {
            config.inactivity_timeout = Duration::from_secs(parse("STOWAGE_INACTIVITY_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = lookup("STOWAGE_REAPER_INTERVAL_SECS") {
            config.reaper_interval = Duration::from_secs(parse("STOWAGE_REAPER_INTERVAL_SECS", &v)?);
        }
        if let Some(v) = lookup("STOWAGE_ENABLE_TTL") {
            config.enable_ttl = parse_bool("STOWAGE_ENABLE_TTL", &v)?;
        }
        if let Some(v) = lookup("STOWAGE_TTL_CLEANUP_INTERVAL_MS") {
            config.ttl_cleanup_interval = Duration::from_millis(parse("STOWAGE_TTL_CLEANUP_INTERVAL_MS", &v)?);
        }
        if let Some(v) = lookup("STOWAGE_BROKER_BATCH_SIZE") {
            config.broker_batch_size = parse("STOWAGE_BROKER_BATCH_SIZE", &v)?;
        }
        if let Some(v) = lookup("STOWAGE_BROKER_BATCH_TIMEOUT_MS") {
            config.broker_batch_timeout = Duration::from_millis(parse("STOWAGE_BROKER_BATCH_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = lookup("STOWAGE_QUEUE_BALANCING") {
            config.queue_balancing = v.parse().map_err(ServerError::Config)?;
        }
        if let Some(v) = lookup("STOWAGE_USERS_FILE") {
            config.users_file = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("STOWAGE_REGISTRY_FILE") {
            config.registry_file = Some(PathBuf::from(v));
        }
        if let (Some(username), Some(password)) =
            (lookup("STOWAGE_ADMIN_USER"), lookup("STOWAGE_ADMIN_PASSWORD"))
        {
            config.bootstrap_admin = Some(BootstrapAdmin { username, password });
        }
        Ok(config)
    }

    /// Sets the listen address.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Sets the data directory.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Sets the compaction interval.
    pub fn with_compaction_interval(mut self, interval: Duration) -> Self {
        self.compaction_interval = interval;
        self
    }

    /// Sets the delay between shard compactions.
    pub fn with_inter_shard_delay(mut self, delay: Duration) -> Self {
        self.inter_shard_delay = delay;
        self
    }

    /// Sets the inactivity timeout.
    pub fn with_inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = timeout;
        self
    }

    /// Sets the reaper period.
    pub fn with_reaper_interval(mut self, interval: Duration) -> Self {
        self.reaper_interval = interval;
        self
    }

    /// Enables or disables the KV TTL cleaner.
    pub fn with_ttl(mut self, enabled: bool) -> Self {
        self.enable_ttl = enabled;
        self
    }

    /// Sets the KV TTL cleaner period.
    pub fn with_ttl_cleanup_interval(mut self, interval: Duration) -> Self {
        self.ttl_cleanup_interval = interval;
        self
    }

    /// Sets the broker batch size.
    pub fn with_broker_batch_size(mut self, size: usize) -> Self {
        self.broker_batch_size = size;
        self
    }

    /// Sets the broker batch timeout.
    pub fn with_broker_batch_timeout(mut self, timeout: Duration) -> Self {
        self.broker_batch_timeout = timeout;
        self
    }

    /// Sets the queue balancing mode.
    pub fn with_queue_balancing(mut self, mode: QueueBalancing) -> Self {
        self.queue_balancing = mode;
        self
    }

    /// Sets the users file.
    pub fn with_users_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.users_file = Some(path.into());
        self
    }

    /// Sets the registry file.
    pub fn with_registry_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.registry_file = Some(path.into());
        self
    }

    /// Creates an admin user at startup.
    pub fn with_bootstrap_admin(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.bootstrap_admin = Some(BootstrapAdmin {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Engine settings derived from this configuration.
    pub fn catalog_config(&self) -> CatalogConfig {
        CatalogConfig::new(&self.data_dir)
            .kv(KvConfig::new()
                .cleanup_interval(self.ttl_cleanup_interval)
                .disable_ttl(!self.enable_ttl))
            .object(ObjectConfig::new(&self.data_dir)
                .compaction_interval(self.compaction_interval)
                .inter_shard_delay(self.inter_shard_delay))
            .broker(BrokerConfig::new()
                .batch_size(self.broker_batch_size)
                .batch_timeout(self.broker_batch_timeout)
                .queue_balancing(self.queue_balancing))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)))
    }
}

fn parse<T: FromStr>(name: &str, value: &str) -> ServerResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ServerError::Config(format!("{name}: cannot parse {value:?}")))
}

fn parse_bool(name: &str, value: &str) -> ServerResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ServerError::Config(format!("{name}: expected a boolean, got {value:?}"))),
    }
}
