//! Client configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// Default interval between heartbeat pings.
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(10);

/// Settings for a [`crate::Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address.
    pub addr: SocketAddr,
    /// Interval between heartbeat pings; `None` disables them.
    pub heartbeat_interval: Option<Duration>,
    /// Longest a request waits for its response.
    pub request_timeout: Duration,
    /// Messages buffered per subscription before deliveries are dropped.
    pub subscription_buffer: usize,
}

impl ClientConfig {
    /// Creates a configuration for `addr` with default settings.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            heartbeat_interval: Some(DEFAULT_HEARTBEAT),
            request_timeout: Duration::from_secs(30),
            subscription_buffer: 1024,
        }
    }

    /// Sets the heartbeat interval.
    pub fn with_heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Disables heartbeat pings.
    pub fn without_heartbeat(mut self) -> Self {
        self.heartbeat_interval = None;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the per-subscription buffer.
    pub fn with_subscription_buffer(mut self, capacity: usize) -> Self {
        self.subscription_buffer = capacity.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder() {
        let config = ClientConfig::new("127.0.0.1:8091".parse().unwrap())
            .without_heartbeat()
            .with_subscription_buffer(0);
        assert!(config.heartbeat_interval.is_none());
        assert_eq!(config.subscription_buffer, 1);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }
}
