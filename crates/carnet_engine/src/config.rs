//! Configuration for the engine.

use carnet_protocol::DEFAULT_MAX_RETRIES;
use std::time::Duration;

/// Configuration shared by the gateway, the reconciler, and the scheduler.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL of the remote API (e.g. `https://api.example.com`).
    pub base_url: String,
    /// Path of the batch replay endpoint, relative to `base_url`.
    pub batch_endpoint: String,
    /// Path of the health endpoint probed for reachability.
    pub health_endpoint: String,
    /// Maximum number of operations per batch request.
    pub batch_size: usize,
    /// Attempt ceiling stamped onto operations captured by the gateway.
    pub default_max_retries: u32,
    /// Interval between scheduled reconciliation passes.
    pub sync_interval: Duration,
    /// Timeout for the reachability probe.
    pub probe_timeout: Duration,
    /// Timeout for ordinary requests and replays.
    pub request_timeout: Duration,
}

impl EngineConfig {
    /// Creates a configuration for the given remote API.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            batch_endpoint: "/sync/batch".into(),
            health_endpoint: "/health".into(),
            batch_size: 10,
            default_max_retries: DEFAULT_MAX_RETRIES,
            sync_interval: Duration::from_secs(300),
            probe_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Sets the batch endpoint path.
    pub fn with_batch_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.batch_endpoint = endpoint.into();
        self
    }

    /// Sets the health endpoint path.
    pub fn with_health_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.health_endpoint = endpoint.into();
        self
    }

    /// Sets the batch size. Clamped to at least 1.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Sets the attempt ceiling applied at capture time.
    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    /// Sets the interval between scheduled passes.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the reachability probe timeout.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Absolute URL of the batch endpoint.
    #[must_use]
    pub fn batch_url(&self) -> String {
        format!("{}{}", self.base_url, self.batch_endpoint)
    }

    /// Absolute URL of the health endpoint.
    #[must_use]
    pub fn health_url(&self) -> String {
        format!("{}{}", self.base_url, self.health_endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::new("https://api.example.com");

        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(config.batch_endpoint, "/sync/batch");
        assert_eq!(config.health_endpoint, "/health");
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.default_max_retries, 3);
        assert_eq!(config.sync_interval, Duration::from_secs(300));
        assert_eq!(config.probe_timeout, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn builder_overrides() {
        let config = EngineConfig::new("https://api.example.com")
            .with_batch_endpoint("/v2/batch")
            .with_batch_size(25)
            .with_default_max_retries(5)
            .with_sync_interval(Duration::from_secs(60))
            .with_probe_timeout(Duration::from_secs(2))
            .with_request_timeout(Duration::from_secs(10));

        assert_eq!(config.batch_endpoint, "/v2/batch");
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.default_max_retries, 5);
        assert_eq!(config.sync_interval, Duration::from_secs(60));
        assert_eq!(config.probe_timeout, Duration::from_secs(2));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn batch_size_never_zero() {
        let config = EngineConfig::new("http://x").with_batch_size(0);
        assert_eq!(config.batch_size, 1);
    }

    #[test]
    fn composed_urls() {
        let config = EngineConfig::new("https://api.example.com").with_health_endpoint("/ping");
        assert_eq!(config.batch_url(), "https://api.example.com/sync/batch");
        assert_eq!(config.health_url(), "https://api.example.com/ping");
    }
}
