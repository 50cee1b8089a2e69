use std::time::Duration;

/// Tunables for a [`crate::Coordinator`].
#[derive(Clone)]
pub struct CoordinatorConfig {
    pub(crate) heartbeat_timeout: Duration,
    pub(crate) recompute_interval: Duration,
}

impl CoordinatorConfig {
    pub fn builder() -> CoordinatorConfigBuilder {
        CoordinatorConfigBuilder::new()
    }
}

/// Builder for [`CoordinatorConfig`].
pub struct CoordinatorConfigBuilder {
    heartbeat_timeout: Duration,
    recompute_interval: Duration,
}

impl CoordinatorConfigBuilder {
    /// Defaults: 15s heartbeat timeout, 5s periodic fair-share recompute
    /// (matching §4.6's "periodic (5 s) ticks").
    pub fn new() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(15),
            recompute_interval: Duration::from_secs(5),
        }
    }

    /// Instances whose heartbeat is older than this (or whose PID is dead)
    /// are evicted from the registry on read.
    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    pub fn recompute_interval(mut self, interval: Duration) -> Self {
        self.recompute_interval = interval;
        self
    }

    pub fn build(self) -> CoordinatorConfig {
        CoordinatorConfig {
            heartbeat_timeout: self.heartbeat_timeout,
            recompute_interval: self.recompute_interval,
        }
    }
}

impl Default for CoordinatorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
