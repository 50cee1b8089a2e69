use std::time::Duration;

/// Tunables for a [`crate::StateStore`].
#[derive(Clone)]
pub struct StoreConfig {
    pub(crate) lock_timeout: Duration,
    pub(crate) lock_stale: Duration,
}

impl StoreConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder::new()
    }
}

/// Builder for [`StoreConfig`].
pub struct StoreConfigBuilder {
    lock_timeout: Duration,
    lock_stale: Duration,
}

impl StoreConfigBuilder {
    /// Defaults: 10s lock acquisition timeout, lockfiles older than 60s are
    /// eligible to be broken if their owner PID is dead.
    pub fn new() -> Self {
        Self {
            lock_timeout: Duration::from_secs(10),
            lock_stale: Duration::from_secs(60),
        }
    }

    /// How long `withLock`/`readSnapshot` retry lock acquisition before failing
    /// with `lock_timeout`.
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Minimum age of a contended lockfile before its owner's liveness is checked.
    pub fn lock_stale(mut self, stale: Duration) -> Self {
        self.lock_stale = stale;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> StoreConfig {
        StoreConfig {
            lock_timeout: self.lock_timeout,
            lock_stale: self.lock_stale,
        }
    }
}

impl Default for StoreConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
