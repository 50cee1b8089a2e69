use std::time::Duration;

/// Tunables for a [`crate::CapacityRegistry`].
#[derive(Clone)]
pub struct CapacityConfig {
    pub(crate) max_total_active_requests: usize,
    pub(crate) max_total_active_llm: usize,
    pub(crate) lease_ttl: Duration,
    pub(crate) pending_ttl: Duration,
}

impl CapacityConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> CapacityConfigBuilder {
        CapacityConfigBuilder::new()
    }
}

/// Builder for [`CapacityConfig`].
pub struct CapacityConfigBuilder {
    max_total_active_requests: usize,
    max_total_active_llm: usize,
    lease_ttl: Duration,
    pending_ttl: Duration,
}

impl CapacityConfigBuilder {
    /// Defaults: 25 concurrent requests, 10 concurrent LLM calls, 5 minute
    /// lease TTL, 30s pending TTL.
    pub fn new() -> Self {
        Self {
            max_total_active_requests: 25,
            max_total_active_llm: 10,
            lease_ttl: Duration::from_secs(300),
            pending_ttl: Duration::from_secs(30),
        }
    }

    /// Base `maxTotalActiveRequests`, before C6/C7 adjustment.
    pub fn max_total_active_requests(mut self, max: usize) -> Self {
        self.max_total_active_requests = max;
        self
    }

    /// Base `maxTotalActiveLlm`, before C6/C7 adjustment.
    pub fn max_total_active_llm(mut self, max: usize) -> Self {
        self.max_total_active_llm = max;
        self
    }

    /// A lease without a fresh heartbeat for longer than this is force-released.
    pub fn lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    /// A pending reservation waiting longer than this fails with `queue_timeout`.
    pub fn pending_ttl(mut self, ttl: Duration) -> Self {
        self.pending_ttl = ttl;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> CapacityConfig {
        CapacityConfig {
            max_total_active_requests: self.max_total_active_requests,
            max_total_active_llm: self.max_total_active_llm,
            lease_ttl: self.lease_ttl,
            pending_ttl: self.pending_ttl,
        }
    }
}

impl Default for CapacityConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
