//! The aggregate configuration surface (§5's defaults table): every component
//! is independently configurable, but most deployments just want sane
//! defaults with a handful of overrides loaded from one JSON document.
//!
//! `RuntimeConfig` is plain data (`Deserialize`-able, millisecond durations
//! and counts only) so it can come from a config file or environment the way
//! [`crate::Runtime::from_env`] does. It is converted into the real typed
//! per-component configs (which carry event listeners and so cannot
//! themselves derive `Deserialize`) by [`RuntimeConfig::build`].

use std::time::Duration;

use pi_runtime_breaker::BreakerConfig;
use pi_runtime_capacity::CapacityConfig;
use pi_runtime_coordinator::CoordinatorConfig;
use pi_runtime_limiter::LimiterConfig;
use pi_runtime_mcp::McpManagerConfig;
use pi_runtime_scheduler::SchedulerConfig;
use pi_runtime_store::StoreConfig;
use serde::Deserialize;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Aggregate, serializable configuration for every component (§5).
///
/// Field names and defaults mirror the spec's defaults table exactly
/// (`leaseTtlMs`, `heartbeatIntervalMs`, and so on); anything left absent in
/// a deserialized document falls back to the default shown here.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    // C1 shared state store
    pub lock_timeout_ms: u64,
    pub lock_stale_ms: u64,

    // C2 rate limit gate
    pub rate_limit_rpm: usize,
    pub rate_limit_window_ms: u64,
    pub rate_limit_fast_fail_threshold_ms: u64,
    pub rate_limit_default_cooldown_ms: u64,

    // C3 circuit breaker
    pub breaker_failure_threshold: usize,
    pub breaker_success_threshold: usize,
    pub breaker_cooldown_ms: u64,

    // C4 retry engine (per-call template; `pi_runtime_retry::RetryOptions`
    // is built per call site, not held here, but the defaults still live
    // in one place for callers that don't want to think about them)
    pub retry_max_retries: usize,
    pub retry_initial_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub retry_backoff_factor: f64,

    // C5 capacity reservation
    pub max_total_active_requests: usize,
    pub max_total_active_llm: usize,
    pub lease_ttl_ms: u64,
    pub pending_ttl_ms: u64,

    // C6 cross-instance coordinator
    pub heartbeat_interval_ms: u64,
    pub coordinator_recompute_interval_ms: u64,

    // C7 adaptive rate controller
    pub adaptive_window_size: usize,
    pub adaptive_successes_to_recover: usize,

    // C8 scheduler
    pub scheduler_base_max_requests: usize,
    pub scheduler_base_max_llm: usize,
    pub scheduler_recompute_interval_ms: u64,

    // C10 MCP connection manager
    pub mcp_max_connections: usize,
    pub mcp_default_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 10_000,
            lock_stale_ms: 60_000,

            rate_limit_rpm: 60,
            rate_limit_window_ms: 60_000,
            rate_limit_fast_fail_threshold_ms: 30_000,
            rate_limit_default_cooldown_ms: 60_000,

            breaker_failure_threshold: 5,
            breaker_success_threshold: 2,
            breaker_cooldown_ms: 60_000,

            retry_max_retries: 3,
            retry_initial_delay_ms: 250,
            retry_max_delay_ms: 10_000,
            retry_backoff_factor: 2.0,

            max_total_active_requests: 25,
            max_total_active_llm: 10,
            lease_ttl_ms: 90_000,
            pending_ttl_ms: 120_000,

            heartbeat_interval_ms: 30_000,
            coordinator_recompute_interval_ms: 5_000,

            adaptive_window_size: 10,
            adaptive_successes_to_recover: 3,

            scheduler_base_max_requests: 25,
            scheduler_base_max_llm: 10,
            scheduler_recompute_interval_ms: 5_000,

            mcp_max_connections: 10,
            mcp_default_timeout_ms: 30_000,
        }
    }
}

impl RuntimeConfig {
    /// Parses a JSON document, falling back to [`RuntimeConfig::default`]
    /// field-by-field for anything the document omits.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::builder()
            .lock_timeout(ms(self.lock_timeout_ms))
            .lock_stale(ms(self.lock_stale_ms))
            .build()
    }

    pub fn limiter_config(&self) -> LimiterConfig {
        LimiterConfig::builder()
            .rpm(self.rate_limit_rpm)
            .window(ms(self.rate_limit_window_ms))
            .fast_fail_threshold(ms(self.rate_limit_fast_fail_threshold_ms))
            .default_cooldown(ms(self.rate_limit_default_cooldown_ms))
            .build()
    }

    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig::builder()
            .failure_threshold(self.breaker_failure_threshold)
            .success_threshold(self.breaker_success_threshold)
            .cooldown(ms(self.breaker_cooldown_ms))
            .build()
    }

    pub fn capacity_config(&self) -> CapacityConfig {
        CapacityConfig::builder()
            .max_total_active_requests(self.max_total_active_requests)
            .max_total_active_llm(self.max_total_active_llm)
            .lease_ttl(ms(self.lease_ttl_ms))
            .pending_ttl(ms(self.pending_ttl_ms))
            .build()
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig::builder()
            .heartbeat_timeout(ms(self.heartbeat_interval_ms))
            .recompute_interval(ms(self.coordinator_recompute_interval_ms))
            .build()
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::builder()
            .base_max_requests(self.scheduler_base_max_requests)
            .base_max_llm(self.scheduler_base_max_llm)
            .recompute_interval(ms(self.scheduler_recompute_interval_ms))
            .build()
    }

    pub fn mcp_config(&self) -> McpManagerConfig {
        McpManagerConfig {
            max_connections: self.mcp_max_connections,
            default_timeout: ms(self.mcp_default_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_published_table() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.lease_ttl_ms, 90_000);
        assert_eq!(cfg.heartbeat_interval_ms, 30_000);
        assert_eq!(cfg.pending_ttl_ms, 120_000);
        assert_eq!(cfg.lock_timeout_ms, 10_000);
        assert_eq!(cfg.rate_limit_fast_fail_threshold_ms, 30_000);
        assert_eq!(cfg.breaker_cooldown_ms, 60_000);
        assert_eq!(cfg.mcp_default_timeout_ms, 30_000);
        assert_eq!(cfg.mcp_max_connections, 10);
    }

    #[test]
    fn partial_document_keeps_remaining_defaults() {
        let cfg = RuntimeConfig::from_json(r#"{"rate_limit_rpm": 120}"#).unwrap();
        assert_eq!(cfg.rate_limit_rpm, 120);
        assert_eq!(cfg.breaker_failure_threshold, 5);
    }

    #[test]
    fn builds_sub_configs_without_panicking() {
        let cfg = RuntimeConfig::default();
        let _ = cfg.store_config();
        let _ = cfg.limiter_config();
        let _ = cfg.breaker_config();
        let _ = cfg.capacity_config();
        let _ = cfg.coordinator_config();
        let _ = cfg.scheduler_config();
        let _ = cfg.mcp_config();
    }
}
