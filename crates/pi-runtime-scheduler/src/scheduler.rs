//! Admission scheduling (§4.8): combines C5's admission queue with C6's
//! cross-instance fair share and C7's adaptive penalty into one `request()`
//! entrypoint, and owns periodic limit recomputation.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use pi_runtime_capacity::{AdaptiveController, CapacityRegistry, LeaseId, Outcome, ReservationRequest};
use pi_runtime_core::RuntimeError;
use pi_runtime_coordinator::{Coordinator, InstanceToken};

use crate::config::SchedulerConfig;

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A capacity request routed through the scheduler. Mirrors
/// [`pi_runtime_capacity::ReservationRequest`] plus the key C7's penalty is
/// tracked under.
#[derive(Debug, Clone)]
pub struct SchedulerRequest {
    pub requests: usize,
    pub llm: usize,
    pub priority: i32,
    pub owner_pid: u32,
    pub provider: Option<String>,
    pub model: Option<String>,
}

impl SchedulerRequest {
    pub fn new(requests: usize, llm: usize, owner_pid: u32) -> Self {
        Self {
            requests,
            llm,
            priority: 0,
            owner_pid,
            provider: None,
            model: None,
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Ties C5 (admission queue), C6 (cross-instance fair share) and C7 (adaptive
/// penalty) together. Owns no queue of its own — [`CapacityRegistry`] already
/// does — it derives the limits that registry enforces.
pub struct Scheduler {
    capacity: Arc<CapacityRegistry>,
    coordinator: Option<Arc<Coordinator>>,
    adaptive: Arc<AdaptiveController>,
    config: std::sync::RwLock<SchedulerConfig>,
    last_recompute_ms: AtomicU64,
}

impl Scheduler {
    pub fn new(
        capacity: Arc<CapacityRegistry>,
        coordinator: Option<Arc<Coordinator>>,
        adaptive: Arc<AdaptiveController>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            capacity,
            coordinator,
            adaptive,
            config: std::sync::RwLock::new(config),
            last_recompute_ms: AtomicU64::new(0),
        }
    }

    /// Requests capacity, recomputing C6/C7-derived limits first if the
    /// configured recompute interval has elapsed. Returns a lease on admission.
    pub async fn request(
        &self,
        token: Option<&InstanceToken>,
        req: SchedulerRequest,
        cancel: impl Future<Output = ()>,
    ) -> Result<LeaseId, RuntimeError> {
        self.maybe_recompute(token).await?;

        let mut reservation = ReservationRequest::new(req.requests, req.llm, req.owner_pid)
            .priority(req.priority);
        if let Some(provider) = req.provider {
            reservation = reservation.provider(provider);
        }
        if let Some(model) = req.model {
            reservation = reservation.model(model);
        }

        self.capacity.reserve(reservation, cancel).await
    }

    /// Feeds a completed call's outcome back into C7, per §2's "telemetry
    /// flows back to C7" data flow note.
    pub fn record_outcome(&self, outcome: Outcome) {
        let key = self.config.read().unwrap().penalty_key.clone();
        self.adaptive.record_outcome(&key, outcome);
    }

    /// Replaces the static base limits and penalty key (configuration reload,
    /// §4.8), forcing a recompute on the next `request()` call.
    pub fn reload(&self, config: SchedulerConfig) {
        *self.config.write().unwrap() = config;
        self.last_recompute_ms.store(0, Ordering::SeqCst);
    }

    /// Forces C6 fair-share + C7 penalty recomputation regardless of the
    /// recompute interval, applying the result to the underlying registry.
    pub async fn recompute_now(&self, token: Option<&InstanceToken>) -> Result<(), RuntimeError> {
        let (base_max_requests, base_max_llm, penalty_key) = {
            let config = self.config.read().unwrap();
            (config.base_max_requests, config.base_max_llm, config.penalty_key.clone())
        };

        let local_max_llm = match (&self.coordinator, token) {
            (Some(coordinator), Some(token)) => {
                coordinator.compute_fair_share(token, base_max_llm).await?
            }
            _ => base_max_llm,
        };

        let penalty = self.adaptive.penalty(&penalty_key);
        let effective_llm = ((local_max_llm as f64) * penalty).floor().max(1.0) as usize;

        self.capacity.adjust_limits(base_max_requests, effective_llm);
        self.last_recompute_ms.store(now_millis(), Ordering::SeqCst);
        Ok(())
    }

    async fn maybe_recompute(&self, token: Option<&InstanceToken>) -> Result<(), RuntimeError> {
        let interval_ms = self.config.read().unwrap().recompute_interval.as_millis() as u64;
        let last = self.last_recompute_ms.load(Ordering::SeqCst);
        if now_millis().saturating_sub(last) < interval_ms {
            return Ok(());
        }
        self.recompute_now(token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pi_runtime_capacity::CapacityConfig;
    use std::future::pending;
    use std::time::Duration;

    fn scheduler() -> Scheduler {
        let capacity = Arc::new(CapacityRegistry::new(
            CapacityConfig::builder()
                .max_total_active_requests(10)
                .max_total_active_llm(10)
                .build(),
        ));
        let adaptive = Arc::new(AdaptiveController::new(10, 3));
        Scheduler::new(
            capacity,
            None,
            adaptive,
            SchedulerConfig::builder()
                .base_max_requests(10)
                .base_max_llm(10)
                .recompute_interval(Duration::from_millis(0))
                .build(),
        )
    }

    #[tokio::test]
    async fn request_admits_within_base_limits() {
        let scheduler = scheduler();
        let lease = scheduler
            .request(None, SchedulerRequest::new(1, 1, 1), pending())
            .await
            .unwrap();
        scheduler.capacity.release(lease).unwrap();
    }

    #[tokio::test]
    async fn adaptive_penalty_shrinks_effective_llm_limit() {
        let scheduler = scheduler();
        for _ in 0..10 {
            scheduler.record_outcome(Outcome::Error);
        }
        scheduler.recompute_now(None).await.unwrap();
        let snapshot = scheduler.capacity.snapshot();
        assert!(snapshot.max_total_active_llm < 10);
    }

    #[tokio::test]
    async fn reload_resets_base_limits() {
        let scheduler = scheduler();
        scheduler.reload(
            SchedulerConfig::builder()
                .base_max_requests(2)
                .base_max_llm(2)
                .build(),
        );
        scheduler.recompute_now(None).await.unwrap();
        let snapshot = scheduler.capacity.snapshot();
        assert_eq!(snapshot.max_total_active_llm, 2);
    }
}
