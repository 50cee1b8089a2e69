//! Wires every component into one facade (§3's process lifecycle): a single
//! [`Runtime`] owns the store, limiter, breaker, capacity registry, adaptive
//! controller, optional coordinator, scheduler and MCP manager, and tears all
//! of them down together on [`Runtime::shutdown`].
//!
//! Building a [`pi_runtime_executor::TaskExecutor`] is left to the caller:
//! it needs a host-supplied `LlmCall`, which this crate has no way to invent
//! generically.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use pi_runtime_breaker::BreakerRegistry;
use pi_runtime_capacity::{AdaptiveController, CapacityRegistry};
use pi_runtime_coordinator::{Coordinator, InstanceMetrics, InstanceToken};
use pi_runtime_core::RuntimeError;
use pi_runtime_limiter::LimiterRegistry;
use pi_runtime_mcp::{McpManager, McpTransportFactory};
use pi_runtime_scheduler::Scheduler;
use pi_runtime_store::StateStore;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::RuntimeConfig;

const COORDINATOR_REGISTRY_FILE: &str = "instances.json";
const LIMITER_STATE_FILE: &str = "print-throttle.json";

/// One process's wired-up view of every component (§3).
///
/// Cloning a `Runtime` is cheap (every field is an `Arc`) and shares the
/// same underlying state; only the owner that called [`Runtime::init`]
/// should call [`Runtime::shutdown`].
#[derive(Clone)]
pub struct Runtime {
    pub store: Arc<StateStore>,
    pub limiter: Arc<LimiterRegistry>,
    pub breaker: Arc<BreakerRegistry>,
    pub capacity: Arc<CapacityRegistry>,
    pub adaptive: Arc<AdaptiveController>,
    pub coordinator: Option<Arc<Coordinator>>,
    pub scheduler: Arc<Scheduler>,
    pub mcp: Arc<McpManager>,
    instance: Arc<Mutex<Option<InstanceToken>>>,
    heartbeat_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    heartbeat_interval: std::time::Duration,
}

impl Runtime {
    /// Wires every component from `config`, rooted at `state_dir` for C1's
    /// sidecar files and C6's instance registry.
    ///
    /// If `coordinate` is `true`, registers this process with the shared
    /// instance registry under `state_dir` and starts a background ticker
    /// that heartbeats on `config.heartbeat_interval_ms`; a dead or killed
    /// process is evicted by peers on their own next read (§4.6), so a
    /// missed [`Runtime::shutdown`] is self-healing, not a leak.
    pub async fn init(
        config: RuntimeConfig,
        state_dir: impl AsRef<Path>,
        mcp_factory: Arc<dyn McpTransportFactory>,
        coordinate: bool,
    ) -> Result<Self, RuntimeError> {
        let state_dir = state_dir.as_ref().to_path_buf();
        let store = Arc::new(StateStore::new(config.store_config()));
        let limiter = Arc::new(
            LimiterRegistry::new(config.limiter_config()).with_store(store.clone(), limiter_path(&state_dir)),
        );
        let breaker = Arc::new(BreakerRegistry::new(config.breaker_config()));
        let capacity = Arc::new(CapacityRegistry::new(config.capacity_config()));
        let adaptive = Arc::new(AdaptiveController::new(
            config.adaptive_window_size,
            config.adaptive_successes_to_recover,
        ));
        let mcp = Arc::new(McpManager::new(mcp_factory, config.mcp_config()));

        let coordinator = if coordinate {
            Some(Arc::new(Coordinator::new(
                store.clone(),
                registry_path(&state_dir),
                config.coordinator_config(),
            )))
        } else {
            None
        };

        let scheduler = Arc::new(Scheduler::new(
            capacity.clone(),
            coordinator.clone(),
            adaptive.clone(),
            config.scheduler_config(),
        ));

        let runtime = Self {
            store,
            limiter,
            breaker,
            capacity,
            adaptive,
            coordinator,
            scheduler,
            mcp,
            instance: Arc::new(Mutex::new(None)),
            heartbeat_task: Arc::new(Mutex::new(None)),
            heartbeat_interval: std::time::Duration::from_millis(config.heartbeat_interval_ms),
        };

        if let Some(coordinator) = runtime.coordinator.clone() {
            runtime.start_coordination(coordinator).await?;
        }

        Ok(runtime)
    }

    /// Parses `raw` as a [`RuntimeConfig`] JSON document and calls [`Runtime::init`].
    pub async fn from_json(
        raw: &str,
        state_dir: impl AsRef<Path>,
        mcp_factory: Arc<dyn McpTransportFactory>,
        coordinate: bool,
    ) -> Result<Self, RuntimeError> {
        let config = RuntimeConfig::from_json(raw)
            .map_err(|_| RuntimeError::schema_violation(&["runtime_config"]))?;
        Self::init(config, state_dir, mcp_factory, coordinate).await
    }

    async fn start_coordination(&self, coordinator: Arc<Coordinator>) -> Result<(), RuntimeError> {
        let cwd = std::env::current_dir()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();
        let token = coordinator.register(cwd, Vec::new()).await?;
        *self.instance.lock().await = Some(token);

        let instance = self.instance.clone();
        let capacity = self.capacity.clone();
        let interval = self.heartbeat_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let token = instance.lock().await.clone();
                let Some(token) = token else { break };
                let snapshot = capacity.snapshot();
                let metrics = InstanceMetrics {
                    active_requests: snapshot.active_requests,
                    active_llm: snapshot.active_llm,
                    pending_count: snapshot.pending_requests + snapshot.pending_llm,
                    avg_latency_ms: 0.0,
                    active_models: Vec::new(),
                };
                let _ = coordinator.heartbeat(&token, metrics).await;
            }
        });
        *self.heartbeat_task.lock().await = Some(handle);
        Ok(())
    }

    /// Releases every process-wide resource: stops the heartbeat ticker,
    /// deregisters this instance from the coordinator registry, and
    /// disconnects every MCP connection.
    ///
    /// Does not touch `store`'s file locks directly (they are held only for
    /// the duration of a single `with_lock` call, never across awaits), so
    /// there is nothing else to release there.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.heartbeat_task.lock().await.take() {
            handle.abort();
        }
        if let Some(coordinator) = &self.coordinator {
            if let Some(token) = self.instance.lock().await.take() {
                let _ = coordinator.deregister(&token).await;
            }
        }
        self.mcp.disconnect_all().await;
    }
}

fn registry_path(state_dir: &Path) -> PathBuf {
    state_dir.join(COORDINATOR_REGISTRY_FILE)
}

fn limiter_path(state_dir: &Path) -> PathBuf {
    state_dir.join(LIMITER_STATE_FILE)
}
