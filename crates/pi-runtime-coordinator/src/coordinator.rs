use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use pi_runtime_core::RuntimeError;
use pi_runtime_store::StateStore;
use uuid::Uuid;

use crate::config::CoordinatorConfig;
use crate::fair_share;
use crate::instance::{now_ms, InstanceMetrics, InstanceRecord, InstanceToken, Registry};

#[cfg(target_os = "linux")]
fn pid_is_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(not(target_os = "linux"))]
fn pid_is_alive(_pid: u32) -> bool {
    true
}

fn evict_dead(registry: &mut Registry, heartbeat_timeout_ms: u64) {
    let now = now_ms();
    registry.instances.retain(|record| {
        let fresh = now.saturating_sub(record.last_heartbeat_at) <= heartbeat_timeout_ms;
        fresh && pid_is_alive(record.pid)
    });
}

/// Shared cross-instance registry and fair-share allocator (§4.6). Multiple
/// OS processes of this runtime coordinate through a single JSON file owned
/// by [`pi_runtime_store::StateStore`].
pub struct Coordinator {
    store: Arc<StateStore>,
    registry_path: PathBuf,
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(store: Arc<StateStore>, registry_path: impl Into<PathBuf>, config: CoordinatorConfig) -> Self {
        Self {
            store,
            registry_path: registry_path.into(),
            config,
        }
    }

    /// Writes this process's record to the shared registry and returns a
    /// token authorizing subsequent `heartbeat`/`deregister` calls.
    pub async fn register(
        &self,
        cwd: impl Into<String>,
        active_models: Vec<String>,
    ) -> Result<InstanceToken, RuntimeError> {
        let instance_id = Uuid::new_v4().to_string();
        let now = now_ms();
        let record = InstanceRecord {
            instance_id: instance_id.clone(),
            pid: process::id(),
            cwd: cwd.into(),
            started_at: now,
            last_heartbeat_at: now,
            active_models,
            active_requests: 0,
            active_llm: 0,
            pending_count: 0,
            avg_latency_ms: 0.0,
        };

        self.store
            .with_lock(&self.registry_path, move |mut registry: Registry| {
                registry.instances.push(record.clone());
                registry.touch();
                registry
            })
            .await?;

        Ok(InstanceToken { instance_id })
    }

    /// Updates this instance's heartbeat and usage metrics.
    pub async fn heartbeat(&self, token: &InstanceToken, metrics: InstanceMetrics) -> Result<(), RuntimeError> {
        let id = token.instance_id.clone();
        self.store
            .with_lock(&self.registry_path, move |mut registry: Registry| {
                if let Some(record) = registry.find_mut(&id) {
                    record.last_heartbeat_at = now_ms();
                    record.active_requests = metrics.active_requests;
                    record.active_llm = metrics.active_llm;
                    record.pending_count = metrics.pending_count;
                    record.avg_latency_ms = metrics.avg_latency_ms;
                    if !metrics.active_models.is_empty() {
                        record.active_models = metrics.active_models.clone();
                    }
                }
                registry.touch();
                registry
            })
            .await?;
        Ok(())
    }

    /// Removes this instance's record. Best-effort: callers should also call
    /// this on process exit, but a crashed process is still reaped by
    /// `compute_fair_share`'s staleness eviction.
    pub async fn deregister(&self, token: &InstanceToken) -> Result<(), RuntimeError> {
        let id = token.instance_id.clone();
        self.store
            .with_lock(&self.registry_path, move |mut registry: Registry| {
                registry.remove(&id);
                registry.touch();
                registry
            })
            .await?;
        Ok(())
    }

    /// Reads the registry, evicts stale/dead peers (persisting the eviction),
    /// and returns this instance's share of `total_max_llm`.
    pub async fn compute_fair_share(
        &self,
        token: &InstanceToken,
        total_max_llm: usize,
    ) -> Result<usize, RuntimeError> {
        let heartbeat_timeout_ms = self.config.heartbeat_timeout.as_millis() as u64;

        let registry = self
            .store
            .with_lock(&self.registry_path, move |mut registry: Registry| {
                evict_dead(&mut registry, heartbeat_timeout_ms);
                registry.touch();
                registry
            })
            .await?;

        let peers: Vec<InstanceRecord> = registry.instances;
        let shares = fair_share::compute(&peers, total_max_llm);

        Ok(shares
            .get(&token.instance_id)
            .copied()
            .unwrap_or_else(|| total_max_llm.max(1)))
    }

    pub fn recompute_interval(&self) -> std::time::Duration {
        self.config.recompute_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pi_runtime_store::StoreConfig;

    async fn coordinator(dir: &tempfile::TempDir) -> (Coordinator, PathBuf) {
        let store = Arc::new(StateStore::new(StoreConfig::builder().build()));
        let path = dir.path().join("registry.json");
        (
            Coordinator::new(store, path.clone(), CoordinatorConfig::builder().build()),
            path,
        )
    }

    #[tokio::test]
    async fn register_then_heartbeat_then_deregister() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, _path) = coordinator(&dir).await;

        let token = coordinator.register("/work", vec!["gpt".into()]).await.unwrap();
        coordinator
            .heartbeat(
                &token,
                InstanceMetrics {
                    active_requests: 1,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let share = coordinator.compute_fair_share(&token, 10).await.unwrap();
        assert_eq!(share, 10);

        coordinator.deregister(&token).await.unwrap();
        let share_after = coordinator.compute_fair_share(&token, 10).await.unwrap();
        assert_eq!(share_after, 10);
    }

    #[tokio::test]
    async fn fair_share_splits_across_registered_peers() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, _path) = coordinator(&dir).await;

        let a = coordinator.register("/a", vec![]).await.unwrap();
        let b = coordinator.register("/b", vec![]).await.unwrap();

        let share_a = coordinator.compute_fair_share(&a, 10).await.unwrap();
        let share_b = coordinator.compute_fair_share(&b, 10).await.unwrap();
        assert_eq!(share_a + share_b, 10);
    }

    #[tokio::test]
    async fn stale_peers_are_evicted_from_fair_share() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(StateStore::new(StoreConfig::builder().build()));
        let path = dir.path().join("registry.json");
        let config = CoordinatorConfig::builder()
            .heartbeat_timeout(std::time::Duration::from_millis(10))
            .build();
        let coordinator = Coordinator::new(Arc::clone(&store), path.clone(), config);

        // `stale` goes quiet past the timeout while `fresh` registers right
        // before the read. If eviction works, `fresh` is the only survivor
        // and gets the full 10; if `evict_dead` were a no-op, both peers
        // would still be present and the share would split 5/5 instead. A
        // single registered peer can't tell these two outcomes apart,
        // since the empty-registry fallback and the one-peer split both
        // land on 10.
        let stale = coordinator.register("/stale", vec![]).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let fresh = coordinator.register("/fresh", vec![]).await.unwrap();

        let share = coordinator.compute_fair_share(&fresh, 10).await.unwrap();
        assert_eq!(share, 10);

        let _ = stale;
    }
}
