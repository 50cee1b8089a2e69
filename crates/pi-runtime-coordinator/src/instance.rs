use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A live process participating in the shared registry (§3 `InstanceInfo`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub instance_id: String,
    pub pid: u32,
    pub cwd: String,
    pub started_at: u64,
    pub last_heartbeat_at: u64,
    pub active_models: Vec<String>,
    pub active_requests: usize,
    pub active_llm: usize,
    pub pending_count: usize,
    pub avg_latency_ms: f64,
}

/// Usage metrics reported on each [`crate::Coordinator::heartbeat`] call.
#[derive(Debug, Clone, Default)]
pub struct InstanceMetrics {
    pub active_requests: usize,
    pub active_llm: usize,
    pub pending_count: usize,
    pub avg_latency_ms: f64,
    pub active_models: Vec<String>,
}

/// Handle returned by [`crate::Coordinator::register`]; required by
/// `heartbeat`/`deregister`/`compute_fair_share`.
#[derive(Debug, Clone)]
pub struct InstanceToken {
    pub(crate) instance_id: String,
}

impl InstanceToken {
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }
}

/// The shared-registry JSON document persisted via `pi-runtime-store`
/// (`<runtime>/cross-instance-registry.json`, §6): a versioned document with
/// `instances` as an array, not an object keyed by id, so the file stays a
/// plain list of `InstanceInfo` peers can append to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Registry {
    pub version: u32,
    pub instances: Vec<InstanceRecord>,
    pub updated_at: u64,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            version: 1,
            instances: Vec::new(),
            updated_at: 0,
        }
    }
}

impl Registry {
    pub(crate) fn find(&self, instance_id: &str) -> Option<&InstanceRecord> {
        self.instances.iter().find(|r| r.instance_id == instance_id)
    }

    pub(crate) fn find_mut(&mut self, instance_id: &str) -> Option<&mut InstanceRecord> {
        self.instances.iter_mut().find(|r| r.instance_id == instance_id)
    }

    pub(crate) fn remove(&mut self, instance_id: &str) {
        self.instances.retain(|r| r.instance_id != instance_id);
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = now_ms();
    }
}
