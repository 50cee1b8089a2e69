//! Cross-instance coordination for the runtime orchestration core (§4.6).
//!
//! Multiple OS processes running this runtime on the same machine share a
//! capacity budget by registering into a common JSON registry file guarded
//! by [`pi_runtime_store::StateStore`]. Each instance periodically
//! heartbeats and recomputes its fair share of the shared LLM concurrency
//! budget; dead peers (stale heartbeat or a PID that no longer exists) are
//! evicted lazily on read.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use pi_runtime_coordinator::{Coordinator, CoordinatorConfig};
//! # use pi_runtime_store::{StateStore, StoreConfig};
//! # async fn run() -> Result<(), pi_runtime_core::RuntimeError> {
//! let store = Arc::new(StateStore::new(StoreConfig::builder().build()));
//! let coordinator = Coordinator::new(store, "/tmp/pi-runtime/registry.json", CoordinatorConfig::builder().build());
//! let token = coordinator.register("/work", vec!["gpt-4".into()]).await?;
//! let share = coordinator.compute_fair_share(&token, 10).await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod coordinator;
mod fair_share;
mod instance;

pub use config::{CoordinatorConfig, CoordinatorConfigBuilder};
pub use coordinator::Coordinator;
pub use instance::{InstanceMetrics, InstanceRecord, InstanceToken};
