//! Runtime admission scheduler (§4.8).
//!
//! [`Scheduler`] is the single entrypoint callers go through to request
//! capacity: it derives the limits [`pi_runtime_capacity::CapacityRegistry`]
//! enforces from C6's cross-instance fair share and C7's adaptive penalty,
//! then delegates the actual admission-or-queue decision to that registry.
//! Capacity events (admission, queueing, limit changes) are observed through
//! the registry's own `subscribe`/`EventListener` API — the scheduler adds no
//! event channel of its own.

mod config;
mod scheduler;

pub use config::{SchedulerConfig, SchedulerConfigBuilder};
pub use scheduler::{Scheduler, SchedulerRequest};
