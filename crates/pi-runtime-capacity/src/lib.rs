//! Capacity reservation and adaptive rate control for the runtime orchestration core.
//!
//! [`CapacityRegistry`] (§4.5) tracks active/pending request and LLM-call counts
//! against global limits, issuing [`LeaseId`] handles that must be released (or
//! heartbeated, for long-running work) to free capacity. [`AdaptiveController`]
//! (§4.7) derives a per-key penalty from recent outcomes; callers feed its
//! `penalty()` into [`CapacityRegistry::adjust_limits`] to shrink effective
//! capacity for a misbehaving provider without touching the global caps.
//!
//! ## Example
//!
//! ```rust
//! use pi_runtime_capacity::{CapacityConfig, CapacityRegistry, ReservationRequest};
//! use std::future::pending;
//!
//! # async fn example() -> Result<(), pi_runtime_core::RuntimeError> {
//! let registry = CapacityRegistry::new(CapacityConfig::builder().build());
//! let lease = registry
//!     .reserve(ReservationRequest::new(1, 0, std::process::id()), pending())
//!     .await?;
//! registry.release(lease)?;
//! # Ok(())
//! # }
//! ```

mod adaptive;
mod config;
mod events;
mod reservation;

pub use adaptive::{AdaptiveController, Outcome};
pub use config::{CapacityConfig, CapacityConfigBuilder};
pub use events::CapacityEvent;
pub use reservation::{CapacityRegistry, LeaseId, ReservationRequest, RuntimeSnapshot};
