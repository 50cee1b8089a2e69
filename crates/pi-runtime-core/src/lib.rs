//! Core infrastructure shared across the runtime orchestration crates.
//!
//! Every component crate (rate limiter, circuit breaker, retry engine, capacity
//! reservation, coordinator, scheduler, executor, MCP manager) depends on this one
//! for:
//! - [`RuntimeError`]/[`ErrorKind`], the closed error taxonomy crossing component
//!   boundaries
//! - [`RuntimeEvent`]/[`EventListener`]/[`EventListeners`], the observer fan-out used
//!   for admission, state-transition, and notification events
//! - [`redact::redact`], the sanitiser applied to error messages before they leave a
//!   component
//! - [`telemetry::CrateTelemetry`], the structured-logger collaborator contract a
//!   host can supply to observe operation start/end

pub mod error;
pub mod events;
pub mod ids;
pub mod redact;
pub mod telemetry;

pub use error::{ErrorKind, RuntimeError};
pub use events::{BoxedEventListener, EventListener, EventListeners, FnListener, RuntimeEvent};
pub use ids::{ConnectionId, LeaseId};
pub use redact::redact;
pub use telemetry::{CrateTelemetry, NoopTelemetry, OperationResult};

