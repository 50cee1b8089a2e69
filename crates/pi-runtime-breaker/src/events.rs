use crate::circuit::CircuitState;
use pi_runtime_core::RuntimeEvent;
use std::time::{Duration, Instant};

/// Events emitted by a keyed circuit breaker.
#[derive(Debug, Clone)]
pub enum BreakerEvent {
    /// The breaker for `key` moved from `from_state` to `to_state`.
    StateTransition {
        key: String,
        timestamp: Instant,
        from_state: CircuitState,
        to_state: CircuitState,
    },
    /// A call was permitted through `check`.
    CallPermitted {
        key: String,
        timestamp: Instant,
        state: CircuitState,
    },
    /// A call was rejected because the breaker is open.
    CallRejected {
        key: String,
        timestamp: Instant,
        retry_after: Duration,
    },
    /// `recordSuccess` was called.
    SuccessRecorded {
        key: String,
        timestamp: Instant,
        state: CircuitState,
    },
    /// `recordFailure` was called.
    FailureRecorded {
        key: String,
        timestamp: Instant,
        state: CircuitState,
    },
}

impl BreakerEvent {
    fn key(&self) -> &str {
        match self {
            BreakerEvent::StateTransition { key, .. }
            | BreakerEvent::CallPermitted { key, .. }
            | BreakerEvent::CallRejected { key, .. }
            | BreakerEvent::SuccessRecorded { key, .. }
            | BreakerEvent::FailureRecorded { key, .. } => key,
        }
    }
}

impl RuntimeEvent for BreakerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BreakerEvent::StateTransition { .. } => "state_transition",
            BreakerEvent::CallPermitted { .. } => "call_permitted",
            BreakerEvent::CallRejected { .. } => "call_rejected",
            BreakerEvent::SuccessRecorded { .. } => "success_recorded",
            BreakerEvent::FailureRecorded { .. } => "failure_recorded",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            BreakerEvent::StateTransition { timestamp, .. }
            | BreakerEvent::CallPermitted { timestamp, .. }
            | BreakerEvent::CallRejected { timestamp, .. }
            | BreakerEvent::SuccessRecorded { timestamp, .. }
            | BreakerEvent::FailureRecorded { timestamp, .. } => *timestamp,
        }
    }

    fn component_name(&self) -> &str {
        self.key()
    }
}
