use pi_runtime_core::RuntimeEvent;
use std::time::Instant;

use crate::reservation::RuntimeSnapshot;

/// Events emitted by the capacity registry.
#[derive(Debug, Clone)]
pub enum CapacityEvent {
    /// A reservation was admitted immediately.
    Admitted {
        timestamp: Instant,
        snapshot: RuntimeSnapshot,
    },
    /// A reservation could not be admitted and was queued.
    Queued {
        timestamp: Instant,
        snapshot: RuntimeSnapshot,
    },
    /// Free capacity appeared or a dynamic limit changed; fired to `subscribe`rs.
    CapacityChanged {
        timestamp: Instant,
        snapshot: RuntimeSnapshot,
    },
    /// A lease was force-released because its heartbeat was older than `leaseTtlMs`.
    LeaseExpired { timestamp: Instant },
}

impl RuntimeEvent for CapacityEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CapacityEvent::Admitted { .. } => "admitted",
            CapacityEvent::Queued { .. } => "queued",
            CapacityEvent::CapacityChanged { .. } => "capacity_changed",
            CapacityEvent::LeaseExpired { .. } => "lease_expired",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CapacityEvent::Admitted { timestamp, .. }
            | CapacityEvent::Queued { timestamp, .. }
            | CapacityEvent::CapacityChanged { timestamp, .. }
            | CapacityEvent::LeaseExpired { timestamp } => *timestamp,
        }
    }

    fn component_name(&self) -> &str {
        "capacity"
    }
}
