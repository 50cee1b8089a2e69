//! Structured-logger collaborator contract (§6): `startOperation(type) -> id`,
//! `endOperation(id, result)`. Per §6, emitters must not block, so both methods
//! are plain synchronous calls a component fires without awaiting.

use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome recorded for a completed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    Success,
    Failure,
}

/// Host-supplied structured logger, wired into a component at construction.
/// An implementation is expected to return quickly (buffer, don't flush).
pub trait CrateTelemetry: Send + Sync {
    /// Records the start of `operation_type`, returning an opaque id to pass
    /// to the matching `end_operation`.
    fn start_operation(&self, operation_type: &str) -> u64;

    /// Records the end of the operation identified by `id`.
    fn end_operation(&self, id: u64, result: OperationResult);
}

/// No-op implementation for hosts that don't supply their own telemetry.
pub struct NoopTelemetry;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

impl CrateTelemetry for NoopTelemetry {
    fn start_operation(&self, _operation_type: &str) -> u64 {
        NEXT_ID.fetch_add(1, Ordering::Relaxed)
    }

    fn end_operation(&self, _id: u64, _result: OperationResult) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_telemetry_hands_out_distinct_ids() {
        let telemetry = NoopTelemetry;
        let a = telemetry.start_operation("task");
        let b = telemetry.start_operation("task");
        assert_ne!(a, b);
        telemetry.end_operation(a, OperationResult::Success);
        telemetry.end_operation(b, OperationResult::Failure);
    }
}
