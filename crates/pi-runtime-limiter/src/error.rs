use pi_runtime_core::RuntimeError;
use std::time::Duration;

/// Converts a fast-fail rejection into the shared [`RuntimeError`] taxonomy.
pub(crate) fn rate_limit_fast_fail(projected_wait: Duration) -> RuntimeError {
    RuntimeError::rate_limited(projected_wait)
}
