use pi_runtime_core::RuntimeError;
use std::time::Duration;

/// Converts a breaker rejection into the shared [`RuntimeError`] taxonomy.
pub(crate) fn circuit_open(key: &str, retry_after: Duration) -> RuntimeError {
    RuntimeError::circuit_open(key, retry_after)
}
