//! The closed error taxonomy shared across the runtime orchestration core.
//!
//! Every component surfaces failures through [`RuntimeError`] rather than inventing
//! its own error type, the same way `tower-resilience`'s `ResilienceError<E>` let
//! circuit breaker, bulkhead, and rate limiter compose without per-call-site `From`
//! boilerplate. Unlike that type, `RuntimeError` is not generic over an application
//! error: the set of kinds is closed and enumerated in full.

use std::fmt;
use std::time::Duration;

/// Stable error kind for boundary failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Admission was denied; capacity limits are listed in the message.
    RuntimeLimit,
    /// A pending reservation waited longer than `pendingTtlMs`.
    QueueTimeout,
    /// The rate limit gate fast-failed rather than making the caller wait.
    RateLimited,
    /// The circuit breaker for this key is open.
    CircuitOpen,
    /// Structured LLM output was missing required fields.
    SchemaViolation,
    /// The upstream LLM provider returned an error.
    LlmError,
    /// The caller's cancellation token fired.
    Cancelled,
    /// An operation exceeded its deadline.
    Timeout,
    /// The shared state store could not acquire its advisory lock in time.
    LockTimeout,
    /// Referenced an id (lease, connection, peer) that does not exist.
    NotFound,
    /// An outbound MCP connection target was rejected by the SSRF blocklist.
    SsrfBlocked,
    /// The on-disk JSON state file failed to parse; a default was substituted.
    CorruptState,
}

impl ErrorKind {
    /// The stable wire name for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::RuntimeLimit => "runtime_limit",
            ErrorKind::QueueTimeout => "queue_timeout",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::SchemaViolation => "schema_violation",
            ErrorKind::LlmError => "llm_error",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Timeout => "timeout",
            ErrorKind::LockTimeout => "lock_timeout",
            ErrorKind::NotFound => "not_found",
            ErrorKind::SsrfBlocked => "ssrf_blocked",
            ErrorKind::CorruptState => "corrupt_state",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed error crossing a component boundary.
///
/// Carries a stable [`ErrorKind`], a human-readable message (redacted via
/// [`crate::redact::redact`]), whether a caller should retry, and — when derivable —
/// how long to wait first.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RuntimeError {
    kind: ErrorKind,
    message: String,
    retryable: bool,
    retry_after: Option<Duration>,
    status_code: Option<u16>,
}

impl RuntimeError {
    /// Builds a new error of the given kind, redacting the message first.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: crate::redact::redact(&message.into()),
            retryable: matches!(
                kind,
                ErrorKind::RateLimited
                    | ErrorKind::CircuitOpen
                    | ErrorKind::LlmError
                    | ErrorKind::Timeout
                    | ErrorKind::LockTimeout
            ),
            retry_after: None,
            status_code: None,
        }
    }

    /// Overrides the default retryable flag.
    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Attaches a suggested wait before retrying.
    pub fn with_retry_after(mut self, after: Duration) -> Self {
        self.retry_after = Some(after);
        self
    }

    /// Attaches an upstream status code (meaningful for [`ErrorKind::LlmError`]).
    pub fn with_status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    /// The stable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Whether callers should consider retrying.
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Suggested wait before retry, if known.
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    /// Upstream status code, if this is an `LlmError`.
    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    /// Admission denied due to capacity limits.
    pub fn runtime_limit(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RuntimeLimit, message)
    }

    /// Pending reservation exceeded `pendingTtlMs`.
    pub fn queue_timeout() -> Self {
        Self::new(ErrorKind::QueueTimeout, "pending reservation timed out")
    }

    /// Fast-fail rate limit rejection, carrying the computed wait.
    pub fn rate_limited(retry_after: Duration) -> Self {
        Self::new(
            ErrorKind::RateLimited,
            format!("rate limited, retry after {retry_after:?}"),
        )
        .with_retry_after(retry_after)
    }

    /// Circuit breaker open rejection, carrying the remaining cooldown.
    pub fn circuit_open(key: &str, retry_after: Duration) -> Self {
        Self::new(
            ErrorKind::CircuitOpen,
            format!("circuit '{key}' is open, retry after {retry_after:?}"),
        )
        .with_retry_after(retry_after)
    }

    /// Structured-output parse failure, naming the missing fields.
    pub fn schema_violation(missing: &[&str]) -> Self {
        Self::new(
            ErrorKind::SchemaViolation,
            format!("missing required field(s): {}", missing.join(", ")),
        )
        .retryable(false)
    }

    /// Upstream LLM failure. Retryable for 429 and 5xx.
    pub fn llm_error(message: impl Into<String>, status_code: Option<u16>) -> Self {
        let mut err = Self::new(ErrorKind::LlmError, message);
        if let Some(code) = status_code {
            err = err.with_status_code(code).retryable(code == 429 || code >= 500);
        }
        err
    }

    /// Caller-initiated cancellation.
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "operation cancelled").retryable(false)
    }

    /// Deadline exceeded.
    pub fn timeout() -> Self {
        Self::new(ErrorKind::Timeout, "operation timed out")
    }

    /// Shared-state lock could not be acquired within `lockTimeoutMs`.
    pub fn lock_timeout() -> Self {
        Self::new(ErrorKind::LockTimeout, "lock acquisition timed out")
    }

    /// Referenced id not found.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, format!("not found: {}", what.into())).retryable(false)
    }

    /// SSRF blocklist rejection.
    pub fn ssrf_blocked(target: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::SsrfBlocked,
            format!("connection target rejected: {}", target.into()),
        )
        .retryable(false)
    }

    /// JSON state file was corrupt; a default was substituted and a sidecar kept.
    pub fn corrupt_state(sidecar_path: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::CorruptState,
            format!("state file corrupt, preserved at {}", sidecar_path.into()),
        )
    }

    /// True if `self.kind() == ErrorKind::Cancelled`.
    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }

    /// True if `self.kind() == ErrorKind::Timeout`.
    pub fn is_timeout(&self) -> bool {
        self.kind == ErrorKind::Timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_match_taxonomy() {
        assert_eq!(ErrorKind::RuntimeLimit.as_str(), "runtime_limit");
        assert_eq!(ErrorKind::QueueTimeout.as_str(), "queue_timeout");
        assert_eq!(ErrorKind::RateLimited.as_str(), "rate_limited");
        assert_eq!(ErrorKind::CircuitOpen.as_str(), "circuit_open");
        assert_eq!(ErrorKind::SchemaViolation.as_str(), "schema_violation");
        assert_eq!(ErrorKind::LlmError.as_str(), "llm_error");
        assert_eq!(ErrorKind::Cancelled.as_str(), "cancelled");
        assert_eq!(ErrorKind::Timeout.as_str(), "timeout");
        assert_eq!(ErrorKind::LockTimeout.as_str(), "lock_timeout");
        assert_eq!(ErrorKind::NotFound.as_str(), "not_found");
        assert_eq!(ErrorKind::SsrfBlocked.as_str(), "ssrf_blocked");
        assert_eq!(ErrorKind::CorruptState.as_str(), "corrupt_state");
    }

    #[test]
    fn schema_violation_names_missing_fields() {
        let err = RuntimeError::schema_violation(&["SUMMARY", "RESULT"]);
        assert!(err.to_string().contains("SUMMARY"));
        assert!(err.to_string().contains("RESULT"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn llm_error_retryable_on_429_and_5xx() {
        assert!(RuntimeError::llm_error("boom", Some(429)).is_retryable());
        assert!(RuntimeError::llm_error("boom", Some(503)).is_retryable());
        assert!(!RuntimeError::llm_error("boom", Some(400)).is_retryable());
    }

    #[test]
    fn redaction_applied_to_message() {
        let err = RuntimeError::llm_error("token sk-ant-abc123def456 leaked", None);
        assert!(!err.to_string().contains("sk-ant-abc123def456"));
    }

    #[test]
    fn cancelled_is_not_retryable() {
        assert!(!RuntimeError::cancelled().is_retryable());
        assert!(RuntimeError::cancelled().is_cancelled());
    }

    const _: () = {
        const fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<RuntimeError>();
    };
}
