use pi_runtime_core::RuntimeEvent;
use std::time::{Duration, Instant};

/// Events emitted by the retry engine.
#[derive(Debug, Clone)]
pub enum RetryEvent {
    /// A retry attempt is about to be made.
    Retry {
        key: String,
        timestamp: Instant,
        attempt: usize,
        delay: Duration,
    },
    /// The operation succeeded, either on the first attempt or after retries.
    Success {
        key: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// The operation failed after exhausting `maxRetries`, or the error was
    /// not retryable.
    Error {
        key: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// An error occurred but `shouldRetry` returned false.
    IgnoredError { key: String, timestamp: Instant },
    /// `enableCircuitBreaker` rejected the call before it was attempted.
    CircuitBreakerOpen {
        key: String,
        timestamp: Instant,
        retry_after: Duration,
    },
}

impl RetryEvent {
    fn key(&self) -> &str {
        match self {
            RetryEvent::Retry { key, .. }
            | RetryEvent::Success { key, .. }
            | RetryEvent::Error { key, .. }
            | RetryEvent::IgnoredError { key, .. }
            | RetryEvent::CircuitBreakerOpen { key, .. } => key,
        }
    }
}

impl RuntimeEvent for RetryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RetryEvent::Retry { .. } => "retry",
            RetryEvent::Success { .. } => "success",
            RetryEvent::Error { .. } => "error",
            RetryEvent::IgnoredError { .. } => "ignored_error",
            RetryEvent::CircuitBreakerOpen { .. } => "circuit_breaker_open",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RetryEvent::Retry { timestamp, .. }
            | RetryEvent::Success { timestamp, .. }
            | RetryEvent::Error { timestamp, .. }
            | RetryEvent::IgnoredError { timestamp, .. }
            | RetryEvent::CircuitBreakerOpen { timestamp, .. } => *timestamp,
        }
    }

    fn component_name(&self) -> &str {
        self.key()
    }
}
