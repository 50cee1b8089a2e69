use crate::events::RetryEvent;
use pi_runtime_core::{EventListeners, FnListener, RuntimeError};
use std::sync::Arc;
use std::time::Duration;

/// `shouldRetry(err, attempt) -> bool` predicate. Defaults to `RuntimeError::is_retryable`,
/// which already covers network errors and HTTP 429/5xx (see [`RuntimeError::llm_error`]).
pub type ShouldRetry = Arc<dyn Fn(&RuntimeError, usize) -> bool + Send + Sync>;

/// Tunables for a single [`crate::retry`] call.
pub struct RetryOptions {
    pub(crate) max_retries: usize,
    pub(crate) initial_delay: Duration,
    pub(crate) max_delay: Duration,
    pub(crate) backoff_factor: f64,
    pub(crate) jitter: Duration,
    pub(crate) should_retry: ShouldRetry,
    pub(crate) rate_limit_key: Option<String>,
    pub(crate) circuit_breaker_key: Option<String>,
    pub(crate) event_listeners: EventListeners<RetryEvent>,
}

impl RetryOptions {
    /// Creates a new options builder.
    pub fn builder() -> RetryOptionsBuilder {
        RetryOptionsBuilder::new()
    }
}

/// Builder for [`RetryOptions`].
pub struct RetryOptionsBuilder {
    max_retries: usize,
    initial_delay: Duration,
    max_delay: Duration,
    backoff_factor: f64,
    jitter: Duration,
    should_retry: ShouldRetry,
    rate_limit_key: Option<String>,
    circuit_breaker_key: Option<String>,
    event_listeners: EventListeners<RetryEvent>,
}

impl RetryOptionsBuilder {
    /// Defaults: `maxRetries=3`, 200ms initial delay, 10s max delay, factor 2.0,
    /// 100ms jitter, retry iff `RuntimeError::is_retryable`.
    pub fn new() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
            jitter: Duration::from_millis(100),
            should_retry: Arc::new(|err: &RuntimeError, _attempt: usize| err.is_retryable()),
            rate_limit_key: None,
            circuit_breaker_key: None,
            event_listeners: EventListeners::new(),
        }
    }

    /// Maximum number of retries after the initial attempt.
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Initial backoff delay.
    pub fn initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    /// Backoff delay ceiling.
    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Multiplier applied to the delay on each successive attempt.
    pub fn backoff_factor(mut self, backoff_factor: f64) -> Self {
        self.backoff_factor = backoff_factor;
        self
    }

    /// Upper bound of the random jitter added to every computed delay.
    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Overrides the default retry predicate.
    pub fn should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&RuntimeError, usize) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    /// Key passed to a [`pi_runtime_limiter::LimiterRegistry`] before each attempt.
    pub fn rate_limit_key(mut self, key: impl Into<String>) -> Self {
        self.rate_limit_key = Some(key.into());
        self
    }

    /// Key checked against a [`pi_runtime_breaker::BreakerRegistry`] before each attempt.
    pub fn circuit_breaker_key(mut self, key: impl Into<String>) -> Self {
        self.circuit_breaker_key = Some(key.into());
        self
    }

    /// Registers a callback invoked when the circuit breaker rejects a call
    /// before it is attempted. Mirrors `onCircuitBreakerOpen(key, retryAfterMs)`.
    pub fn on_circuit_breaker_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &RetryEvent| {
            if let RetryEvent::CircuitBreakerOpen { key, retry_after, .. } = event {
                f(key, *retry_after);
            }
        }));
        self
    }

    /// Registers a callback invoked before sleeping for a retry.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &RetryEvent| {
            if let RetryEvent::Retry { attempt, delay, .. } = event {
                f(*attempt, *delay);
            }
        }));
        self
    }

    /// Builds the options.
    pub fn build(self) -> RetryOptions {
        RetryOptions {
            max_retries: self.max_retries,
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
            backoff_factor: self.backoff_factor,
            jitter: self.jitter,
            should_retry: self.should_retry,
            rate_limit_key: self.rate_limit_key,
            circuit_breaker_key: self.circuit_breaker_key,
            event_listeners: self.event_listeners,
        }
    }
}

impl Default for RetryOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
