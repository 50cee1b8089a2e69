//! Backoff-based retry engine for the runtime orchestration core.
//!
//! [`retry`] wraps an arbitrary async operation, consulting a
//! [`pi_runtime_breaker::BreakerRegistry`] and [`pi_runtime_limiter::LimiterRegistry`]
//! before each attempt and feeding outcomes back into the breaker.
//!
//! ## Example
//!
//! ```rust
//! use pi_runtime_retry::{retry, RetryOptions};
//! use pi_runtime_core::RuntimeError;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), RuntimeError> {
//! let opts = RetryOptions::builder().max_retries(2).build();
//! let token = CancellationToken::new();
//!
//! let result = retry(
//!     || async { Ok::<_, RuntimeError>("ok") },
//!     &opts,
//!     None,
//!     None,
//!     &token,
//! )
//! .await?;
//! assert_eq!(result, "ok");
//! # Ok(())
//! # }
//! ```

mod backoff;
mod config;
mod events;

pub use config::{RetryOptions, RetryOptionsBuilder, ShouldRetry};
pub use events::RetryEvent;

use pi_runtime_breaker::BreakerRegistry;
use pi_runtime_core::RuntimeError;
use pi_runtime_limiter::LimiterRegistry;
use std::future::Future;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// `retry(op, opts) -> result`.
///
/// 1. If `circuit_breaker_key` is set, checks the breaker; an open circuit fails
///    immediately with [`RuntimeError::circuit_open`].
/// 2. If `rate_limit_key` is set, waits for a slot.
/// 3. Invokes `op`. On success, records it with the breaker and returns.
/// 4. On failure, records it with the breaker; if `shouldRetry` says no or
///    attempts are exhausted, propagates the error.
/// 5. Otherwise sleeps for a computed backoff delay (or the error's own
///    `Retry-After`, whichever is larger), cancelable, and loops.
pub async fn retry<T, F, Fut>(
    mut op: F,
    opts: &RetryOptions,
    breaker: Option<&BreakerRegistry>,
    limiter: Option<&LimiterRegistry>,
    cancel: &CancellationToken,
) -> Result<T, RuntimeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RuntimeError>>,
{
    let mut attempt = 0;

    loop {
        if let (Some(key), Some(breaker)) = (&opts.circuit_breaker_key, breaker) {
            let (allowed, retry_after) = breaker.check(key);
            if !allowed {
                opts.event_listeners.emit(&RetryEvent::CircuitBreakerOpen {
                    key: key.clone(),
                    timestamp: Instant::now(),
                    retry_after,
                });
                return Err(RuntimeError::circuit_open(key, retry_after));
            }
        }

        if let (Some(key), Some(limiter)) = (&opts.rate_limit_key, limiter) {
            limiter.wait_for_slot(key, cancel.cancelled()).await?;
        }

        match op().await {
            Ok(value) => {
                if let (Some(key), Some(breaker)) = (&opts.circuit_breaker_key, breaker) {
                    breaker.record_success(key);
                }
                opts.event_listeners.emit(&RetryEvent::Success {
                    key: opts.circuit_breaker_key.clone().unwrap_or_default(),
                    timestamp: Instant::now(),
                    attempts: attempt + 1,
                });
                return Ok(value);
            }
            Err(err) => {
                if let (Some(key), Some(breaker)) = (&opts.circuit_breaker_key, breaker) {
                    breaker.record_failure(key);
                }

                let key = opts.circuit_breaker_key.clone().unwrap_or_default();

                if !(opts.should_retry)(&err, attempt) {
                    opts.event_listeners.emit(&RetryEvent::IgnoredError {
                        key,
                        timestamp: Instant::now(),
                    });
                    return Err(err);
                }

                if attempt >= opts.max_retries {
                    opts.event_listeners.emit(&RetryEvent::Error {
                        key,
                        timestamp: Instant::now(),
                        attempts: attempt + 1,
                    });
                    return Err(err);
                }

                let computed = backoff::compute_delay(
                    opts.initial_delay,
                    opts.max_delay,
                    opts.backoff_factor,
                    opts.jitter,
                    attempt,
                );
                let delay = match err.retry_after() {
                    Some(retry_after) => computed.max(retry_after),
                    None => computed,
                };

                opts.event_listeners.emit(&RetryEvent::Retry {
                    key,
                    timestamp: Instant::now(),
                    attempt,
                    delay,
                });

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(RuntimeError::cancelled()),
                }

                attempt += 1;
            }
        }
    }
}
