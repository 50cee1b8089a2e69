use crate::config::BreakerConfig;
use crate::events::BreakerEvent;
#[cfg(feature = "metrics")]
use metrics::{counter, gauge};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;

/// State of a keyed circuit breaker, per spec's `CircuitBreakerState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    /// Calls are allowed; failures accumulate toward `failureThreshold`.
    Closed = 0,
    /// Calls are rejected until `cooldownMs` elapses.
    Open = 1,
    /// A probe is allowed through; success accumulates toward `successThreshold`.
    HalfOpen = 2,
}

impl CircuitState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

/// Point-in-time view of a breaker's counters, returned by `getStats`.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitMetrics {
    pub state: CircuitState,
    pub failure_count: usize,
    pub success_count: usize,
    pub opened_at: Option<Instant>,
    pub time_since_state_change: std::time::Duration,
}

/// Per-key circuit state: `failureCount`/`successCount`/`openedAt` (spec §3).
pub(crate) struct Circuit {
    state: CircuitState,
    state_atomic: std::sync::Arc<AtomicU8>,
    last_state_change: Instant,
    opened_at: Option<Instant>,
    failure_count: usize,
    success_count: usize,
}

impl Default for Circuit {
    fn default() -> Self {
        Self::new_with_atomic(std::sync::Arc::new(AtomicU8::new(CircuitState::Closed as u8)))
    }
}

impl Circuit {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn new_with_atomic(state_atomic: std::sync::Arc<AtomicU8>) -> Self {
        Self {
            state: CircuitState::Closed,
            state_atomic,
            last_state_change: Instant::now(),
            opened_at: None,
            failure_count: 0,
            success_count: 0,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn metrics(&self) -> CircuitMetrics {
        CircuitMetrics {
            state: self.state,
            failure_count: self.failure_count,
            success_count: self.success_count,
            opened_at: self.opened_at,
            time_since_state_change: self.last_state_change.elapsed(),
        }
    }

    /// `recordSuccess(key)`: in closed, reset `failureCount`; in half-open,
    /// increment `successCount` and transition to closed at `successThreshold`.
    pub fn record_success(&mut self, key: &str, config: &BreakerConfig) {
        match self.state {
            CircuitState::HalfOpen => {
                self.success_count += 1;
                if self.success_count >= config.success_threshold {
                    self.transition_to(key, CircuitState::Closed, config);
                }
            }
            CircuitState::Closed => {
                self.failure_count = 0;
            }
            CircuitState::Open => {}
        }

        config.event_listeners.emit(&BreakerEvent::SuccessRecorded {
            key: key.to_string(),
            timestamp: Instant::now(),
            state: self.state,
        });

        #[cfg(feature = "metrics")]
        counter!("breaker_calls_total", "key" => key.to_string(), "outcome" => "success").increment(1);
    }

    /// `recordFailure(key)`: in closed, increment and open at `failureThreshold`;
    /// in half-open, immediately back to open.
    pub fn record_failure(&mut self, key: &str, config: &BreakerConfig) {
        match self.state {
            CircuitState::HalfOpen => {
                self.transition_to(key, CircuitState::Open, config);
            }
            CircuitState::Closed => {
                self.failure_count += 1;
                if self.failure_count >= config.failure_threshold {
                    self.transition_to(key, CircuitState::Open, config);
                }
            }
            CircuitState::Open => {}
        }

        config.event_listeners.emit(&BreakerEvent::FailureRecorded {
            key: key.to_string(),
            timestamp: Instant::now(),
            state: self.state,
        });

        #[cfg(feature = "metrics")]
        counter!("breaker_calls_total", "key" => key.to_string(), "outcome" => "failure").increment(1);
    }

    /// `check(key)`: the open→half-open tie-break happens here.
    pub fn check(&mut self, key: &str, config: &BreakerConfig) -> (bool, std::time::Duration) {
        match self.state {
            CircuitState::Closed => {
                self.emit_permitted(key, config);
                (true, std::time::Duration::ZERO)
            }
            CircuitState::Open => {
                let elapsed = self.last_state_change.elapsed();
                if elapsed >= config.cooldown {
                    self.transition_to(key, CircuitState::HalfOpen, config);
                    self.emit_permitted(key, config);
                    (true, std::time::Duration::ZERO)
                } else {
                    let retry_after = config.cooldown - elapsed;
                    self.emit_rejected(key, config, retry_after);
                    (false, retry_after)
                }
            }
            CircuitState::HalfOpen => {
                // Looseness documented: callers may race for the single probe slot.
                self.emit_permitted(key, config);
                (true, std::time::Duration::ZERO)
            }
        }
    }

    pub fn reset(&mut self, key: &str, config: &BreakerConfig) {
        self.transition_to(key, CircuitState::Closed, config);
    }

    fn emit_permitted(&self, key: &str, config: &BreakerConfig) {
        config.event_listeners.emit(&BreakerEvent::CallPermitted {
            key: key.to_string(),
            timestamp: Instant::now(),
            state: self.state,
        });
    }

    fn emit_rejected(&self, key: &str, config: &BreakerConfig, retry_after: std::time::Duration) {
        config.event_listeners.emit(&BreakerEvent::CallRejected {
            key: key.to_string(),
            timestamp: Instant::now(),
            retry_after,
        });
    }

    fn transition_to(&mut self, key: &str, state: CircuitState, config: &BreakerConfig) {
        if self.state == state {
            return;
        }

        let from_state = self.state;

        config.event_listeners.emit(&BreakerEvent::StateTransition {
            key: key.to_string(),
            timestamp: Instant::now(),
            from_state,
            to_state: state,
        });

        #[cfg(feature = "tracing")]
        tracing::info!(key, from = ?from_state, to = ?state, "circuit state transition");

        #[cfg(feature = "metrics")]
        {
            counter!(
                "breaker_transitions_total",
                "key" => key.to_string(),
                "from" => match from_state {
                    CircuitState::Closed => "closed",
                    CircuitState::Open => "open",
                    CircuitState::HalfOpen => "half_open",
                },
                "to" => match state {
                    CircuitState::Closed => "closed",
                    CircuitState::Open => "open",
                    CircuitState::HalfOpen => "half_open",
                }
            )
            .increment(1);

            gauge!("breaker_state", "key" => key.to_string()).set(state as u8 as f64);
        }

        self.state = state;
        self.state_atomic.store(state as u8, Ordering::Release);
        self.last_state_change = Instant::now();
        self.failure_count = 0;
        self.success_count = 0;
        self.opened_at = if matches!(state, CircuitState::Open) {
            Some(self.last_state_change)
        } else {
            None
        };
    }
}
