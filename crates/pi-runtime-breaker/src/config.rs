use crate::events::BreakerEvent;
use pi_runtime_core::EventListeners;
use std::time::Duration;

/// Tunables for a keyed circuit breaker, shared by every key in a registry.
///
/// Unlike a rate-threshold breaker over a sliding window of calls, this tracks
/// plain consecutive-count thresholds per key: `failureCount`/`successCount`
/// reset on every state transition.
pub struct BreakerConfig {
    pub(crate) failure_threshold: usize,
    pub(crate) success_threshold: usize,
    pub(crate) cooldown: Duration,
    pub(crate) event_listeners: EventListeners<BreakerEvent>,
}

impl BreakerConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> BreakerConfigBuilder {
        BreakerConfigBuilder::new()
    }
}

/// Builder for [`BreakerConfig`].
pub struct BreakerConfigBuilder {
    failure_threshold: usize,
    success_threshold: usize,
    cooldown: Duration,
    event_listeners: EventListeners<BreakerEvent>,
}

impl BreakerConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            cooldown: Duration::from_secs(30),
            event_listeners: EventListeners::new(),
        }
    }

    /// Number of consecutive closed-state failures before the breaker opens.
    ///
    /// Default: 5
    pub fn failure_threshold(mut self, n: usize) -> Self {
        self.failure_threshold = n;
        self
    }

    /// Number of consecutive half-open successes before the breaker closes.
    ///
    /// Default: 2
    pub fn success_threshold(mut self, n: usize) -> Self {
        self.success_threshold = n;
        self
    }

    /// How long the breaker stays open before allowing a half-open probe.
    ///
    /// Default: 30s
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Register a callback for state transition events.
    pub fn on_state_transition<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, crate::CircuitState, crate::CircuitState) + Send + Sync + 'static,
    {
        use pi_runtime_core::FnListener;
        self.event_listeners.add(FnListener::new(move |event: &BreakerEvent| {
            if let BreakerEvent::StateTransition {
                key,
                from_state,
                to_state,
                ..
            } = event
            {
                f(key, *from_state, *to_state);
            }
        }));
        self
    }

    /// Register a callback for call rejected events.
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, Duration) + Send + Sync + 'static,
    {
        use pi_runtime_core::FnListener;
        self.event_listeners.add(FnListener::new(move |event: &BreakerEvent| {
            if let BreakerEvent::CallRejected { key, retry_after, .. } = event {
                f(key, *retry_after);
            }
        }));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            cooldown: self.cooldown,
            event_listeners: self.event_listeners,
        }
    }
}

impl Default for BreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
