use crate::events::LimiterEvent;
use pi_runtime_core::EventListeners;
use std::time::Duration;

/// Tunables shared by every key in a [`crate::LimiterRegistry`].
pub struct LimiterConfig {
    pub(crate) rpm: usize,
    pub(crate) window: Duration,
    pub(crate) fast_fail_threshold: Duration,
    pub(crate) default_cooldown: Duration,
    pub(crate) event_listeners: EventListeners<LimiterEvent>,
}

impl LimiterConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> LimiterConfigBuilder {
        LimiterConfigBuilder::new()
    }
}

/// Builder for [`LimiterConfig`].
pub struct LimiterConfigBuilder {
    rpm: usize,
    window: Duration,
    fast_fail_threshold: Duration,
    default_cooldown: Duration,
    event_listeners: EventListeners<LimiterEvent>,
}

impl LimiterConfigBuilder {
    /// Defaults: 60 requests per 60s window, no fast-fail threshold (waits
    /// indefinitely), 60s default cooldown when a 429 carries no `Retry-After`.
    pub fn new() -> Self {
        Self {
            rpm: 60,
            window: Duration::from_secs(60),
            fast_fail_threshold: Duration::from_secs(3600),
            default_cooldown: Duration::from_secs(60),
            event_listeners: EventListeners::new(),
        }
    }

    /// Requests permitted per sliding window.
    pub fn rpm(mut self, rpm: usize) -> Self {
        self.rpm = rpm;
        self
    }

    /// Sliding window duration. Spec default: 60,000 ms.
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// If the projected wait exceeds this, `wait_for_slot` fast-fails instead
    /// of sleeping.
    pub fn fast_fail_threshold(mut self, threshold: Duration) -> Self {
        self.fast_fail_threshold = threshold;
        self
    }

    /// Cooldown applied when `record_failure` detects a rate-limit signature
    /// with no parseable `Retry-After`.
    pub fn default_cooldown(mut self, cooldown: Duration) -> Self {
        self.default_cooldown = cooldown;
        self
    }

    /// Register a callback for cooldown-set events.
    pub fn on_cooldown_set<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, Duration) + Send + Sync + 'static,
    {
        use pi_runtime_core::FnListener;
        self.event_listeners.add(FnListener::new(move |event: &LimiterEvent| {
            if let LimiterEvent::CooldownSet { key, cooldown, .. } = event {
                f(key, *cooldown);
            }
        }));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> LimiterConfig {
        LimiterConfig {
            rpm: self.rpm,
            window: self.window,
            fast_fail_threshold: self.fast_fail_threshold,
            default_cooldown: self.default_cooldown,
            event_listeners: self.event_listeners,
        }
    }
}

impl Default for LimiterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
