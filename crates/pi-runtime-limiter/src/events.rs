use pi_runtime_core::RuntimeEvent;
use std::time::{Duration, Instant};

/// Events emitted by the rate limit gate.
#[derive(Debug, Clone)]
pub enum LimiterEvent {
    /// A slot was granted, possibly after waiting.
    SlotGranted {
        key: String,
        timestamp: Instant,
        waited: Duration,
    },
    /// A slot was denied outright because the projected wait exceeded
    /// `fastFailThresholdMs`.
    FastFailed {
        key: String,
        timestamp: Instant,
        projected_wait: Duration,
    },
    /// `recordFailure` detected a rate-limit signature and set a cooldown.
    CooldownSet {
        key: String,
        timestamp: Instant,
        cooldown: Duration,
    },
}

impl LimiterEvent {
    fn key(&self) -> &str {
        match self {
            LimiterEvent::SlotGranted { key, .. }
            | LimiterEvent::FastFailed { key, .. }
            | LimiterEvent::CooldownSet { key, .. } => key,
        }
    }
}

impl RuntimeEvent for LimiterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LimiterEvent::SlotGranted { .. } => "slot_granted",
            LimiterEvent::FastFailed { .. } => "fast_failed",
            LimiterEvent::CooldownSet { .. } => "cooldown_set",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            LimiterEvent::SlotGranted { timestamp, .. }
            | LimiterEvent::FastFailed { timestamp, .. }
            | LimiterEvent::CooldownSet { timestamp, .. } => *timestamp,
        }
    }

    fn component_name(&self) -> &str {
        self.key()
    }
}
