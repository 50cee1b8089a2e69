use std::time::Duration;

/// Static admission limits the scheduler recomputes C6/C7 adjustments against.
/// Mutable at runtime via [`crate::Scheduler::reload`] (config reload, §4.8).
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub(crate) base_max_requests: usize,
    pub(crate) base_max_llm: usize,
    pub(crate) recompute_interval: Duration,
    pub(crate) penalty_key: String,
}

impl SchedulerConfig {
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder::new()
    }
}

pub struct SchedulerConfigBuilder {
    base_max_requests: usize,
    base_max_llm: usize,
    recompute_interval: Duration,
    penalty_key: String,
}

impl SchedulerConfigBuilder {
    pub fn new() -> Self {
        Self {
            base_max_requests: 25,
            base_max_llm: 10,
            recompute_interval: Duration::from_secs(5),
            penalty_key: "global".to_string(),
        }
    }

    pub fn base_max_requests(mut self, value: usize) -> Self {
        self.base_max_requests = value;
        self
    }

    pub fn base_max_llm(mut self, value: usize) -> Self {
        self.base_max_llm = value;
        self
    }

    /// How often `request()` re-derives limits from C6's fair share and C7's
    /// penalty even without an explicit `reload` call (§4.6: "periodic (5 s) ticks").
    pub fn recompute_interval(mut self, interval: Duration) -> Self {
        self.recompute_interval = interval;
        self
    }

    /// Key under which C7's adaptive penalty is tracked for this scheduler's
    /// overall LLM budget.
    pub fn penalty_key(mut self, key: impl Into<String>) -> Self {
        self.penalty_key = key.into();
        self
    }

    pub fn build(self) -> SchedulerConfig {
        SchedulerConfig {
            base_max_requests: self.base_max_requests,
            base_max_llm: self.base_max_llm,
            recompute_interval: self.recompute_interval,
            penalty_key: self.penalty_key,
        }
    }
}

impl Default for SchedulerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
