//! Sliding-window outcome tracker deriving a multiplicative penalty per key.
//!
//! Keeps the last *N* outcomes per key and derives a penalty in `[0, 1]` from the
//! observed error rate. Recovery is deliberately slower than degradation: a
//! worsening error rate drops the penalty immediately, but improvement only
//! snaps the penalty upward in 0.1 increments once `successes_to_recover`
//! consecutive calls have succeeded, to avoid flapping the limit C5 derives from it.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

/// The result of a single call, as recorded by [`AdaptiveController::record_outcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Error,
    Timeout,
    RateLimit,
}

impl Outcome {
    fn is_failure(self) -> bool {
        !matches!(self, Outcome::Success)
    }
}

struct Window {
    outcomes: VecDeque<Outcome>,
    capacity: usize,
    penalty: f64,
    successes_since_penalty_change: usize,
}

impl Window {
    fn new(capacity: usize) -> Self {
        Self {
            outcomes: VecDeque::with_capacity(capacity),
            capacity,
            penalty: 1.0,
            successes_since_penalty_change: 0,
        }
    }

    fn error_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let errors = self.outcomes.iter().filter(|o| o.is_failure()).count();
        errors as f64 / self.outcomes.len() as f64
    }

    fn target_penalty(&self) -> f64 {
        let e = self.error_rate();
        if e < 0.1 {
            1.0
        } else {
            (1.0 - 2.0 * e).max(0.25)
        }
    }

    fn record(&mut self, outcome: Outcome, successes_to_recover: usize) {
        if self.outcomes.len() == self.capacity {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(outcome);

        let target = self.target_penalty();

        if target < self.penalty {
            self.penalty = target;
            self.successes_since_penalty_change = 0;
            return;
        }

        if target > self.penalty {
            match outcome {
                Outcome::Success => {
                    self.successes_since_penalty_change += 1;
                    if self.successes_since_penalty_change >= successes_to_recover {
                        self.penalty = (self.penalty + 0.1).min(target);
                        self.successes_since_penalty_change = 0;
                    }
                }
                _ => self.successes_since_penalty_change = 0,
            }
        }
    }
}

/// Process-wide, per-key adaptive rate controller (§4.7).
pub struct AdaptiveController {
    window_size: usize,
    successes_to_recover: usize,
    windows: RwLock<HashMap<String, Window>>,
}

impl AdaptiveController {
    /// `window_size` is the sliding window length *N* (spec default 50).
    /// `successes_to_recover` is the hysteresis step *M* (default 5).
    pub fn new(window_size: usize, successes_to_recover: usize) -> Self {
        Self {
            window_size,
            successes_to_recover,
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Records a call outcome for `key`.
    pub fn record_outcome(&self, key: &str, outcome: Outcome) {
        let mut windows = self.windows.write().unwrap();
        let window = windows
            .entry(key.to_string())
            .or_insert_with(|| Window::new(self.window_size));
        window.record(outcome, self.successes_to_recover);
    }

    /// Current multiplicative penalty for `key`, in `[0, 1]`. Unseen keys are 1.0.
    pub fn penalty(&self, key: &str) -> f64 {
        self.windows
            .read()
            .unwrap()
            .get(key)
            .map(|w| w.penalty)
            .unwrap_or(1.0)
    }
}

impl Default for AdaptiveController {
    fn default() -> Self {
        Self::new(50, 5)
    }
}
