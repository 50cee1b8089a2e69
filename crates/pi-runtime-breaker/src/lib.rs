//! Per-key circuit breaker for the runtime orchestration core.
//!
//! Breakers, like rate limit buckets, are process-wide singletons keyed by string
//! (a provider name, an MCP server id). [`BreakerRegistry`] owns one [`Circuit`] per
//! key behind a per-key mutex so transitions are linearisable without serializing
//! unrelated keys against each other.
//!
//! ## Example
//!
//! ```rust
//! use pi_runtime_breaker::{BreakerConfig, BreakerRegistry};
//!
//! let registry = BreakerRegistry::new(BreakerConfig::builder().failure_threshold(3).build());
//! let (allowed, _retry_after) = registry.check("anthropic");
//! assert!(allowed);
//! registry.record_success("anthropic");
//! ```

mod circuit;
mod config;
mod error;
mod events;

pub use circuit::{CircuitMetrics, CircuitState};
pub use config::{BreakerConfig, BreakerConfigBuilder};
pub use events::BreakerEvent;

use circuit::Circuit;
use pi_runtime_core::RuntimeError;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::Duration;

/// A process-wide registry of keyed circuit breakers sharing one [`BreakerConfig`].
pub struct BreakerRegistry {
    config: BreakerConfig,
    circuits: RwLock<HashMap<String, Mutex<Circuit>>>,
}

impl BreakerRegistry {
    /// Creates a new registry. Breakers for unseen keys are created lazily on
    /// first access, starting `closed`.
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            circuits: RwLock::new(HashMap::new()),
        }
    }

    fn with_circuit<T>(&self, key: &str, f: impl FnOnce(&mut Circuit) -> T) -> T {
        if let Some(circuit) = self.circuits.read().unwrap().get(key) {
            return f(&mut circuit.lock().unwrap());
        }

        let mut circuits = self.circuits.write().unwrap();
        let circuit = circuits.entry(key.to_string()).or_insert_with(|| Mutex::new(Circuit::default()));
        f(&mut circuit.lock().unwrap())
    }

    /// `check(key) -> {allowed, retryAfterMs?}`. Transitions `open` to `half-open`
    /// when the cooldown has elapsed.
    pub fn check(&self, key: &str) -> (bool, Duration) {
        self.with_circuit(key, |circuit| circuit.check(key, &self.config))
    }

    /// `check`, returning a [`RuntimeError::circuit_open`] instead of a bool pair.
    pub fn try_acquire(&self, key: &str) -> Result<(), RuntimeError> {
        let (allowed, retry_after) = self.check(key);
        if allowed {
            Ok(())
        } else {
            Err(error::circuit_open(key, retry_after))
        }
    }

    /// `recordSuccess(key)`.
    pub fn record_success(&self, key: &str) {
        self.with_circuit(key, |circuit| circuit.record_success(key, &self.config));
    }

    /// `recordFailure(key)`.
    pub fn record_failure(&self, key: &str) {
        self.with_circuit(key, |circuit| circuit.record_failure(key, &self.config));
    }

    /// `reset(key)`: forces the breaker for `key` back to `closed`.
    pub fn reset(&self, key: &str) {
        self.with_circuit(key, |circuit| circuit.reset(key, &self.config));
    }

    /// `resetAll()`.
    pub fn reset_all(&self) {
        let keys: Vec<String> = self.circuits.read().unwrap().keys().cloned().collect();
        for key in keys {
            self.reset(&key);
        }
    }

    /// `getStats()`: a snapshot of every known key's circuit metrics.
    pub fn get_stats(&self) -> HashMap<String, CircuitMetrics> {
        self.circuits
            .read()
            .unwrap()
            .iter()
            .map(|(key, circuit)| (key.clone(), circuit.lock().unwrap().metrics()))
            .collect()
    }

    /// Current state for a single key, without mutating it.
    pub fn state(&self, key: &str) -> CircuitState {
        self.with_circuit(key, |circuit| circuit.state())
    }
}
