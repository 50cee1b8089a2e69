//! Per-key sliding-window rate limit gate for the runtime orchestration core.
//!
//! Buckets are process-wide singletons keyed by provider name. Per the data model,
//! the window is a 60,000 ms sliding log. [`LimiterRegistry::with_store`] wires a
//! [`pi_runtime_store::StateStore`] backing file (`<runtime>/print-throttle.json`,
//! spec §6) so the bucket for a key is shared across every process that points at
//! the same path; without it, a registry only ever sees its own process's calls.
//!
//! ## Example
//!
//! ```rust
//! use pi_runtime_limiter::{LimiterConfig, LimiterRegistry};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let registry = LimiterRegistry::new(LimiterConfig::builder().rpm(10).build());
//! let waited = registry.wait_for_slot("anthropic", std::future::pending::<()>()).await.unwrap();
//! assert_eq!(waited, Duration::ZERO);
//! # }
//! ```

mod config;
mod error;
mod events;
mod limiter;

pub use config::{LimiterConfig, LimiterConfigBuilder};
pub use events::LimiterEvent;

use limiter::{now_ms, Bucket, PersistedBucket};
use pi_runtime_core::RuntimeError;
use pi_runtime_store::StateStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

/// The `<runtime>/print-throttle.json` document (spec §6): a versioned map of
/// per-key bucket state, written atomically through [`StateStore::with_lock`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PrintThrottleFile {
    version: u32,
    updated_at: u64,
    states: HashMap<String, PersistedBucket>,
}

struct Persistence {
    store: Arc<StateStore>,
    path: PathBuf,
}

/// A process-wide registry of keyed rate-limit buckets sharing one [`LimiterConfig`].
pub struct LimiterRegistry {
    config: LimiterConfig,
    buckets: RwLock<HashMap<String, Mutex<Bucket>>>,
    persistence: Option<Persistence>,
}

impl LimiterRegistry {
    /// Creates a new registry. Buckets for unseen keys are created lazily.
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config,
            buckets: RwLock::new(HashMap::new()),
            persistence: None,
        }
    }

    /// Shares bucket state for every key through `path`, guarded by `store`'s
    /// advisory file lock, so concurrent processes admit against the same
    /// ring/cooldown instead of each keeping an independent in-process count.
    pub fn with_store(mut self, store: Arc<StateStore>, path: impl Into<PathBuf>) -> Self {
        self.persistence = Some(Persistence {
            store,
            path: path.into(),
        });
        self
    }

    fn with_bucket<T>(&self, key: &str, f: impl FnOnce(&mut Bucket) -> T) -> T {
        if let Some(bucket) = self.buckets.read().unwrap().get(key) {
            return f(&mut bucket.lock().unwrap());
        }

        let mut buckets = self.buckets.write().unwrap();
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| Mutex::new(Bucket::new(self.config.rpm, self.config.window)));
        f(&mut bucket.lock().unwrap())
    }

    /// Runs `f` against the bucket for `key` hydrated from the shared file,
    /// persisting whatever `f` leaves the bucket in before releasing the lock.
    /// Returns whatever `f` returns.
    async fn with_persisted_bucket<T: Send + 'static>(
        &self,
        persistence: &Persistence,
        key: &str,
        f: impl FnOnce(&mut Bucket) -> T + Send + 'static,
    ) -> Result<T, RuntimeError> {
        let key_owned = key.to_string();
        let rpm = self.config.rpm;
        let window = self.config.window;
        let outcome: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));
        let outcome_slot = Arc::clone(&outcome);

        persistence
            .store
            .with_lock(&persistence.path, move |mut file: PrintThrottleFile| {
                let now = now_ms();
                let persisted = file.states.remove(&key_owned).unwrap_or_default();
                let mut bucket = Bucket::hydrate(rpm, window, persisted, now);
                let result = f(&mut bucket);
                *outcome_slot.lock().unwrap() = Some(result);
                file.states.insert(key_owned.clone(), bucket.to_persisted());
                file.version = 1;
                file.updated_at = now_ms();
                file
            })
            .await?;

        Ok(outcome
            .lock()
            .unwrap()
            .take()
            .expect("with_lock always invokes its closure exactly once"))
    }

    async fn try_acquire(&self, key: &str) -> Result<Result<(), Duration>, RuntimeError> {
        match &self.persistence {
            Some(persistence) => self.with_persisted_bucket(persistence, key, |bucket| bucket.try_acquire()).await,
            None => Ok(self.with_bucket(key, |bucket| bucket.try_acquire())),
        }
    }

    /// `waitForSlot(key, signal)`: blocks until a slot is available within the
    /// sliding window, honouring `cancel`. Fast-fails with
    /// [`RuntimeError::rate_limited`] if the projected wait exceeds
    /// `fastFailThresholdMs`.
    pub async fn wait_for_slot(
        &self,
        key: &str,
        cancel: impl Future<Output = ()>,
    ) -> Result<Duration, RuntimeError> {
        tokio::pin!(cancel);
        let start = Instant::now();

        loop {
            let attempt = self.try_acquire(key).await?;

            match attempt {
                Ok(()) => {
                    let waited = start.elapsed();
                    self.config.event_listeners.emit(&LimiterEvent::SlotGranted {
                        key: key.to_string(),
                        timestamp: Instant::now(),
                        waited,
                    });
                    return Ok(waited);
                }
                Err(wait) => {
                    if wait > self.config.fast_fail_threshold {
                        self.config.event_listeners.emit(&LimiterEvent::FastFailed {
                            key: key.to_string(),
                            timestamp: Instant::now(),
                            projected_wait: wait,
                        });
                        return Err(error::rate_limit_fast_fail(wait));
                    }

                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = &mut cancel => return Err(RuntimeError::cancelled()),
                    }
                }
            }
        }
    }

    /// `recordFailure(key, stderrText)`: scans for rate-limit signatures and, if
    /// present, sets `cooldownUntil`.
    pub async fn record_failure(&self, key: &str, stderr_text: &str) {
        let Some(retry_after) = limiter::detect_rate_limit_signature(stderr_text) else {
            return;
        };
        let cooldown = retry_after.unwrap_or(self.config.default_cooldown);

        match &self.persistence {
            Some(persistence) => {
                let _ = self
                    .with_persisted_bucket(persistence, key, move |bucket| bucket.set_cooldown(cooldown))
                    .await;
            }
            None => self.with_bucket(key, |bucket| bucket.set_cooldown(cooldown)),
        }

        self.config.event_listeners.emit(&LimiterEvent::CooldownSet {
            key: key.to_string(),
            timestamp: Instant::now(),
            cooldown,
        });
    }

    /// Available permits for `key` right now, without mutating state. Reflects
    /// only this process's in-memory bucket; when [`with_store`](Self::with_store)
    /// is configured, the authoritative count lives in the shared file and may
    /// differ if a peer process has consumed slots.
    pub fn available(&self, key: &str) -> usize {
        self.with_bucket(key, |bucket| bucket.available())
    }
}
