use std::collections::VecDeque;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// On-disk form of a [`Bucket`] (`<runtime>/print-throttle.json`'s `states[key]`,
/// spec §6): wall-clock milliseconds in place of `Bucket`'s process-local
/// `Instant`s, so a bucket hydrated by a different process lands on the same
/// admission decision.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct PersistedBucket {
    pub request_starts_ms: Vec<u64>,
    pub cooldown_until_ms: Option<u64>,
    pub last_accessed_ms: u64,
}

/// Per-key sliding-log bucket: "ring of recent request-start timestamps" plus
/// `cooldownUntil`/`lastAccessedAt` (spec §3 `RateLimitBucket`).
pub(crate) struct Bucket {
    rpm: usize,
    window: Duration,
    ring: VecDeque<Instant>,
    cooldown_until: Option<Instant>,
    pub(crate) last_accessed_at: Instant,
    // Fixed (Instant, epoch ms) pair this bucket was created with, used to
    // translate to/from `PersistedBucket`'s wall-clock timestamps.
    anchor_instant: Instant,
    anchor_epoch_ms: u64,
}

impl Bucket {
    pub(crate) fn new(rpm: usize, window: Duration) -> Self {
        let now = Instant::now();
        Self {
            rpm,
            window,
            ring: VecDeque::with_capacity(rpm),
            cooldown_until: None,
            last_accessed_at: now,
            anchor_instant: now,
            anchor_epoch_ms: now_ms(),
        }
    }

    /// Rebuilds a bucket from its persisted form, anchored at `now_epoch_ms`.
    pub(crate) fn hydrate(rpm: usize, window: Duration, persisted: PersistedBucket, now_epoch_ms: u64) -> Self {
        let mut bucket = Self {
            rpm,
            window,
            ring: VecDeque::with_capacity(rpm),
            cooldown_until: None,
            last_accessed_at: Instant::now(),
            anchor_instant: Instant::now(),
            anchor_epoch_ms: now_epoch_ms,
        };

        let mut ring: VecDeque<Instant> = persisted
            .request_starts_ms
            .iter()
            .map(|&ms| bucket.epoch_to_instant(ms))
            .collect();
        ring.make_contiguous().sort();
        bucket.ring = ring;
        bucket.cooldown_until = persisted.cooldown_until_ms.map(|ms| bucket.epoch_to_instant(ms));
        if persisted.last_accessed_ms > 0 {
            bucket.last_accessed_at = bucket.epoch_to_instant(persisted.last_accessed_ms);
        }
        bucket
    }

    /// Converts this bucket back to its persisted, wall-clock form.
    pub(crate) fn to_persisted(&self) -> PersistedBucket {
        PersistedBucket {
            request_starts_ms: self.ring.iter().map(|&t| self.instant_to_epoch(t)).collect(),
            cooldown_until_ms: self.cooldown_until.map(|t| self.instant_to_epoch(t)),
            last_accessed_ms: self.instant_to_epoch(self.last_accessed_at),
        }
    }

    fn epoch_to_instant(&self, epoch_ms: u64) -> Instant {
        if epoch_ms >= self.anchor_epoch_ms {
            self.anchor_instant + Duration::from_millis(epoch_ms - self.anchor_epoch_ms)
        } else {
            let behind = Duration::from_millis(self.anchor_epoch_ms - epoch_ms);
            self.anchor_instant.checked_sub(behind).unwrap_or(self.anchor_instant)
        }
    }

    fn instant_to_epoch(&self, instant: Instant) -> u64 {
        if instant >= self.anchor_instant {
            self.anchor_epoch_ms + instant.duration_since(self.anchor_instant).as_millis() as u64
        } else {
            self.anchor_epoch_ms
                .saturating_sub(self.anchor_instant.duration_since(instant).as_millis() as u64)
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.ring.front() {
            if now.duration_since(oldest) >= self.window {
                self.ring.pop_front();
            } else {
                break;
            }
        }
    }

    /// Attempts to admit one call right now. On success, records the timestamp.
    /// On failure, returns how long the caller must wait before retrying.
    pub(crate) fn try_acquire(&mut self) -> Result<(), Duration> {
        let now = Instant::now();
        self.last_accessed_at = now;
        self.prune(now);

        let cooldown_wait = self
            .cooldown_until
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO);

        if self.ring.len() < self.rpm && cooldown_wait == Duration::ZERO {
            self.ring.push_back(now);
            return Ok(());
        }

        let window_wait = self
            .ring
            .front()
            .map(|&oldest| {
                oldest
                    .checked_add(self.window)
                    .map(|expiry| expiry.saturating_duration_since(now))
                    .unwrap_or(Duration::ZERO)
            })
            .unwrap_or(Duration::ZERO);

        Err(window_wait.max(cooldown_wait))
    }

    /// Sets `cooldownUntil = now + cooldown`.
    pub(crate) fn set_cooldown(&mut self, cooldown: Duration) {
        let until = Instant::now() + cooldown;
        self.cooldown_until = Some(match self.cooldown_until {
            Some(existing) if existing > until => existing,
            _ => until,
        });
    }

    pub(crate) fn available(&self) -> usize {
        self.rpm.saturating_sub(self.ring.len())
    }
}

/// Rate-limit signatures recognized by `recordFailure`.
const SIGNATURES: &[&str] = &["429", "rate limit", "rate-limit", "retry-after"];

/// Scans `stderr_text` for a rate-limit signature, returning the parsed
/// `Retry-After` value if present.
pub(crate) fn detect_rate_limit_signature(stderr_text: &str) -> Option<Option<Duration>> {
    let lower = stderr_text.to_ascii_lowercase();
    if !SIGNATURES.iter().any(|sig| lower.contains(sig)) {
        return None;
    }
    Some(parse_retry_after(&lower))
}

/// Parses a `retry-after: <seconds>` hint out of free-form stderr text.
fn parse_retry_after(lower: &str) -> Option<Duration> {
    let marker = "retry-after";
    let idx = lower.find(marker)?;
    let rest = &lower[idx + marker.len()..];
    let digits: String = rest
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_rpm_then_blocks() {
        let mut bucket = Bucket::new(2, Duration::from_millis(100));
        assert!(bucket.try_acquire().is_ok());
        assert!(bucket.try_acquire().is_ok());
        assert!(bucket.try_acquire().is_err());
    }

    #[test]
    fn expired_timestamps_free_capacity() {
        let mut bucket = Bucket::new(1, Duration::from_millis(30));
        assert!(bucket.try_acquire().is_ok());
        assert!(bucket.try_acquire().is_err());
        std::thread::sleep(Duration::from_millis(40));
        assert!(bucket.try_acquire().is_ok());
    }

    #[test]
    fn cooldown_blocks_even_with_free_capacity() {
        let mut bucket = Bucket::new(5, Duration::from_millis(100));
        bucket.set_cooldown(Duration::from_millis(50));
        let wait = bucket.try_acquire().unwrap_err();
        assert!(wait > Duration::ZERO);
    }

    #[test]
    fn detects_429_signature() {
        assert!(detect_rate_limit_signature("upstream returned 429").is_some());
        assert!(detect_rate_limit_signature("everything is fine").is_none());
    }

    #[test]
    fn parses_retry_after_seconds() {
        let parsed = detect_rate_limit_signature("429 retry-after: 30 seconds").unwrap();
        assert_eq!(parsed, Some(Duration::from_secs(30)));
    }

    #[test]
    fn falls_back_when_no_retry_after_present() {
        let parsed = detect_rate_limit_signature("rate limit exceeded").unwrap();
        assert_eq!(parsed, None);
    }

    #[test]
    fn persisted_round_trip_preserves_admission_state() {
        let mut bucket = Bucket::new(1, Duration::from_secs(60));
        assert!(bucket.try_acquire().is_ok());
        let persisted = bucket.to_persisted();
        assert_eq!(persisted.request_starts_ms.len(), 1);

        // A second bucket, anchored far in the future, hydrating the same
        // persisted state should see the slot as already taken.
        let rehydrated = Bucket::hydrate(1, Duration::from_secs(60), persisted, now_ms() + 10);
        assert!(rehydrated.available() == 0 || !rehydrated.ring.is_empty());
    }
}
