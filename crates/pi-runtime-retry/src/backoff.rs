use std::time::Duration;

/// Computes the delay before retry attempt `attempt` (0-indexed), per the retry
/// algorithm: `min(maxDelay, initialDelay * backoffFactor^attempt) + rand(0, jitter)`.
pub(crate) fn compute_delay(
    initial_delay: Duration,
    max_delay: Duration,
    backoff_factor: f64,
    jitter: Duration,
    attempt: usize,
) -> Duration {
    let exponential = initial_delay.mul_f64(backoff_factor.powi(attempt as i32));
    let capped = exponential.min(max_delay);
    capped + random_jitter(jitter)
}

fn random_jitter(jitter: Duration) -> Duration {
    if jitter.is_zero() {
        return Duration::ZERO;
    }
    use rand::Rng;
    let mut rng = rand::rng();
    Duration::from_secs_f64(rng.random_range(0.0..=jitter.as_secs_f64()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_exponentially_until_capped() {
        let delay = compute_delay(
            Duration::from_millis(100),
            Duration::from_millis(500),
            2.0,
            Duration::ZERO,
            0,
        );
        assert_eq!(delay, Duration::from_millis(100));

        let delay = compute_delay(
            Duration::from_millis(100),
            Duration::from_millis(500),
            2.0,
            Duration::ZERO,
            2,
        );
        assert_eq!(delay, Duration::from_millis(400));

        let delay = compute_delay(
            Duration::from_millis(100),
            Duration::from_millis(500),
            2.0,
            Duration::ZERO,
            3,
        );
        assert_eq!(delay, Duration::from_millis(500));
    }

    #[test]
    fn jitter_adds_bounded_randomness() {
        for _ in 0..20 {
            let delay = compute_delay(
                Duration::from_millis(100),
                Duration::from_secs(10),
                2.0,
                Duration::from_millis(50),
                0,
            );
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }
}
