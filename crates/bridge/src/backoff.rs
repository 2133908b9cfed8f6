use std::time::Duration;

use {async_trait::async_trait, mqttgram_config::BackoffConfig};

/// Exponential reconnect delay: `min(initial * multiplier^attempt, max)`.
///
/// `attempt` counts consecutive failures and starts at zero, so the first
/// retry waits `initial`. The controller resets it after every successful
/// connection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    initial: Duration,
    max: Duration,
    multiplier: f64,
}

impl BackoffPolicy {
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            initial,
            max: max.max(initial),
            multiplier: multiplier.max(1.0),
        }
    }

    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(
            Duration::from_millis(config.initial_ms),
            Duration::from_millis(config.max_ms),
            config.multiplier,
        )
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            return self.max;
        }
        Duration::from_secs_f64(secs)
    }

    pub fn max(&self) -> Duration {
        self.max
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default())
    }
}

/// Waits between reconnect attempts. Swapped out in tests so backoff runs
/// without real time passing.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[rstest]
    #[case(0, 500)]
    #[case(1, 1_000)]
    #[case(2, 2_000)]
    #[case(5, 16_000)]
    #[case(6, 30_000)]
    #[case(60, 30_000)]
    #[case(u32::MAX, 30_000)]
    fn default_sequence(#[case] attempt: u32, #[case] expected_ms: u64) {
        assert_eq!(BackoffPolicy::default().delay(attempt), ms(expected_ms));
    }

    #[test]
    fn never_exceeds_max_and_never_decreases() {
        let policy = BackoffPolicy::new(ms(100), ms(5_000), 1.7);
        let mut previous = Duration::ZERO;
        for attempt in 0..200 {
            let delay = policy.delay(attempt);
            assert!(delay <= ms(5_000));
            assert!(delay >= previous);
            previous = delay;
        }
    }

    #[test]
    fn degenerate_settings_are_clamped() {
        let policy = BackoffPolicy::new(ms(800), ms(100), 0.5);
        assert_eq!(policy.max(), ms(800));
        assert_eq!(policy.delay(0), ms(800));
        assert_eq!(policy.delay(10), ms(800));
    }
}
