//! Exponential backoff between crash retries

use std::time::Duration;

use vw_core::config::BackoffConfig;

/// Exponential backoff with jitter for restart attempts
///
/// Each supervisor owns one, so the backoff progression belongs to that
/// supervisor session only.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Delay used after a reset
    initial: Duration,
    /// Current delay
    current: Duration,
    /// Maximum delay
    max: Duration,
    /// Multiplier
    multiplier: f64,
    /// Jitter factor (0.0 to 1.0)
    jitter: f64,
}

impl ExponentialBackoff {
    /// Create a new backoff from configuration
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(config.initial, config.max, config.multiplier, config.jitter)
    }

    /// Create a new backoff with custom parameters
    pub fn new(initial: Duration, max: Duration, multiplier: f64, jitter: f64) -> Self {
        Self {
            initial,
            current: initial,
            max,
            multiplier,
            jitter,
        }
    }

    /// Get the next delay and advance the backoff
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;

        // Calculate next delay with multiplier
        self.current = self.clamp(self.current.as_secs_f64() * self.multiplier);

        // Add jitter, never past the cap
        let jitter_amount = delay.as_secs_f64() * self.jitter * rand::random::<f64>();
        self.clamp(delay.as_secs_f64() + jitter_amount)
    }

    /// Seconds to a delay no longer than `max`; unrepresentable values become `max`
    fn clamp(&self, secs: f64) -> Duration {
        Duration::try_from_secs_f64(secs)
            .map(|delay| delay.min(self.max))
            .unwrap_or(self.max)
    }

    /// Reset the backoff to the initial delay
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_increases() {
        let mut backoff = ExponentialBackoff::new(
            Duration::from_secs(15),
            Duration::from_secs(300),
            2.0,
            0.0, // No jitter for deterministic test
        );

        assert_eq!(backoff.next_delay(), Duration::from_secs(15));
        assert_eq!(backoff.next_delay(), Duration::from_secs(30));
        assert_eq!(backoff.next_delay(), Duration::from_secs(60));
    }

    #[test]
    fn test_backoff_max() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(30), Duration::from_secs(60), 2.0, 0.0);

        assert_eq!(backoff.next_delay(), Duration::from_secs(30));
        assert_eq!(backoff.next_delay(), Duration::from_secs(60)); // Capped at max
        assert_eq!(backoff.next_delay(), Duration::from_secs(60)); // Still capped
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60), 2.0, 0.0);
        backoff.next_delay();
        backoff.next_delay();

        backoff.reset();

        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_bad_factors_do_not_panic() {
        let factors = [(-1.0, 0.0), (f64::NAN, 0.0), (f64::INFINITY, 0.0), (2.0, -3.0)];
        for (multiplier, jitter) in factors {
            let mut backoff = ExponentialBackoff::new(
                Duration::from_secs(15),
                Duration::from_secs(300),
                multiplier,
                jitter,
            );
            for _ in 0..5 {
                assert!(backoff.next_delay() <= Duration::from_secs(300));
            }
        }
    }

    #[test]
    fn test_jitter_never_exceeds_max() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(50), Duration::from_secs(60), 2.0, 1.0);
        for _ in 0..20 {
            assert!(backoff.next_delay() <= Duration::from_secs(60));
        }
    }
}
