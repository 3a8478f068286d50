//! Exponential backoff with jitter for failed reconciles

use rand::Rng;
use std::time::Duration;

/// Retry policy applied by the controller to retryable sync failures
#[derive(Clone, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Retries allowed per generation before the resource is left failed
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay, jitter included
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (1-based).
    ///
    /// Jitter scales the exponential delay by 0.5x to 1.5x.
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        self.scaled(attempt, jitter)
    }

    /// True once `attempts` retries have been used up
    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_retries
    }

    fn scaled(&self, attempt: u32, jitter: f64) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let secs = (base * jitter).min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(secs.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }

    #[test]
    fn test_delay_grows_exponentially() {
        let policy = policy();
        assert_eq!(policy.scaled(1, 1.0), Duration::from_millis(100));
        assert_eq!(policy.scaled(2, 1.0), Duration::from_millis(200));
        assert_eq!(policy.scaled(3, 1.0), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = policy();
        assert_eq!(policy.scaled(10, 1.0), Duration::from_secs(1));
        assert_eq!(policy.scaled(u32::MAX, 1.5), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = policy();
        for _ in 0..100 {
            let delay = policy.delay(2);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(300));
        }
    }

    #[test]
    fn test_exhausted() {
        let policy = policy();
        assert!(!policy.exhausted(0));
        assert!(!policy.exhausted(2));
        assert!(policy.exhausted(3));
    }
}
