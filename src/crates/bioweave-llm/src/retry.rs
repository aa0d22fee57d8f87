//! Retry policy with jittered exponential backoff.
//!
//! Model calls are retried on any error until the attempt budget is
//! exhausted; the wait between attempts grows exponentially inside a
//! `[min_wait, max_wait]` window with a random jitter factor so that
//! concurrent agents do not thunder in lockstep.

use rand::Rng;
use std::time::Duration;

/// Configuration for retrying failed model calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first)
    pub max_attempts: usize,
    /// Minimum wait between attempts in seconds
    pub min_wait: f64,
    /// Maximum wait between attempts in seconds
    pub max_wait: f64,
    /// Multiplier for the wait after each attempt
    pub backoff_factor: f64,
    /// Whether to add random jitter to waits
    pub jitter: bool,
}

impl RetryPolicy {
    /// Create a policy with the given attempt budget
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            min_wait: 1.0,
            max_wait: 30.0,
            backoff_factor: 2.0,
            jitter: true,
        }
    }

    /// Set the wait window
    pub fn with_wait_window(mut self, min_wait: f64, max_wait: f64) -> Self {
        self.min_wait = min_wait;
        self.max_wait = max_wait;
        self
    }

    /// Disable jitter (deterministic waits, used in tests)
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Whether another attempt is allowed after `attempt` attempts ran
    pub fn should_retry(&self, attempt: usize) -> bool {
        attempt < self.max_attempts
    }

    /// Wait before the attempt following `attempt` (0-indexed).
    ///
    /// Exponential in the attempt number, clamped to the window, scaled
    /// by a jitter factor in `[0.5, 1.5]`.
    pub fn calculate_delay(&self, attempt: usize) -> Duration {
        let base = self.min_wait * self.backoff_factor.powi(attempt as i32);
        let capped = base.clamp(self.min_wait, self.max_wait);
        let delay = if self.jitter {
            let factor = rand::thread_rng().gen_range(0.5..=1.5);
            (capped * factor).min(self.max_wait)
        } else {
            capped
        };
        Duration::from_secs_f64(delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_budget() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert!(policy.should_retry(4));
        assert!(!policy.should_retry(5));
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy::new(5)
            .with_wait_window(1.0, 30.0)
            .without_jitter();
        let d0 = policy.calculate_delay(0);
        let d3 = policy.calculate_delay(3);
        let d10 = policy.calculate_delay(10);
        assert!(d0 < d3);
        assert_eq!(d10, Duration::from_secs_f64(30.0));
    }

    #[test]
    fn test_jitter_stays_in_window() {
        let policy = RetryPolicy::new(5).with_wait_window(1.0, 30.0);
        for attempt in 0..8 {
            let d = policy.calculate_delay(attempt).as_secs_f64();
            assert!(d >= 0.5 && d <= 30.0, "delay {d} out of range");
        }
    }
}
