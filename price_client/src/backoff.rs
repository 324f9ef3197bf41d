//! Exponential reconnect backoff.
//!
//! The n-th consecutive failure waits `min(base * 2^n, cap)`, with n starting
//! at 1. An optional attempt ceiling turns the cycle into a terminal failure.

use std::time::Duration;

/// Reconnect delay generator.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    max_attempts: Option<u32>,
    attempt: u32,
}

impl Backoff {
    /// Create a backoff with no failures recorded yet.
    pub fn new(base: Duration, cap: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            base,
            cap,
            max_attempts,
            attempt: 0,
        }
    }

    /// Record a failure and return how long to wait before retrying,
    /// or `None` once the attempt ceiling is reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.max_attempts.is_some_and(|max| self.attempt >= max) {
            return None;
        }
        self.attempt += 1;
        Some(self.delay_for(self.attempt))
    }

    /// Forget all recorded failures.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Failures recorded since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.cap, |delay| delay.min(self.cap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn millis(delays: &[Option<Duration>]) -> Vec<u128> {
        delays.iter().map(|d| d.unwrap().as_millis()).collect()
    }

    #[test]
    fn doubles_from_twice_the_base_and_caps() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30), None);
        let delays: Vec<_> = (0..7).map(|_| backoff.next_delay()).collect();
        assert_eq!(
            millis(&delays),
            [2000, 4000, 8000, 16000, 30000, 30000, 30000]
        );
        assert_eq!(backoff.attempt(), 7);
    }

    #[test]
    fn reset_starts_over() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30), None);
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn huge_attempt_counts_stay_capped() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30), None);
        for _ in 0..100 {
            assert!(backoff.next_delay().unwrap() <= Duration::from_secs(30));
        }
    }

    #[test]
    fn ceiling_ends_the_cycle() {
        let mut backoff =
            Backoff::new(Duration::from_millis(10), Duration::from_millis(100), Some(2));
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert_eq!(backoff.next_delay(), None);
        backoff.reset();
        assert!(backoff.next_delay().is_some());
    }
}
