//! Exponential backoff with jitter for reconnect attempts.

use std::time::Duration;

use rand::Rng;

/// Delay before retry number `attempt` (1-based); attempt 0 means no delay.
///
/// Doubles from `base` up to `max`, plus up to 10% random jitter so workers
/// of one target do not reconnect in lockstep.
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let base_ms = base.as_millis() as u64;
    let max_ms = max.as_millis() as u64;
    let factor = 2u64.saturating_pow(attempt - 1);
    let capped_ms = base_ms.saturating_mul(factor).min(max_ms);

    let jitter_range = capped_ms / 10;
    let jitter_ms = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_ms + jitter_ms)
}

/// Per-worker reconnect state.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max, attempt: 0 }
    }

    /// Record a failure and return how long to wait before the next try.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        calculate_backoff(self.attempt, self.base, self.max)
    }

    /// Forget past failures after a success.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let base = Duration::from_millis(100);
        let max = Duration::from_millis(1_000);

        assert_eq!(calculate_backoff(0, base, max), Duration::ZERO);
        assert!(calculate_backoff(1, base, max) >= Duration::from_millis(100));
        assert!(calculate_backoff(2, base, max) >= Duration::from_millis(200));

        let capped = calculate_backoff(20, base, max);
        assert!(capped >= max);
        assert!(capped < max + Duration::from_millis(100));
    }

    #[test]
    fn test_reset_starts_over() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(10));
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.attempts(), 2);
        backoff.reset();
        assert!(backoff.next_delay() < Duration::from_millis(200));
    }
}
