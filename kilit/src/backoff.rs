//! Exponential backoff with randomized delays.

use std::thread;
use std::time::Duration;

use rand::Rng;

/// Exponential backoff between retries of a contended operation.
///
/// Each call to [`backoff`] sleeps for a uniformly random duration in
/// `[0, limit]` and then doubles the limit, up to `max`. Randomization
/// desynchronizes threads that failed at the same instant; doubling
/// spreads retries of persistent losers further and further apart.
///
/// The random generator is per-thread (`rand::rng`), so concurrent
/// backoffs never contend on shared RNG state.
///
/// [`backoff`]: Backoff::backoff
#[derive(Debug)]
pub struct Backoff {
    max: Duration,
    limit: Duration,
}

impl Backoff {
    /// Creates a backoff whose delay window starts at `min` and grows up
    /// to `max`.
    pub const fn new(min: Duration, max: Duration) -> Self {
        Self { max, limit: min }
    }

    /// Sleeps for a random duration in `[0, limit]`, then doubles the
    /// limit (saturating at `max`).
    pub fn backoff(&mut self) {
        let limit = self.limit.as_nanos() as u64;
        let delay = rand::rng().random_range(0..=limit);
        self.limit = self.limit.saturating_mul(2).min(self.max);
        thread::sleep(Duration::from_nanos(delay));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn limit_doubles_up_to_max() {
        let mut b = Backoff::new(Duration::from_nanos(100), Duration::from_nanos(350));
        assert_eq!(b.limit, Duration::from_nanos(100));
        b.backoff();
        assert_eq!(b.limit, Duration::from_nanos(200));
        b.backoff();
        assert_eq!(b.limit, Duration::from_nanos(350));
        b.backoff();
        assert_eq!(b.limit, Duration::from_nanos(350));
    }

    #[test]
    fn zero_window_backoff_returns() {
        // A zero-length window degenerates to a zero sleep; the call must
        // still return promptly rather than park the thread.
        let mut b = Backoff::new(Duration::ZERO, Duration::ZERO);
        let start = Instant::now();
        for _ in 0..100 {
            b.backoff();
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
