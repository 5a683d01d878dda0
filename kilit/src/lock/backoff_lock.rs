//! TTAS lock with exponential backoff.

use std::hint::spin_loop;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::backoff::Backoff;
use crate::lock::Lock;

/// A test-and-test-and-set lock that backs off after each failed swap.
///
/// Identical to [`TtasLock`] except that a thread losing the swap race
/// sleeps a randomized, exponentially growing delay before re-entering
/// the read spin, which thins out the swap storm at release points. The
/// delay window is per-acquisition: it resets to `min_delay` on every
/// `lock` call.
///
/// [`TtasLock`]: crate::TtasLock
#[derive(Debug)]
pub struct BackoffLock {
    state: AtomicBool,
    min_delay: Duration,
    max_delay: Duration,
}

impl BackoffLock {
    /// Creates the lock with the given backoff window bounds.
    pub const fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            state: AtomicBool::new(false),
            min_delay,
            max_delay,
        }
    }
}

impl Default for BackoffLock {
    /// A window of 1µs–100µs, reasonable for short critical sections.
    fn default() -> Self {
        Self::new(Duration::from_micros(1), Duration::from_micros(100))
    }
}

impl Lock for BackoffLock {
    fn lock(&self) {
        let mut backoff = Backoff::new(self.min_delay, self.max_delay);
        loop {
            while self.state.load(Ordering::Relaxed) {
                spin_loop();
            }
            if !self.state.swap(true, Ordering::Acquire) {
                return;
            }
            backoff.backoff();
        }
    }

    fn unlock(&self) {
        self.state.store(false, Ordering::Release);
    }
}
