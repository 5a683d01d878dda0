//! Test-and-set spinlocks.

use std::hint::spin_loop;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::lock::Lock;

/// Test-and-set lock: spin directly on the atomic swap.
///
/// Every spin iteration is a write attempt, so waiting threads keep the
/// flag's cache line in modified state and ping-pong it between cores.
/// [`TtasLock`] is the same lock without that flaw; this one exists as
/// the baseline.
#[derive(Debug, Default)]
pub struct TasLock {
    state: AtomicBool,
}

impl TasLock {
    /// Creates the lock, unlocked.
    pub const fn new() -> Self {
        Self {
            state: AtomicBool::new(false),
        }
    }
}

impl Lock for TasLock {
    fn lock(&self) {
        while self.state.swap(true, Ordering::Acquire) {
            spin_loop();
        }
    }

    fn unlock(&self) {
        self.state.store(false, Ordering::Release);
    }
}

/// Test-and-test-and-set lock.
///
/// Spins on a relaxed load until the flag reads clear, and only then
/// attempts the swap. Waiting threads hit their local cache instead of
/// the bus; the swap storm happens only at release points.
#[derive(Debug, Default)]
pub struct TtasLock {
    state: AtomicBool,
}

impl TtasLock {
    /// Creates the lock, unlocked.
    pub const fn new() -> Self {
        Self {
            state: AtomicBool::new(false),
        }
    }
}

impl Lock for TtasLock {
    fn lock(&self) {
        loop {
            // Test phase: spin on relaxed load (stays in cache).
            while self.state.load(Ordering::Relaxed) {
                spin_loop();
            }
            // Test-and-set phase: attempt to acquire.
            if !self.state.swap(true, Ordering::Acquire) {
                return;
            }
        }
    }

    fn unlock(&self) {
        self.state.store(false, Ordering::Release);
    }
}
