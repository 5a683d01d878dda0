//! Counting semaphore.

use std::cell::UnsafeCell;
use std::time::{Duration, Instant};

use crate::error::CvStatus;
use crate::lock::{Lock, TtasLock};
use crate::sync::ConditionVariable;

/// Counting semaphore over the TTAS mutex and condition variable.
pub struct Semaphore {
    value: UnsafeCell<u64>,
    mutex: TtasLock,
    cv: ConditionVariable,
}

// `value` is only touched under `mutex`.
unsafe impl Send for Semaphore {}
unsafe impl Sync for Semaphore {}

impl Semaphore {
    /// Creates a semaphore holding `value` permits.
    pub fn new(value: u64) -> Self {
        Self {
            value: UnsafeCell::new(value),
            mutex: TtasLock::new(),
            cv: ConditionVariable::new(),
        }
    }

    /// Takes one permit, blocking until one is available.
    pub fn acquire(&self) {
        self.mutex.lock();
        while unsafe { *self.value.get() } == 0 {
            self.cv.wait(&self.mutex);
        }
        unsafe { *self.value.get() -= 1 };
        self.mutex.unlock();
    }

    /// Returns one permit.
    pub fn release(&self) {
        self.release_n(1);
    }

    /// Returns `count` permits at once.
    pub fn release_n(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.mutex.lock();
        unsafe { *self.value.get() += count };
        self.mutex.unlock();
        self.cv.notify_all();
    }

    /// Takes one permit without blocking. Returns whether one was taken.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_n(1)
    }

    /// Takes `count` permits atomically without blocking. Returns whether
    /// all of them were taken.
    pub fn try_acquire_n(&self, count: u64) -> bool {
        if count == 0 {
            return true;
        }
        self.mutex.lock();
        let taken = unsafe {
            if *self.value.get() >= count {
                *self.value.get() -= count;
                true
            } else {
                false
            }
        };
        self.mutex.unlock();
        taken
    }

    /// Takes one permit, blocking up to `timeout` for one to appear.
    /// Returns whether a permit was taken.
    pub fn try_acquire_for(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.mutex.lock();
        while unsafe { *self.value.get() } == 0 {
            let now = Instant::now();
            if now >= deadline {
                self.mutex.unlock();
                return false;
            }
            if self.cv.wait_until(&self.mutex, deadline) == CvStatus::Timeout {
                self.mutex.unlock();
                return false;
            }
        }
        unsafe { *self.value.get() -= 1 };
        self.mutex.unlock();
        true
    }

    /// Current number of permits. Mostly useful in tests and diagnostics;
    /// the value may be stale by the time the caller looks at it.
    pub fn value(&self) -> u64 {
        self.mutex.lock();
        let value = unsafe { *self.value.get() };
        self.mutex.unlock();
        value
    }
}
