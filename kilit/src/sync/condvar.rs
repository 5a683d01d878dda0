//! Condition variable built on the user-level spinlocks.

use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::CvStatus;
use crate::lock::{Lock, TtasLock};

/// A condition variable that binds to any mutex in the lock family.
///
/// Each waiter allocates its own signal (an `Arc<AtomicBool>`), registers
/// it in the waiter list *before* releasing the user mutex (ruling out
/// lost wakeups), then spins on the signal with yields. A notifier pops
/// one or all signals and sets them; a signal is set at most once, by one
/// notifier, so wakeups are targeted rather than thundering.
///
/// The waiter list is guarded by an internal [`TtasLock`] that is
/// deliberately distinct from the user-visible mutex, so notifiers never
/// need the user mutex and no ordering inversion can arise between the
/// two.
pub struct ConditionVariable {
    waiters: UnsafeCell<VecDeque<Arc<AtomicBool>>>,
    waiters_lock: TtasLock,
}

// The waiter list is only touched under `waiters_lock`.
unsafe impl Send for ConditionVariable {}
unsafe impl Sync for ConditionVariable {}

impl ConditionVariable {
    /// Creates a condition variable with no waiters.
    pub fn new() -> Self {
        Self {
            waiters: UnsafeCell::new(VecDeque::new()),
            waiters_lock: TtasLock::new(),
        }
    }

    /// Wakes one waiting thread, if any.
    pub fn notify_one(&self) {
        self.waiters_lock.lock();
        let signal = unsafe { (*self.waiters.get()).pop_front() };
        self.waiters_lock.unlock();

        if let Some(signal) = signal {
            signal.store(true, Ordering::Release);
        }
    }

    /// Wakes every thread currently waiting.
    pub fn notify_all(&self) {
        self.waiters_lock.lock();
        let to_notify: Vec<_> = unsafe { (*self.waiters.get()).drain(..).collect() };
        self.waiters_lock.unlock();

        for signal in to_notify {
            signal.store(true, Ordering::Release);
        }
    }

    /// Releases `mutex`, waits for a notification, and reacquires `mutex`
    /// before returning.
    ///
    /// `mutex` must be held by the calling thread. As with any condition
    /// variable, wakeups can be spurious from the caller's point of view
    /// (another thread may have consumed the condition first); use
    /// [`wait_while`](ConditionVariable::wait_while) to retry a predicate.
    pub fn wait<L: Lock>(&self, mutex: &L) {
        let signal = self.register();
        mutex.unlock();

        while !signal.load(Ordering::Acquire) {
            thread::yield_now();
        }

        mutex.lock();
    }

    /// Waits as long as `condition` returns `true`, releasing and
    /// reacquiring `mutex` around each wait.
    pub fn wait_while<L: Lock>(&self, mutex: &L, mut condition: impl FnMut() -> bool) {
        while condition() {
            self.wait(mutex);
        }
    }

    /// As [`wait`](ConditionVariable::wait), but gives up at `deadline`.
    ///
    /// A timed-out waiter removes its own signal from the list; if the
    /// signal is already gone, a notifier targeted us concurrently and
    /// the wakeup is honored rather than dropped.
    pub fn wait_until<L: Lock>(&self, mutex: &L, deadline: Instant) -> CvStatus {
        let signal = self.register();
        mutex.unlock();

        let mut signaled = false;
        while !signaled && Instant::now() < deadline {
            signaled = signal.load(Ordering::Acquire);
            if !signaled {
                thread::yield_now();
            }
        }

        let status = if signaled {
            CvStatus::NoTimeout
        } else {
            self.unregister(&signal)
        };

        mutex.lock();
        status
    }

    /// Waits as long as `condition` returns `true`, giving up at
    /// `deadline`. Returns `true` if the condition became false.
    pub fn wait_until_while<L: Lock>(
        &self,
        mutex: &L,
        deadline: Instant,
        mut condition: impl FnMut() -> bool,
    ) -> bool {
        while condition() {
            if self.wait_until(mutex, deadline) == CvStatus::Timeout {
                return !condition();
            }
        }
        true
    }

    /// As [`wait_until`](ConditionVariable::wait_until) with a relative
    /// timeout.
    pub fn wait_for<L: Lock>(&self, mutex: &L, timeout: Duration) -> CvStatus {
        self.wait_until(mutex, Instant::now() + timeout)
    }

    /// As [`wait_until_while`](ConditionVariable::wait_until_while) with
    /// a relative timeout.
    pub fn wait_for_while<L: Lock>(
        &self,
        mutex: &L,
        timeout: Duration,
        condition: impl FnMut() -> bool,
    ) -> bool {
        self.wait_until_while(mutex, Instant::now() + timeout, condition)
    }

    // Allocate this waiter's signal and publish it in the list. Must
    // happen before the user mutex is released.
    fn register(&self) -> Arc<AtomicBool> {
        let signal = Arc::new(AtomicBool::new(false));
        self.waiters_lock.lock();
        unsafe { (*self.waiters.get()).push_back(signal.clone()) };
        self.waiters_lock.unlock();
        signal
    }

    // Remove our signal after a timeout. Racing notifiers may have popped
    // it already; in that case the notification belongs to us and the
    // wait is reported as satisfied, not timed out.
    fn unregister(&self, signal: &Arc<AtomicBool>) -> CvStatus {
        self.waiters_lock.lock();
        let waiters = unsafe { &mut *self.waiters.get() };
        let found = waiters.iter().position(|s| Arc::ptr_eq(s, signal));
        if let Some(index) = found {
            waiters.remove(index);
        }
        self.waiters_lock.unlock();

        match found {
            Some(_) => CvStatus::Timeout,
            None => CvStatus::NoTimeout,
        }
    }
}

impl Default for ConditionVariable {
    fn default() -> Self {
        Self::new()
    }
}
