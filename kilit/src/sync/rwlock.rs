//! Reader/writer locks built on the TTAS mutex and condition variable.

use std::cell::UnsafeCell;

use crate::lock::{Lock, TtasLock};
use crate::sync::ConditionVariable;

#[derive(Default)]
struct RwState {
    // Readers currently inside the lock.
    num_readers: u64,
    // True once a writer holds the lock — or, for the FIFO variant, as
    // soon as a writer announces itself.
    has_writer: bool,
}

/// Reader/writer lock without a writer-preference rule.
///
/// Readers pass whenever no writer is inside; a writer waits for the
/// room to empty entirely. Under a steady stream of readers a writer can
/// starve — [`FifoRwLock`] trades reader throughput for freedom from
/// that.
pub struct SimpleRwLock {
    state: UnsafeCell<RwState>,
    mutex: TtasLock,
    cv: ConditionVariable,
}

// `state` is only touched under `mutex`.
unsafe impl Send for SimpleRwLock {}
unsafe impl Sync for SimpleRwLock {}

impl SimpleRwLock {
    /// Creates the lock with no readers or writer inside.
    pub fn new() -> Self {
        Self {
            state: UnsafeCell::new(RwState::default()),
            mutex: TtasLock::new(),
            cv: ConditionVariable::new(),
        }
    }

    /// Acquires shared access. Blocks while a writer is inside.
    pub fn read_lock(&self) {
        self.mutex.lock();
        while unsafe { (*self.state.get()).has_writer } {
            self.cv.wait(&self.mutex);
        }
        unsafe { (*self.state.get()).num_readers += 1 };
        self.mutex.unlock();
    }

    /// Releases shared access. The last reader out wakes the writers.
    pub fn read_unlock(&self) {
        self.mutex.lock();
        let to_notify = unsafe {
            let state = &mut *self.state.get();
            state.num_readers -= 1;
            state.num_readers == 0
        };
        self.mutex.unlock();
        // Notify after dropping the mutex to reduce contention on it.
        if to_notify {
            self.cv.notify_all();
        }
    }

    /// Acquires exclusive access. Blocks while any reader or writer is
    /// inside.
    pub fn write_lock(&self) {
        self.mutex.lock();
        while unsafe {
            let state = &*self.state.get();
            state.num_readers > 0 || state.has_writer
        } {
            self.cv.wait(&self.mutex);
        }
        unsafe { (*self.state.get()).has_writer = true };
        self.mutex.unlock();
    }

    /// Releases exclusive access and wakes everyone waiting.
    pub fn write_unlock(&self) {
        self.mutex.lock();
        unsafe { (*self.state.get()).has_writer = false };
        self.mutex.unlock();
        self.cv.notify_all();
    }
}

impl Default for SimpleRwLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Reader/writer lock with writer preference.
///
/// A writer claims `has_writer` the moment it arrives and only then
/// drains the readers already inside; readers arriving later block
/// behind it. This eliminates writer starvation at the cost of batching
/// readers behind each writer.
pub struct FifoRwLock {
    state: UnsafeCell<RwState>,
    mutex: TtasLock,
    cv: ConditionVariable,
}

// `state` is only touched under `mutex`.
unsafe impl Send for FifoRwLock {}
unsafe impl Sync for FifoRwLock {}

impl FifoRwLock {
    /// Creates the lock with no readers or writer inside.
    pub fn new() -> Self {
        Self {
            state: UnsafeCell::new(RwState::default()),
            mutex: TtasLock::new(),
            cv: ConditionVariable::new(),
        }
    }

    /// Acquires shared access. Blocks while a writer holds or has
    /// announced itself.
    pub fn read_lock(&self) {
        self.mutex.lock();
        while unsafe { (*self.state.get()).has_writer } {
            self.cv.wait(&self.mutex);
        }
        unsafe { (*self.state.get()).num_readers += 1 };
        self.mutex.unlock();
    }

    /// Releases shared access. The last reader out wakes the announced
    /// writer.
    pub fn read_unlock(&self) {
        self.mutex.lock();
        let to_notify = unsafe {
            let state = &mut *self.state.get();
            state.num_readers -= 1;
            state.num_readers == 0
        };
        if to_notify {
            self.cv.notify_all();
        }
        self.mutex.unlock();
    }

    /// Acquires exclusive access: announce first, then wait for the
    /// readers already inside to drain.
    pub fn write_lock(&self) {
        self.mutex.lock();
        while unsafe { (*self.state.get()).has_writer } {
            self.cv.wait(&self.mutex);
        }
        unsafe { (*self.state.get()).has_writer = true };
        while unsafe { (*self.state.get()).num_readers > 0 } {
            self.cv.wait(&self.mutex);
        }
        self.mutex.unlock();
    }

    /// Releases exclusive access and wakes everyone waiting.
    pub fn write_unlock(&self) {
        self.mutex.lock();
        unsafe { (*self.state.get()).has_writer = false };
        self.cv.notify_all();
        self.mutex.unlock();
    }
}

impl Default for FifoRwLock {
    fn default() -> Self {
        Self::new()
    }
}
