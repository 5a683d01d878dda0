//! Reentrant (recursive) lock.

use std::cell::UnsafeCell;
use std::thread::{self, ThreadId};

use crate::error::NotOwner;
use crate::lock::{Lock, TtasLock};
use crate::sync::ConditionVariable;

struct Owner {
    thread: Option<ThreadId>,
    hold_count: u64,
}

/// A lock the owning thread may acquire again without deadlocking.
///
/// Relocking by the owner increments a hold count; each `unlock`
/// decrements it, and the lock is released for other threads when the
/// count reaches zero. Unlocking from a thread that does not hold the
/// lock is a caller bug and is reported as [`NotOwner`].
pub struct ReentrantLock {
    owner: UnsafeCell<Owner>,
    mutex: TtasLock,
    cv: ConditionVariable,
}

// `owner` is only touched under `mutex`.
unsafe impl Send for ReentrantLock {}
unsafe impl Sync for ReentrantLock {}

impl ReentrantLock {
    /// Creates the lock, unheld.
    pub fn new() -> Self {
        Self {
            owner: UnsafeCell::new(Owner {
                thread: None,
                hold_count: 0,
            }),
            mutex: TtasLock::new(),
            cv: ConditionVariable::new(),
        }
    }

    /// Acquires the lock, or increments the hold count when the caller
    /// already owns it.
    pub fn lock(&self) {
        let me = thread::current().id();
        self.mutex.lock();
        unsafe {
            if (*self.owner.get()).thread == Some(me) {
                (*self.owner.get()).hold_count += 1;
                self.mutex.unlock();
                return;
            }
            while (*self.owner.get()).hold_count != 0 {
                self.cv.wait(&self.mutex);
            }
            let owner = &mut *self.owner.get();
            owner.thread = Some(me);
            owner.hold_count = 1;
        }
        self.mutex.unlock();
    }

    /// Decrements the hold count, releasing the lock when it reaches
    /// zero.
    ///
    /// # Errors
    ///
    /// Returns [`NotOwner`] when the calling thread does not hold the
    /// lock (including when the hold count is already zero).
    pub fn unlock(&self) -> Result<(), NotOwner> {
        let me = thread::current().id();
        self.mutex.lock();
        let to_notify = unsafe {
            let owner = &mut *self.owner.get();
            if owner.hold_count == 0 || owner.thread != Some(me) {
                self.mutex.unlock();
                return Err(NotOwner);
            }
            owner.hold_count -= 1;
            owner.hold_count == 0
        };
        self.mutex.unlock();
        if to_notify {
            self.cv.notify_all();
        }
        Ok(())
    }
}

impl Default for ReentrantLock {
    fn default() -> Self {
        Self::new()
    }
}
