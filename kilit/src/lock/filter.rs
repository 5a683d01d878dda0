//! The classroom mutual-exclusion protocols: Peterson and its n-thread
//! generalization, the filter lock.
//!
//! Both identify callers by a small thread index instead of implementing
//! [`Lock`](crate::Lock), and both lean on sequentially consistent
//! operations throughout: the protocols' correctness arguments are
//! interleaving-based and do not survive weaker orderings.

use std::hint::spin_loop;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Two-thread Peterson lock.
///
/// Callers are thread 0 and thread 1. Starvation-free: the `victim`
/// variable forces alternation under contention.
#[derive(Debug, Default)]
pub struct PetersonLock {
    flag: [AtomicBool; 2],
    victim: AtomicUsize,
}

impl PetersonLock {
    /// Creates the lock, unlocked.
    pub const fn new() -> Self {
        Self {
            flag: [AtomicBool::new(false), AtomicBool::new(false)],
            victim: AtomicUsize::new(0),
        }
    }

    /// Acquires the lock as thread `id` (0 or 1).
    pub fn lock(&self, id: usize) {
        let other = 1 - id;
        self.flag[id].store(true, Ordering::SeqCst); // I'm interested.
        self.victim.store(id, Ordering::SeqCst); // You go first.
        while self.flag[other].load(Ordering::SeqCst) && self.victim.load(Ordering::SeqCst) == id {
            spin_loop();
        }
    }

    /// Releases the lock as thread `id`.
    pub fn unlock(&self, id: usize) {
        self.flag[id].store(false, Ordering::SeqCst);
    }
}

/// Filter lock: n-thread Peterson.
///
/// Threads climb `n - 1` levels; each level filters out at least one
/// contender by making it the level's victim. Starvation-free, but every
/// acquisition scans all peers per level, so this is a protocol study
/// rather than a practical lock.
#[derive(Debug)]
pub struct FilterLock {
    level: Box<[AtomicUsize]>,
    victim: Box<[AtomicUsize]>,
}

impl FilterLock {
    /// Creates a lock for thread indices `0..n`.
    ///
    /// # Panics
    ///
    /// Panics if `n` is zero.
    pub fn new(n: usize) -> Self {
        assert!(n >= 1, "FilterLock requires at least one thread");
        Self {
            level: (0..n).map(|_| AtomicUsize::new(0)).collect(),
            victim: (0..n).map(|_| AtomicUsize::new(0)).collect(),
        }
    }

    /// Acquires the lock as thread `me` (`me < n`).
    pub fn lock(&self, me: usize) {
        let n = self.level.len();
        for i in 1..n {
            self.level[me].store(i, Ordering::SeqCst);
            self.victim[i].store(me, Ordering::SeqCst);
            // Spin while a conflict exists at this level.
            loop {
                let conflict = (0..n).any(|k| {
                    k != me
                        && self.level[k].load(Ordering::SeqCst) >= i
                        && self.victim[i].load(Ordering::SeqCst) == me
                });
                if !conflict {
                    break;
                }
                spin_loop();
            }
        }
    }

    /// Releases the lock as thread `me`.
    pub fn unlock(&self, me: usize) {
        self.level[me].store(0, Ordering::SeqCst);
    }
}
