//! Array-based queue lock.

use std::cell::Cell;
use std::hint::spin_loop;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::lock::Lock;
use crate::utils::CacheAligned;

thread_local! {
    // Slot taken by this thread's most recent `lock`; consumed by `unlock`.
    static MY_SLOT: Cell<usize> = const { Cell::new(0) };
}

/// Array lock: a ring of per-slot "go" flags.
///
/// A shared `tail` counter hands out successive slot indices modulo the
/// ring size; each thread spins on its own flag (one cache line per
/// slot), and `unlock` passes the baton to the next slot. First-come,
/// first-served by ticket order.
///
/// The caller must bound the number of threads concurrently inside
/// `lock`/`unlock` by the ring capacity; with more, two threads would
/// share a slot. The slot index is remembered in thread-local storage,
/// so a thread must release an `ArrayLock` before acquiring another one.
#[derive(Debug)]
pub struct ArrayLock {
    flag: Box<[CacheAligned<AtomicBool>]>,
    tail: AtomicU64,
}

impl ArrayLock {
    /// Creates a lock with `capacity` slots. `capacity` bounds the number
    /// of threads that may contend at once.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "ArrayLock requires at least one slot");
        let flag: Box<[_]> = (0..capacity)
            .map(|i| CacheAligned::new(AtomicBool::new(i == 0)))
            .collect();
        Self {
            flag,
            tail: AtomicU64::new(0),
        }
    }

    /// Number of slots in the ring.
    pub fn capacity(&self) -> usize {
        self.flag.len()
    }
}

impl Lock for ArrayLock {
    fn lock(&self) {
        let slot = self.tail.fetch_add(1, Ordering::Relaxed) as usize % self.flag.len();
        MY_SLOT.with(|s| s.set(slot));
        while !self.flag[slot].load(Ordering::Acquire) {
            spin_loop();
        }
    }

    fn unlock(&self) {
        let slot = MY_SLOT.with(|s| s.get());
        self.flag[slot].store(false, Ordering::Relaxed);
        self.flag[(slot + 1) % self.flag.len()].store(true, Ordering::Release);
    }
}
