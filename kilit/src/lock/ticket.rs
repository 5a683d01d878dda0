//! Ticket lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crate::lock::Lock;
use crate::utils::CacheAligned;

/// FIFO spinlock built from two counters.
///
/// `lock` draws a ticket with a single `fetch_add` and spins (yielding)
/// until `now_serving` reaches it; `unlock` bumps `now_serving`. Threads
/// enter in exactly the order they drew tickets, with no per-thread
/// state at all. The counters live on separate cache lines so waiters
/// polling `now_serving` do not slow down ticket draws.
#[derive(Debug, Default)]
pub struct TicketLock {
    next_ticket: CacheAligned<AtomicU64>,
    now_serving: CacheAligned<AtomicU64>,
}

impl TicketLock {
    /// Creates the lock, unlocked.
    pub const fn new() -> Self {
        Self {
            next_ticket: CacheAligned::new(AtomicU64::new(0)),
            now_serving: CacheAligned::new(AtomicU64::new(0)),
        }
    }
}

impl Lock for TicketLock {
    fn lock(&self) {
        // Unique, monotonically increasing ticket.
        let my_ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        while self.now_serving.load(Ordering::Acquire) != my_ticket {
            thread::yield_now();
        }
    }

    fn unlock(&self) {
        self.now_serving.fetch_add(1, Ordering::Release);
    }
}
