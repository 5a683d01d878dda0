//! Composite queue lock: bounded space, fine-grained timeouts.

use std::cell::Cell;
use std::hint::spin_loop;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use rand::Rng;

use crate::backoff::Backoff;
use crate::error::Timeout;
use crate::stamped::AtomicStampedPtr;

// Node lifecycle:
// - FREE: available for any thread to claim.
// - WAITING: linked into the queue; the owner is in or waiting for the
//   critical section.
// - RELEASED: the owner left the critical section.
// - ABORTED: the owner abandoned its attempt after enqueueing.
const FREE: usize = 0;
const WAITING: usize = 1;
const RELEASED: usize = 2;
const ABORTED: usize = 3;

#[derive(Debug)]
struct QNode {
    // All cross-thread synchronization on a node goes through `state`.
    state: AtomicUsize,
    pred: AtomicPtr<QNode>,
}

impl QNode {
    fn new() -> Self {
        Self {
            state: AtomicUsize::new(FREE),
            pred: AtomicPtr::new(ptr::null_mut()),
        }
    }
}

thread_local! {
    // Node of this thread's current acquisition, consumed by `unlock`.
    static MY_NODE: Cell<*const QNode> = const { Cell::new(ptr::null()) };
}

/// Composite queue lock.
///
/// Combines the strengths of the backoff and queue locks: a *fixed-size*
/// array of queue nodes that threads claim with a randomized,
/// backed-off CAS, spliced into a queue through a stamped-pointer tail.
/// Waiting is FIFO within a burst, space is bounded by the array size,
/// timeouts are honored at every phase, and abandoned waiters are
/// tolerated (successors skip `ABORTED` nodes and recycle them to
/// `FREE`).
///
/// The stamp on the tail prevents ABA on node recycling: a node freed
/// and re-claimed between an observer's load and CAS changes the stamp
/// even though the pointer repeats.
///
/// A thread must not interleave acquisitions of two `CompositeLock`
/// instances.
#[derive(Debug)]
pub struct CompositeLock {
    waiting: Box<[QNode]>,
    tail: AtomicStampedPtr<QNode>,
    min_delay: Duration,
    max_delay: Duration,
}

impl CompositeLock {
    /// Creates a lock with `size` queue nodes and the given backoff
    /// window for node acquisition.
    ///
    /// `size` bounds the number of threads that can simultaneously be
    /// waiting or aborted; it does not bound the number of callers.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn new(size: usize, min_delay: Duration, max_delay: Duration) -> Self {
        assert!(size >= 1, "CompositeLock requires at least one node");
        Self {
            waiting: (0..size).map(|_| QNode::new()).collect(),
            tail: AtomicStampedPtr::null(),
            min_delay,
            max_delay,
        }
    }

    /// Tries to acquire the lock, giving up once `timeout` has elapsed.
    ///
    /// Returns `true` on acquisition; the caller must then call
    /// [`unlock`](CompositeLock::unlock).
    pub fn try_lock(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        let attempt = || -> Result<(), Timeout> {
            let node = self.acquire_qnode(start, timeout)?;
            let pred = self.splice_qnode(node, start, timeout)?;
            self.wait_for_predecessor(pred, node, start, timeout)
        };
        attempt().is_ok()
    }

    /// Releases the lock.
    pub fn unlock(&self) {
        let node = MY_NODE.with(|n| n.replace(ptr::null()));
        unsafe {
            (*node).state.store(RELEASED, Ordering::Release);
        }
    }

    fn timed_out(start: Instant, timeout: Duration) -> bool {
        start.elapsed() > timeout
    }

    // Claim a node in the waiting array by moving it FREE -> WAITING.
    // A node observed ABORTED or RELEASED may be cleaned up, but only
    // when it is the current tail; cleaning an interior node would race
    // with the successor chasing its pred chain.
    fn acquire_qnode(&self, start: Instant, timeout: Duration) -> Result<*const QNode, Timeout> {
        let index = rand::rng().random_range(0..self.waiting.len());
        let node: *const QNode = &self.waiting[index];
        let mut backoff = Backoff::new(self.min_delay, self.max_delay);

        loop {
            let observed = unsafe {
                (*node)
                    .state
                    .compare_exchange(FREE, WAITING, Ordering::AcqRel, Ordering::Acquire)
            };
            let state = match observed {
                Ok(_) => return Ok(node),
                Err(state) => state,
            };

            if state == ABORTED || state == RELEASED {
                let (cur_tail, stamp) = self.tail.load(Ordering::Acquire);
                if ptr::eq(node, cur_tail) {
                    // An ABORTED tail still names its predecessor; a
                    // RELEASED tail was the only queued node (everything
                    // before it went FREE for it to get RELEASED).
                    let my_pred = if state == ABORTED {
                        unsafe { (*node).pred.load(Ordering::Acquire) }
                    } else {
                        ptr::null_mut()
                    };
                    if self.tail.compare_exchange(
                        cur_tail,
                        my_pred,
                        stamp,
                        stamp + 1,
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    ) {
                        unsafe {
                            (*node).state.store(WAITING, Ordering::Release);
                        }
                        return Ok(node);
                    }
                }
            }

            backoff.backoff();
            if Self::timed_out(start, timeout) {
                return Err(Timeout);
            }
        }
    }

    // Enqueue the claimed node through the stamped tail.
    fn splice_qnode(
        &self,
        node: *const QNode,
        start: Instant,
        timeout: Duration,
    ) -> Result<*mut QNode, Timeout> {
        loop {
            let (cur_tail, stamp) = self.tail.load(Ordering::Acquire);
            if Self::timed_out(start, timeout) {
                unsafe {
                    (*node).state.store(FREE, Ordering::Release);
                }
                return Err(Timeout);
            }
            if self.tail.compare_exchange(
                cur_tail,
                node as *mut QNode,
                stamp,
                stamp + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                return Ok(cur_tail);
            }
        }
    }

    // Spin until the predecessor releases, skipping aborted predecessors.
    fn wait_for_predecessor(
        &self,
        pred: *mut QNode,
        node: *const QNode,
        start: Instant,
        timeout: Duration,
    ) -> Result<(), Timeout> {
        if pred.is_null() {
            // First in the queue; straight into the critical section.
            MY_NODE.with(|n| n.set(node));
            return Ok(());
        }

        let mut pred = pred;
        unsafe {
            let mut pred_state = (*pred).state.load(Ordering::Acquire);
            while pred_state != RELEASED {
                if pred_state == ABORTED {
                    // The pred field must be read before the node is
                    // recycled to FREE; after that store, any thread may
                    // claim it and overwrite the field.
                    let aborted = pred;
                    pred = (*aborted).pred.load(Ordering::Acquire);
                    (*aborted).state.store(FREE, Ordering::Release);
                }

                if Self::timed_out(start, timeout) {
                    // Leave a trail for our successor, then bow out.
                    (*node).pred.store(pred, Ordering::Release);
                    (*node).state.store(ABORTED, Ordering::Release);
                    return Err(Timeout);
                }

                spin_loop();
                pred_state = (*pred).state.load(Ordering::Acquire);
            }

            // Single writer: only the immediate successor recycles a
            // RELEASED node.
            (*pred).state.store(FREE, Ordering::Release);
        }
        MY_NODE.with(|n| n.set(node));
        Ok(())
    }
}
