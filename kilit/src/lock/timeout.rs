//! Queue lock with bounded waiting.

use std::cell::Cell;
use std::hint::spin_loop;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::time::{Duration, Instant};

struct QNode {
    // Pointer to the predecessor node in the queue:
    // - null: waiting for the lock.
    // - &AVAILABLE: the owner released the lock.
    // - anything else: the owner abandoned the attempt; the value is its
    //   predecessor at the time of abandonment.
    pred: AtomicPtr<QNode>,
}

impl QNode {
    fn alloc() -> *mut QNode {
        Box::into_raw(Box::new(QNode {
            pred: AtomicPtr::new(ptr::null_mut()),
        }))
    }
}

// Sentinel distinguished by address; never dereferenced for ownership,
// never freed.
static AVAILABLE: QNode = QNode {
    pred: AtomicPtr::new(ptr::null_mut()),
};

#[inline]
fn available() -> *mut QNode {
    &AVAILABLE as *const QNode as *mut QNode
}

thread_local! {
    // Node of this thread's current acquisition, consumed by `unlock`.
    static MY_NODE: Cell<*mut QNode> = const { Cell::new(ptr::null_mut()) };
}

/// CLH-style queue lock supporting timeout even for threads in the
/// middle of the queue.
///
/// A waiter that gives up cannot always unlink itself (its successor is
/// spinning on it), so it instead marks its node *abandoned* by storing
/// its own predecessor into the node. Successors chase these pred chains,
/// skipping abandoned nodes, until they find a live predecessor or one
/// that published the released sentinel.
///
/// Nodes are heap-allocated per acquisition and reclaimed by the unique
/// successor that consumes or skips them; the release path with no
/// successor reclaims its own node. A thread must not interleave
/// acquisitions of two `TimeoutLock` instances.
#[derive(Debug, Default)]
pub struct TimeoutLock {
    tail: AtomicPtr<QNode>,
}

impl TimeoutLock {
    /// Creates the lock, unlocked.
    pub const fn new() -> Self {
        Self {
            tail: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Tries to acquire the lock, giving up after `timeout`.
    ///
    /// Returns `true` on acquisition; the caller must then call
    /// [`unlock`](TimeoutLock::unlock). On `false` the queue is left
    /// well-formed and later acquisitions proceed normally.
    pub fn try_lock(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        let qnode = QNode::alloc();
        MY_NODE.with(|n| n.set(qnode));

        let mut my_pred = self.tail.swap(qnode, Ordering::AcqRel);
        if my_pred.is_null() {
            // Queue was empty; the lock is ours.
            return true;
        }

        unsafe {
            if (*my_pred).pred.load(Ordering::Acquire) == available() {
                // The predecessor released before we even started to
                // spin. Consuming the release also makes us the node's
                // reclaimer.
                drop(Box::from_raw(my_pred));
                return true;
            }

            while start.elapsed() < timeout {
                let pred_pred = (*my_pred).pred.load(Ordering::Acquire);
                if pred_pred == available() {
                    drop(Box::from_raw(my_pred));
                    return true;
                }
                if !pred_pred.is_null() {
                    // The predecessor abandoned its attempt; skip over it.
                    // We were its only watcher, so reclaiming here is safe.
                    let abandoned = my_pred;
                    my_pred = pred_pred;
                    drop(Box::from_raw(abandoned));
                }
                spin_loop();
            }

            // Timed out. If we are still the tail, unsplice ourselves by
            // pointing the tail back at our predecessor; nobody ever saw
            // our node, so it can be reclaimed immediately.
            if self
                .tail
                .compare_exchange(qnode, my_pred, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                drop(Box::from_raw(qnode));
            } else {
                // A successor is watching us: stay in the queue in the
                // abandoned state and let the successor skip and reclaim
                // the node.
                (*qnode).pred.store(my_pred, Ordering::Release);
            }
        }
        false
    }

    /// Releases the lock.
    pub fn unlock(&self) {
        let qnode = MY_NODE.with(|n| n.get());
        unsafe {
            if self
                .tail
                .compare_exchange(qnode, ptr::null_mut(), Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                // No successor; our node left the queue with us.
                drop(Box::from_raw(qnode));
            } else {
                // Signal the successor, which will reclaim the node.
                (*qnode).pred.store(available(), Ordering::Release);
            }
        }
    }
}

impl Drop for TimeoutLock {
    fn drop(&mut self) {
        // With no threads active, every still-allocated node is reachable
        // exactly once along the pred chain from the tail.
        let mut node = *self.tail.get_mut();
        while !node.is_null() && node != available() {
            let next = unsafe { (*node).pred.load(Ordering::Relaxed) };
            unsafe { drop(Box::from_raw(node)) };
            node = next;
        }
    }
}
