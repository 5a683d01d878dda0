//! CLH queue lock.

use std::cell::Cell;
use std::hint::spin_loop;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use crate::lock::Lock;

struct QNode {
    // True while the owning thread holds or waits for the lock; false
    // once it has released it.
    locked: AtomicBool,
}

impl QNode {
    fn alloc() -> *mut QNode {
        Box::into_raw(Box::new(QNode {
            locked: AtomicBool::new(false),
        }))
    }
}

struct ClhTls {
    node: Cell<*mut QNode>,
    pred: Cell<*mut QNode>,
}

impl Drop for ClhTls {
    fn drop(&mut self) {
        // The node currently owned by this thread is in no queue once the
        // thread is at rest; reclaim it. The pred pointer is only valid
        // while a lock is held and is never owned here.
        let node = self.node.get();
        if !node.is_null() {
            unsafe { drop(Box::from_raw(node)) };
        }
    }
}

thread_local! {
    static CLH_TLS: ClhTls = const {
        ClhTls {
            node: Cell::new(ptr::null_mut()),
            pred: Cell::new(ptr::null_mut()),
        }
    };
}

/// CLH queue lock.
///
/// Like [`McsLock`] this forms a FIFO queue of per-thread nodes, but the
/// queue is implicit: each waiter spins on its *predecessor's* flag, and
/// on release a thread adopts the predecessor's node as its own next-time
/// node. The node a thread brings to the queue is therefore released by
/// its successor, never by the thread itself.
///
/// The node lives in thread-local storage. A thread must release a
/// `ClhLock` before acquiring a different `ClhLock` instance.
///
/// [`McsLock`]: crate::McsLock
#[derive(Debug)]
pub struct ClhLock {
    tail: AtomicPtr<QNode>,
}

impl ClhLock {
    /// Creates the lock, unlocked.
    pub fn new() -> Self {
        // The initial node stands in for "the previous holder already
        // released"; the first locker spins on it for zero iterations.
        Self {
            tail: AtomicPtr::new(QNode::alloc()),
        }
    }
}

impl Default for ClhLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Lock for ClhLock {
    fn lock(&self) {
        CLH_TLS.with(|tls| {
            let mut qnode = tls.node.get();
            if qnode.is_null() {
                qnode = QNode::alloc();
                tls.node.set(qnode);
            }
            unsafe {
                // Announce our intent before entering the queue.
                (*qnode).locked.store(true, Ordering::Relaxed);
            }
            // The swap both enqueues us and hands us our predecessor.
            let pred = self.tail.swap(qnode, Ordering::AcqRel);
            tls.pred.set(pred);
            unsafe {
                while (*pred).locked.load(Ordering::Acquire) {
                    spin_loop();
                }
            }
        });
    }

    fn unlock(&self) {
        CLH_TLS.with(|tls| {
            let qnode = tls.node.get();
            unsafe {
                (*qnode).locked.store(false, Ordering::Release);
            }
            // Our old node now belongs to the successor watching it;
            // recycle the predecessor's node as our own.
            tls.node.set(tls.pred.get());
        });
    }
}

impl Drop for ClhLock {
    fn drop(&mut self) {
        // At rest exactly one node is reachable from the tail: the one
        // left behind by the last release (or the initial node).
        let tail = *self.tail.get_mut();
        if !tail.is_null() {
            unsafe { drop(Box::from_raw(tail)) };
        }
    }
}
