//! MCS queue lock.

use std::hint::spin_loop;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use crate::lock::Lock;

struct QNode {
    locked: AtomicBool,
    next: AtomicPtr<QNode>,
}

impl QNode {
    const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
            next: AtomicPtr::new(ptr::null_mut()),
        }
    }
}

thread_local! {
    // One queue node per thread, reused across acquisitions. Fields are
    // atomic because the predecessor and successor touch them while the
    // node sits in a lock's queue.
    static MY_NODE: QNode = const { QNode::new() };
}

fn my_node() -> *mut QNode {
    // The TLS slot never moves for the lifetime of the thread, so the
    // address stays valid while other threads hold it as a queue link.
    MY_NODE.with(|n| n as *const QNode as *mut QNode)
}

/// MCS queue lock.
///
/// Waiters form an explicit queue: `lock` swaps the thread's own node
/// into `tail`, publishes it into the predecessor's `next`, and spins on
/// a flag in its *own* node. Each handoff therefore invalidates one
/// cache line on exactly one core, and acquisition order is FIFO.
///
/// The queue node lives in thread-local storage, one per thread. A
/// thread must release an `McsLock` before acquiring a different
/// `McsLock` instance, and must not exit while holding or waiting on
/// one.
#[derive(Debug, Default)]
pub struct McsLock {
    tail: AtomicPtr<QNode>,
}

impl McsLock {
    /// Creates the lock, unlocked.
    pub const fn new() -> Self {
        Self {
            tail: AtomicPtr::new(ptr::null_mut()),
        }
    }
}

impl Lock for McsLock {
    fn lock(&self) {
        let qnode = my_node();
        let pred = self.tail.swap(qnode, Ordering::AcqRel);
        if !pred.is_null() {
            unsafe {
                (*qnode).locked.store(true, Ordering::Relaxed);
                // Release so the predecessor sees a fully initialized node.
                (*pred).next.store(qnode, Ordering::Release);
                // Wait until the predecessor gives up the lock.
                while (*qnode).locked.load(Ordering::Acquire) {
                    spin_loop();
                }
            }
        }
    }

    fn unlock(&self) {
        let qnode = my_node();
        unsafe {
            let mut succ = (*qnode).next.load(Ordering::Acquire);
            if succ.is_null() {
                if self
                    .tail
                    .compare_exchange(qnode, ptr::null_mut(), Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
                {
                    return;
                }
                // A successor swapped itself into the tail but has not
                // linked in yet; wait for it to fill `next`.
                while succ.is_null() {
                    spin_loop();
                    succ = (*qnode).next.load(Ordering::Acquire);
                }
            }
            (*succ).locked.store(false, Ordering::Release);
            (*qnode).next.store(ptr::null_mut(), Ordering::Relaxed);
        }
    }
}
