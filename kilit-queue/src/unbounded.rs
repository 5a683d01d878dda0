//! Unbounded two-lock queue.

use std::cell::{Cell, UnsafeCell};
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use kilit::{Empty, LockGuard, TtasLock};

struct Node<T> {
    value: UnsafeCell<Option<T>>,
    next: AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    fn alloc(value: Option<T>) -> *mut Self {
        Box::into_raw(Box::new(Self {
            value: UnsafeCell::new(value),
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }
}

/// Unbounded FIFO queue with one lock per end.
///
/// The sentinel head keeps enqueuers and dequeuers apart: an enqueue
/// only touches the tail node, a dequeue only the node behind the
/// sentinel, so the two locks never protect the same data except through
/// the atomic `next` link they meet on.
pub struct UnboundedQueue<T> {
    head: Cell<*mut Node<T>>,
    tail: Cell<*mut Node<T>>,
    enq_mutex: TtasLock,
    deq_mutex: TtasLock,
}

unsafe impl<T: Send> Send for UnboundedQueue<T> {}
unsafe impl<T: Send> Sync for UnboundedQueue<T> {}

impl<T> Default for UnboundedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> UnboundedQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        let sentinel = Node::alloc(None);
        Self {
            head: Cell::new(sentinel),
            tail: Cell::new(sentinel),
            enq_mutex: TtasLock::new(),
            deq_mutex: TtasLock::new(),
        }
    }

    /// Appends `value` at the tail.
    pub fn enqueue(&self, value: T) {
        let node = Node::alloc(Some(value));
        let _guard = LockGuard::acquire(&self.enq_mutex);
        unsafe {
            // Release pairs with the dequeuer's acquire on the same link.
            (*self.tail.get()).next.store(node, Ordering::Release);
        }
        self.tail.set(node);
    }

    /// Removes the value behind the sentinel.
    ///
    /// # Errors
    ///
    /// Returns [`Empty`] when there is nothing to dequeue; never blocks.
    pub fn dequeue(&self) -> Result<T, Empty> {
        let _guard = LockGuard::acquire(&self.deq_mutex);
        unsafe {
            let sentinel = self.head.get();
            let next = (*sentinel).next.load(Ordering::Acquire);
            if next.is_null() {
                return Err(Empty);
            }

            let value = (*(*next).value.get()).take().unwrap();
            // `next` becomes the new sentinel; the old one leaves the
            // queue with us and cannot be referenced by the enqueuer,
            // which at this point is at least one node ahead.
            self.head.set(next);
            drop(Box::from_raw(sentinel));
            Ok(value)
        }
    }
}

impl<T> Drop for UnboundedQueue<T> {
    fn drop(&mut self) {
        let mut node = self.head.get();
        while !node.is_null() {
            let next = unsafe { (*node).next.load(Ordering::Relaxed) };
            unsafe { drop(Box::from_raw(node)) };
            node = next;
        }
    }
}
