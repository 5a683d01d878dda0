//! Bounded monitor queue.

use std::cell::{Cell, UnsafeCell};
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use kilit::{ConditionVariable, Lock, TtasLock};

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

/// Bounded FIFO queue where both ends block.
///
/// Structure follows [`UnboundedQueue`] (two locks, sentinel head), with
/// a shared atomic size bounding the backlog. Enqueuers wait on a
/// not-full condition, dequeuers on a not-empty condition. The edge
/// transitions — empty to non-empty, full to non-full — signal the
/// *other* side, and do so while holding the other side's mutex: a
/// signal sent without it could land between the other side's emptiness
/// check and its wait, and be lost.
///
/// [`UnboundedQueue`]: crate::UnboundedQueue
pub struct BoundedQueue<T> {
    head: Cell<*mut Node<T>>,
    tail: Cell<*mut Node<T>>,
    size: AtomicUsize,
    capacity: usize,

    // Serializes enqueuers; paired with the not-full condition.
    enq_mutex: TtasLock,
    not_full: ConditionVariable,

    // Serializes dequeuers; paired with the not-empty condition.
    deq_mutex: TtasLock,
    not_empty: ConditionVariable,
}

unsafe impl<T: Send> Send for BoundedQueue<T> {}
unsafe impl<T: Send> Sync for BoundedQueue<T> {}

impl<T> BoundedQueue<T> {
    /// Creates an empty queue accepting at most `capacity` values.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "BoundedQueue requires capacity >= 1");
        let sentinel = Node::alloc(None);
        Self {
            head: Cell::new(sentinel),
            tail: Cell::new(sentinel),
            size: AtomicUsize::new(0),
            capacity,
            enq_mutex: TtasLock::new(),
            not_full: ConditionVariable::new(),
            deq_mutex: TtasLock::new(),
            not_empty: ConditionVariable::new(),
        }
    }

    /// Appends `value`, blocking while the queue is full.
    pub fn enqueue(&self, value: T) {
        let node = Node::alloc(Some(value));
        let mut must_wake_dequeuers = false;

        self.enq_mutex.lock();
        while self.size.load(Ordering::Relaxed) == self.capacity {
            self.not_full.wait(&self.enq_mutex);
        }
        unsafe {
            (*self.tail.get()).next.store(node, Ordering::Release);
        }
        self.tail.set(node);
        if self.size.fetch_add(1, Ordering::Relaxed) == 0 {
            must_wake_dequeuers = true;
        }
        self.enq_mutex.unlock();

        if must_wake_dequeuers {
            // Under deq_mutex, so the signal cannot slip between a
            // dequeuer's emptiness check and its wait.
            self.deq_mutex.lock();
            self.not_empty.notify_all();
            self.deq_mutex.unlock();
        }
    }

    /// Removes the oldest value, blocking while the queue is empty.
    pub fn dequeue(&self) -> T {
        let mut must_wake_enqueuers = false;

        self.deq_mutex.lock();
        let value = unsafe {
            let mut sentinel = self.head.get();
            let mut next = (*sentinel).next.load(Ordering::Acquire);
            while next.is_null() {
                self.not_empty.wait(&self.deq_mutex);
                sentinel = self.head.get();
                next = (*sentinel).next.load(Ordering::Acquire);
            }

            let value = (*(*next).value.get()).take().unwrap();
            self.head.set(next);
            drop(Box::from_raw(sentinel));
            value
        };
        if self.size.fetch_sub(1, Ordering::Relaxed) == self.capacity {
            must_wake_enqueuers = true;
        }
        self.deq_mutex.unlock();

        if must_wake_enqueuers {
            self.enq_mutex.lock();
            self.not_full.notify_all();
            self.enq_mutex.unlock();
        }

        value
    }
}

impl<T> Drop for BoundedQueue<T> {
    fn drop(&mut self) {
        let mut node = self.head.get();
        while !node.is_null() {
            let next = unsafe { (*node).next.load(Ordering::Relaxed) };
            unsafe { drop(Box::from_raw(node)) };
            node = next;
        }
    }
}
