//! Lock-free Michael–Scott queue.

use std::cell::{Cell, UnsafeCell};
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crossbeam_utils::Backoff;
use kilit::{CacheAligned, Empty};

struct Node<T> {
    value: UnsafeCell<Option<T>>,
    next: AtomicPtr<Node<T>>,
    // Garbage-list link, written once by the dequeuer that retired the
    // node.
    next_deleted: Cell<*mut Node<T>>,
}

impl<T> Node<T> {
    fn alloc(value: Option<T>) -> *mut Self {
        Box::into_raw(Box::new(Self {
            value: UnsafeCell::new(value),
            next: AtomicPtr::new(ptr::null_mut()),
            next_deleted: Cell::new(ptr::null_mut()),
        }))
    }
}

/// Michael–Scott lock-free FIFO queue.
///
/// Enqueue links at the tail and then advances `tail`; the advance is
/// best-effort because any thread that finds `tail` lagging *helps* it
/// forward before retrying its own operation. Dequeue swings `head` to
/// the next node and takes that node's value, retiring the old sentinel.
///
/// The `head == tail` double-check pattern looks ABA-prone, but retired
/// sentinels go onto a garbage list and are only freed when the queue is
/// dropped, so a pointer can never be recycled while an operation still
/// holds it.
pub struct LockFreeQueue<T> {
    head: CacheAligned<AtomicPtr<Node<T>>>,
    tail: CacheAligned<AtomicPtr<Node<T>>>,
    garbage: AtomicPtr<Node<T>>,
}

unsafe impl<T: Send> Send for LockFreeQueue<T> {}
unsafe impl<T: Send> Sync for LockFreeQueue<T> {}

impl<T> Default for LockFreeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LockFreeQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        let sentinel = Node::alloc(None);
        Self {
            head: CacheAligned::new(AtomicPtr::new(sentinel)),
            tail: CacheAligned::new(AtomicPtr::new(sentinel)),
            garbage: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Appends `value` at the tail. Lock-free.
    pub fn enqueue(&self, value: T) {
        let node = Node::alloc(Some(value));
        let backoff = Backoff::new();
        loop {
            let last = self.tail.load(Ordering::Acquire);
            let next = unsafe { (*last).next.load(Ordering::Acquire) };

            if last != self.tail.load(Ordering::Relaxed) {
                backoff.spin();
                continue;
            }

            if next.is_null() {
                // Try to link at the end; on success the tail advance is
                // best-effort (someone may have helped already).
                if unsafe {
                    (*last)
                        .next
                        .compare_exchange(
                            ptr::null_mut(),
                            node,
                            Ordering::Release,
                            Ordering::Relaxed,
                        )
                        .is_ok()
                } {
                    let _ = self.tail.compare_exchange(
                        last,
                        node,
                        Ordering::Release,
                        Ordering::Relaxed,
                    );
                    return;
                }
            } else {
                // Tail is lagging; help it forward.
                let _ =
                    self.tail
                        .compare_exchange(last, next, Ordering::Release, Ordering::Relaxed);
            }
            backoff.spin();
        }
    }

    /// Removes the value behind the sentinel. Lock-free.
    ///
    /// # Errors
    ///
    /// Returns [`Empty`] when the queue holds nothing; never blocks.
    pub fn dequeue(&self) -> Result<T, Empty> {
        let backoff = Backoff::new();
        loop {
            let first = self.head.load(Ordering::Relaxed);
            let last = self.tail.load(Ordering::Acquire);
            let next = unsafe { (*first).next.load(Ordering::Acquire) };

            if first != self.head.load(Ordering::Relaxed) {
                backoff.spin();
                continue;
            }

            if first == last {
                if next.is_null() {
                    return Err(Empty);
                }
                // An enqueue is mid-flight; help the tail past it.
                let _ =
                    self.tail
                        .compare_exchange(last, next, Ordering::Release, Ordering::Relaxed);
            } else if self
                .head
                .compare_exchange(first, next, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                // `next` is the new sentinel; its value is ours alone.
                let value = unsafe { (*(*next).value.get()).take().unwrap() };
                self.push_garbage(first);
                return Ok(value);
            }
            backoff.spin();
        }
    }

    fn push_garbage(&self, node: *mut Node<T>) {
        unsafe {
            let mut head = self.garbage.load(Ordering::Relaxed);
            loop {
                (*node).next_deleted.set(head);
                match self.garbage.compare_exchange_weak(
                    head,
                    node,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => return,
                    Err(current) => head = current,
                }
            }
        }
    }
}

impl<T> Drop for LockFreeQueue<T> {
    fn drop(&mut self) {
        let mut node = *self.garbage.get_mut();
        while !node.is_null() {
            let next = unsafe { (*node).next_deleted.get() };
            unsafe { drop(Box::from_raw(node)) };
            node = next;
        }

        let mut node = *self.head.get_mut();
        while !node.is_null() {
            let next = unsafe { (*node).next.load(Ordering::Relaxed) };
            unsafe { drop(Box::from_raw(node)) };
            node = next;
        }
    }
}
