//! Michael–Scott queue with node recycling.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::Ordering;

use crossbeam_utils::Backoff;
use kilit::{AtomicStampedPtr, Empty};

struct Node<T> {
    // MaybeUninit because a node's slot is dead while it is the sentinel
    // or sits in the free list; only the enqueue that (re)allocates it
    // writes a live value.
    value: UnsafeCell<MaybeUninit<T>>,
    next: AtomicStampedPtr<Node<T>>,
}

impl<T> Node<T> {
    fn alloc_empty() -> *mut Self {
        Box::into_raw(Box::new(Self {
            value: UnsafeCell::new(MaybeUninit::uninit()),
            next: AtomicStampedPtr::null(),
        }))
    }
}

// Lock-free free list of retired nodes. The stamped top is what makes
// reuse safe: a node popped, recycled, and pushed back between another
// thread's load and CAS changes the stamp even though the pointer
// repeats.
struct NodePool<T> {
    unused: AtomicStampedPtr<Node<T>>,
}

impl<T> NodePool<T> {
    const fn new() -> Self {
        Self {
            unused: AtomicStampedPtr::null(),
        }
    }

    // Pop a node from the free list, or heap-allocate one, and write
    // `value` into its slot. The write must not drop the slot's previous
    // content: it is dead bits from a previous life.
    fn allocate(&self, value: T) -> *mut Node<T> {
        let backoff = Backoff::new();
        let node = loop {
            let (head, stamp) = self.unused.load(Ordering::Acquire);
            if head.is_null() {
                break Node::alloc_empty();
            }
            let next = unsafe { (*head).next.load_ptr(Ordering::Relaxed) };
            if self
                .unused
                .compare_exchange(head, next, stamp, stamp + 1, Ordering::AcqRel, Ordering::Relaxed)
            {
                unsafe { (*head).next.store(ptr::null_mut(), 0, Ordering::Relaxed) };
                break head;
            }
            backoff.spin();
        };
        unsafe { (*node).value.get().write(MaybeUninit::new(value)) };
        node
    }

    // Donate a node whose slot is already dead.
    fn free(&self, node: *mut Node<T>) {
        let backoff = Backoff::new();
        loop {
            let (head, stamp) = self.unused.load(Ordering::Relaxed);
            unsafe { (*node).next.store(head, 0, Ordering::Relaxed) };
            if self
                .unused
                .compare_exchange(head, node, stamp, stamp + 1, Ordering::Release, Ordering::Relaxed)
            {
                return;
            }
            backoff.spin();
        }
    }
}

impl<T> Drop for NodePool<T> {
    fn drop(&mut self) {
        // Pooled slots are dead; freeing the boxes is enough.
        let mut node = self.unused.load_ptr(Ordering::Relaxed);
        while !node.is_null() {
            let next = unsafe { (*node).next.load_ptr(Ordering::Relaxed) };
            unsafe { drop(Box::from_raw(node)) };
            node = next;
        }
    }
}

/// Michael–Scott FIFO queue that recycles its nodes.
///
/// Same algorithm as [`LockFreeQueue`], but retired sentinels go into a
/// lock-free [`NodePool`] free list instead of a grave: the queue's
/// steady-state allocation rate is zero. Reuse makes raw pointers repeat,
/// so `head`, `tail`, and every `next` are stamped pointers and each
/// successful CAS bumps the stamp.
///
/// Because a dequeued node may be recycled at any moment after `head`
/// moves past it, the value is read *before* the head CAS and simply
/// discarded (without dropping) when the CAS loses.
///
/// [`LockFreeQueue`]: crate::LockFreeQueue
pub struct RecycleQueue<T> {
    head: AtomicStampedPtr<Node<T>>,
    tail: AtomicStampedPtr<Node<T>>,
    pool: NodePool<T>,
}

unsafe impl<T: Send> Send for RecycleQueue<T> {}
unsafe impl<T: Send> Sync for RecycleQueue<T> {}

impl<T> Default for RecycleQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RecycleQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        let sentinel = Node::alloc_empty();
        Self {
            head: AtomicStampedPtr::new(sentinel, 0),
            tail: AtomicStampedPtr::new(sentinel, 0),
            pool: NodePool::new(),
        }
    }

    /// Appends `value` at the tail. Lock-free.
    pub fn enqueue(&self, value: T) {
        let node = self.pool.allocate(value);
        let backoff = Backoff::new();
        loop {
            let (last, last_stamp) = self.tail.load(Ordering::Acquire);
            let (next, next_stamp) = unsafe { (*last).next.load(Ordering::Acquire) };

            if last_stamp != self.tail.load_stamp(Ordering::Relaxed) {
                backoff.spin();
                continue;
            }

            if next.is_null() {
                if unsafe {
                    (*last).next.compare_exchange(
                        next,
                        node,
                        next_stamp,
                        next_stamp + 1,
                        Ordering::Release,
                        Ordering::Relaxed,
                    )
                } {
                    let _ = self.tail.compare_exchange(
                        last,
                        node,
                        last_stamp,
                        last_stamp + 1,
                        Ordering::Release,
                        Ordering::Relaxed,
                    );
                    return;
                }
            } else {
                // Help the lagging tail forward.
                let _ = self.tail.compare_exchange(
                    last,
                    next,
                    last_stamp,
                    last_stamp + 1,
                    Ordering::Release,
                    Ordering::Relaxed,
                );
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
            let (first, first_stamp) = self.head.load(Ordering::Acquire);
            let (last, last_stamp) = self.tail.load(Ordering::Acquire);
            let (next, _) = unsafe { (*first).next.load(Ordering::Acquire) };

            if first_stamp != self.head.load_stamp(Ordering::Relaxed) {
                backoff.spin();
                continue;
            }

            if first == last {
                if next.is_null() {
                    return Err(Empty);
                }
                let _ = self.tail.compare_exchange(
                    last,
                    next,
                    last_stamp,
                    last_stamp + 1,
                    Ordering::Release,
                    Ordering::Relaxed,
                );
            } else {
                // Speculative read: if the CAS below fails, `next` may
                // already be recycled and these are junk bits, but then
                // the stamp check has failed too and the copy is
                // discarded without ever being treated as a T.
                let value = unsafe { ptr::read((*next).value.get()) };
                if self.head.compare_exchange(
                    first,
                    next,
                    first_stamp,
                    first_stamp + 1,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                ) {
                    // The CAS won: the bits were live and are now ours;
                    // `next`'s slot is dead from here on.
                    self.pool.free(first);
                    return Ok(unsafe { value.assume_init() });
                }
            }
            backoff.spin();
        }
    }
}

impl<T> Drop for RecycleQueue<T> {
    fn drop(&mut self) {
        // The first node is the sentinel with a dead slot; everything
        // after it holds a live value that must be dropped.
        let mut node = self.head.load_ptr(Ordering::Relaxed);
        let mut is_sentinel = true;
        while !node.is_null() {
            let next = unsafe { (*node).next.load_ptr(Ordering::Relaxed) };
            unsafe {
                if !is_sentinel {
                    ptr::drop_in_place((*(*node).value.get()).as_mut_ptr());
                }
                drop(Box::from_raw(node));
            }
            is_sentinel = false;
            node = next;
        }
        // `pool` drops itself afterwards.
    }
}
