//! Elimination-backoff stack.

use std::hint::spin_loop;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::time::{Duration, Instant};

use rand::Rng;

use kilit::{AtomicStampedPtr, Empty, Timeout};

use crate::treiber::Node;

// Exchanger slot states, carried in the stamp half of the slot.
const EMPTY: u64 = 0;
const WAITING: u64 = 1;
const BUSY: u64 = 2;

// A lock-free exchanger. Two threads meet through one stamped slot: the
// first CASes its item in (EMPTY -> WAITING), the second swaps its own
// item over it (WAITING -> BUSY), and the first collects the second's
// item and resets the slot. The reset is a plain store: only the waiting
// thread ever moves a slot from BUSY back to EMPTY.
struct Exchanger<T> {
    slot: AtomicStampedPtr<Node<T>>,
}

impl<T> Exchanger<T> {
    const fn new() -> Self {
        Self {
            slot: AtomicStampedPtr::null(),
        }
    }

    fn exchange(&self, my_item: *mut Node<T>, timeout: Duration) -> Result<*mut Node<T>, Timeout> {
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                return Err(Timeout);
            }

            let (your_item, stamp) = self.slot.load(Ordering::Acquire);
            match stamp {
                EMPTY => {
                    if self.slot.compare_exchange(
                        your_item,
                        my_item,
                        EMPTY,
                        WAITING,
                        Ordering::Release,
                        Ordering::Relaxed,
                    ) {
                        // Our item is offered; wait for a partner.
                        while Instant::now() < deadline {
                            let (item, stamp) = self.slot.load(Ordering::Acquire);
                            if stamp == BUSY {
                                self.slot.store(ptr::null_mut(), EMPTY, Ordering::Release);
                                return Ok(item);
                            }
                            spin_loop();
                        }
                        // Withdraw the offer; if the withdrawal CAS fails
                        // a partner arrived at the last instant and the
                        // exchange completed after all.
                        if self.slot.compare_exchange(
                            my_item,
                            ptr::null_mut(),
                            WAITING,
                            EMPTY,
                            Ordering::Release,
                            Ordering::Relaxed,
                        ) {
                            return Err(Timeout);
                        }
                        let item = self.slot.load_ptr(Ordering::Acquire);
                        self.slot.store(ptr::null_mut(), EMPTY, Ordering::Release);
                        return Ok(item);
                    }
                }
                WAITING => {
                    if self.slot.compare_exchange(
                        your_item,
                        my_item,
                        WAITING,
                        BUSY,
                        Ordering::Release,
                        Ordering::Relaxed,
                    ) {
                        return Ok(your_item);
                    }
                }
                // BUSY: a pair is mid-exchange; retry.
                _ => {}
            }
            spin_loop();
        }
    }
}

// Exchange window per visit; long enough for a partner under load, short
// enough that a lonely visitor falls back to the stack quickly.
const EXCHANGE_WINDOW: Duration = Duration::from_micros(50);

struct EliminationArray<T> {
    exchangers: Box<[Exchanger<T>]>,
}

impl<T> EliminationArray<T> {
    fn new(capacity: usize) -> Self {
        Self {
            exchangers: (0..capacity).map(|_| Exchanger::new()).collect(),
        }
    }

    fn len(&self) -> usize {
        self.exchangers.len()
    }

    // Offer `item` on a random exchanger within `[lower, upper]`.
    fn visit(
        &self,
        item: *mut Node<T>,
        lower: usize,
        upper: usize,
    ) -> Result<*mut Node<T>, Timeout> {
        let slot = rand::rng().random_range(lower..=upper);
        self.exchangers[slot].exchange(item, EXCHANGE_WINDOW)
    }
}

/// Treiber stack with an elimination array as its backoff path.
///
/// A push and a pop that collide on the top pointer can cancel without
/// ever modifying it: the push hands its node straight to the pop
/// through an exchanger slot. Both linearize at the CAS that moves the
/// slot to BUSY, which is externally equivalent to a push followed by an
/// immediate pop. Failed or timed-out exchanges fall back to the Treiber
/// fast path, so the array only absorbs contention, never creates
/// waiting.
pub struct EliminationBackoffStack<T> {
    top: AtomicPtr<Node<T>>,
    garbage: AtomicPtr<Node<T>>,
    elimination: EliminationArray<T>,
}

unsafe impl<T: Send> Send for EliminationBackoffStack<T> {}
unsafe impl<T: Send> Sync for EliminationBackoffStack<T> {}

impl<T> EliminationBackoffStack<T> {
    /// Creates an empty stack with `capacity` exchanger slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "the elimination array needs at least one slot");
        Self {
            top: AtomicPtr::new(ptr::null_mut()),
            garbage: AtomicPtr::new(ptr::null_mut()),
            elimination: EliminationArray::new(capacity),
        }
    }

    /// Pushes `value` on top of the stack.
    pub fn push(&self, value: T) {
        let node = Node::alloc(value);
        loop {
            if self.try_push(node) {
                return;
            }

            let (lower, upper) = self.random_range();
            if let Ok(other) = self.elimination.visit(node, lower, upper) {
                if other.is_null() {
                    // A pop took our node; nothing left to do.
                    return;
                }
                // Met another push; both fall back to the stack.
            }
        }
    }

    /// Pops the most recently pushed value.
    ///
    /// # Errors
    ///
    /// Returns [`Empty`] when the top pointer is null; a concurrent push
    /// still sitting in an exchanger does not count.
    pub fn pop(&self) -> Result<T, Empty> {
        loop {
            if let Some(node) = self.try_pop()? {
                let value = unsafe { (*(*node).value.get()).take().unwrap() };
                self.push_garbage(node);
                return Ok(value);
            }

            let (lower, upper) = self.random_range();
            if let Ok(other) = self.elimination.visit(ptr::null_mut(), lower, upper) {
                if !other.is_null() {
                    // Eliminated against a push: its node is ours now.
                    let value = unsafe { (*(*other).value.get()).take().unwrap() };
                    self.push_garbage(other);
                    return Ok(value);
                }
                // Met another pop; both fall back to the stack.
            }
        }
    }

    fn random_range(&self) -> (usize, usize) {
        let max_index = self.elimination.len() - 1;
        let lower = rand::rng().random_range(0..=max_index);
        let upper = rand::rng().random_range(lower..=max_index);
        (lower, upper)
    }

    fn try_push(&self, node: *mut Node<T>) -> bool {
        let old_top = self.top.load(Ordering::Acquire);
        unsafe { (*node).next.store(old_top, Ordering::Relaxed) };
        self.top
            .compare_exchange(old_top, node, Ordering::Release, Ordering::Relaxed)
            .is_ok()
    }

    fn try_pop(&self) -> Result<Option<*mut Node<T>>, Empty> {
        let old_top = self.top.load(Ordering::Acquire);
        if old_top.is_null() {
            return Err(Empty);
        }
        let new_top = unsafe { (*old_top).next.load(Ordering::Relaxed) };
        if self
            .top
            .compare_exchange(old_top, new_top, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Ok(Some(old_top))
        } else {
            Ok(None)
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

impl<T> Drop for EliminationBackoffStack<T> {
    fn drop(&mut self) {
        let mut node = *self.garbage.get_mut();
        while !node.is_null() {
            let next = unsafe { (*node).next_deleted.get() };
            unsafe { drop(Box::from_raw(node)) };
            node = next;
        }

        let mut node = *self.top.get_mut();
        while !node.is_null() {
            let next = unsafe { (*node).next.load(Ordering::Relaxed) };
            unsafe { drop(Box::from_raw(node)) };
            node = next;
        }
    }
}
