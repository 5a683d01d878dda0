//! Optimistic list: traverse without locks, lock two nodes, validate.

use std::hash::{BuildHasher, Hash};
use std::ptr;
use std::sync::atomic::{fence, AtomicPtr, Ordering};

use foldhash::fast::RandomState;
use kilit::{Lock, TtasLock};

use crate::key::{item_key, KEY_MAX, KEY_MIN};

struct Node<T> {
    key: usize,
    item: Option<T>,
    // Atomic because readers traverse while writers relink; the release
    // store in `add` doubles as the publication fence for the new node's
    // fields.
    next: AtomicPtr<Node<T>>,
    mutex: TtasLock,
}

impl<T> Node<T> {
    fn alloc(key: usize, item: Option<T>) -> *mut Self {
        Box::into_raw(Box::new(Self {
            key,
            item,
            next: AtomicPtr::new(ptr::null_mut()),
            mutex: TtasLock::new(),
        }))
    }
}

/// Sorted-set list with optimistic synchronization.
///
/// Operations traverse the list without any locking, lock the two nodes
/// around the target position, then *validate* by re-traversing from the
/// head that the predecessor is still reachable and still points at the
/// current node. A failed validation unlocks and retries.
///
/// Removed nodes cannot be freed while lockless readers may still be
/// parked on them, so they are pushed onto a garbage list and reclaimed
/// when the list is dropped. The garbage list is seeded with a
/// maximum-key sentinel: a reader that wanders into it through a stale
/// `next` pointer stops there and then fails validation.
pub struct OptimisticList<T, S = RandomState> {
    head: *mut Node<T>,
    garbage: AtomicPtr<Node<T>>,
    build_hasher: S,
}

unsafe impl<T: Send, S: Send> Send for OptimisticList<T, S> {}
unsafe impl<T: Send, S: Sync> Sync for OptimisticList<T, S> {}

impl<T, S: Default> Default for OptimisticList<T, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S: Default> OptimisticList<T, S> {
    /// Creates an empty list.
    pub fn new() -> Self {
        let head = Node::alloc(KEY_MIN, None);
        let tail = Node::alloc(KEY_MAX, None);
        unsafe { (*head).next.store(tail, Ordering::Relaxed) };
        Self {
            head,
            garbage: AtomicPtr::new(Node::alloc(KEY_MAX, None)),
            build_hasher: S::default(),
        }
    }
}

impl<T: Hash, S: BuildHasher> OptimisticList<T, S> {
    /// Inserts `item`. Returns `false` (dropping `item`) when a matching
    /// key is already present.
    pub fn add(&self, item: T) -> bool {
        let key = item_key(&self.build_hasher, &item);
        let (pred, found) = self.search(key);

        unsafe {
            let curr = (*pred).next.load(Ordering::Relaxed);
            if !found {
                let node = Node::alloc(key, Some(item));
                (*node).next.store(curr, Ordering::Relaxed);
                // Linearization point; the release ordering publishes the
                // node's initialized fields together with the link.
                (*pred).next.store(node, Ordering::Release);
            }
            (*curr).mutex.unlock();
            (*pred).mutex.unlock();
        }
        !found
    }

    /// Removes the item matching `item`'s key. Returns whether anything
    /// was removed.
    pub fn remove(&self, item: &T) -> bool {
        let key = item_key(&self.build_hasher, item);
        let (pred, found) = self.search(key);

        unsafe {
            let curr = (*pred).next.load(Ordering::Relaxed);
            if found {
                // Linearization point: the node leaves the list here.
                let succ = (*curr).next.load(Ordering::Relaxed);
                (*pred).next.store(succ, Ordering::Release);

                // The unlink must be complete before the node's next
                // pointer is repurposed as a garbage-list link.
                fence(Ordering::Acquire);
                self.push_garbage(curr);
            }
            (*curr).mutex.unlock();
            (*pred).mutex.unlock();
        }
        found
    }

    /// Whether an item with `item`'s key is present.
    pub fn contains(&self, item: &T) -> bool {
        let key = item_key(&self.build_hasher, item);
        let (pred, found) = self.search(key);
        unsafe {
            (*(*pred).next.load(Ordering::Relaxed)).mutex.unlock();
            (*pred).mutex.unlock();
        }
        found
    }

    // Optimistic search. On return both `pred` and `pred.next` are
    // locked and validated; the caller must unlock them.
    fn search(&self, key: usize) -> (*mut Node<T>, bool) {
        loop {
            unsafe {
                let mut pred = self.head;
                let mut curr = (*pred).next.load(Ordering::Acquire);

                while (*curr).key < key {
                    pred = curr;
                    curr = (*curr).next.load(Ordering::Acquire);
                }

                (*pred).mutex.lock();
                (*curr).mutex.lock();

                if self.validate(pred, curr) {
                    return (pred, (*curr).key == key);
                }

                // The window moved under us; release and retry.
                (*pred).mutex.unlock();
                (*curr).mutex.unlock();
            }
        }
    }

    // Re-traverse from the head to confirm `pred` is still in the list
    // and still points at `curr`.
    fn validate(&self, pred: *mut Node<T>, curr: *mut Node<T>) -> bool {
        unsafe {
            let mut node = self.head;
            while (*node).key <= (*pred).key {
                if node == pred {
                    return (*pred).next.load(Ordering::Relaxed) == curr;
                }
                node = (*node).next.load(Ordering::Acquire);
            }
        }
        false
    }

    fn push_garbage(&self, node: *mut Node<T>) {
        unsafe {
            let mut head = self.garbage.load(Ordering::Relaxed);
            loop {
                (*node).next.store(head, Ordering::Relaxed);
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

impl<T, S> Drop for OptimisticList<T, S> {
    fn drop(&mut self) {
        // Free the logically deleted nodes first, then the live chain.
        let mut node = *self.garbage.get_mut();
        while !node.is_null() {
            let next = unsafe { (*node).next.load(Ordering::Relaxed) };
            unsafe { drop(Box::from_raw(node)) };
            node = next;
        }

        let mut node = self.head;
        while !node.is_null() {
            let next = unsafe { (*node).next.load(Ordering::Relaxed) };
            unsafe { drop(Box::from_raw(node)) };
            node = next;
        }
    }
}
