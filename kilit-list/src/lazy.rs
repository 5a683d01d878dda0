//! Lazy list: optimistic synchronization plus logical deletion.

use std::hash::{BuildHasher, Hash};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use foldhash::fast::RandomState;
use kilit::{Lock, TtasLock};

use crate::key::{item_key, KEY_MAX, KEY_MIN};

struct Node<T> {
    key: usize,
    item: Option<T>,
    next: AtomicPtr<Node<T>>,
    // Logical deletion flag; set (under the node's lock) before the node
    // is unlinked, read without any lock by `contains`.
    marked: AtomicBool,
    mutex: TtasLock,
}

impl<T> Node<T> {
    fn alloc(key: usize, item: Option<T>) -> *mut Self {
        Box::into_raw(Box::new(Self {
            key,
            item,
            next: AtomicPtr::new(ptr::null_mut()),
            marked: AtomicBool::new(false),
            mutex: TtasLock::new(),
        }))
    }
}

/// Sorted-set list with lazy synchronization.
///
/// The structural operations work like [`OptimisticList`] — lockless
/// traversal, lock two nodes, validate — but validation checks the
/// nodes' deletion marks instead of re-traversing the list, and removal
/// is two-phased: set the mark (the linearization point), then unlink.
///
/// `contains` never locks or retries: it traverses once and reports
/// `found and not marked`. It may miss an item inserted concurrently,
/// which is a legal linearization of the two operations.
///
/// [`OptimisticList`]: crate::OptimisticList
pub struct LazyList<T, S = RandomState> {
    head: *mut Node<T>,
    garbage: AtomicPtr<Node<T>>,
    build_hasher: S,
}

unsafe impl<T: Send, S: Send> Send for LazyList<T, S> {}
unsafe impl<T: Send, S: Sync> Sync for LazyList<T, S> {}

impl<T, S: Default> Default for LazyList<T, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S: Default> LazyList<T, S> {
    /// Creates an empty list.
    pub fn new() -> Self {
        let head = Node::alloc(KEY_MIN, None);
        let tail = Node::alloc(KEY_MAX, None);
        unsafe { (*head).next.store(tail, Ordering::Relaxed) };
        Self {
            head,
            // Seeded with a max-key sentinel so readers escaping into the
            // garbage chain through a stale pointer terminate.
            garbage: AtomicPtr::new(Node::alloc(KEY_MAX, None)),
            build_hasher: S::default(),
        }
    }
}

impl<T: Hash, S: BuildHasher> LazyList<T, S> {
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
                // Linearization point; release publishes the node's
                // fields together with the link.
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
                // Phase one, the linearization point: the item is gone
                // the instant the mark lands.
                (*curr).marked.store(true, Ordering::Release);
                // Phase two: physical removal.
                let succ = (*curr).next.load(Ordering::Relaxed);
                (*pred).next.store(succ, Ordering::Release);
                self.push_garbage(curr);
            }
            (*curr).mutex.unlock();
            (*pred).mutex.unlock();
        }
        found
    }

    /// Whether an item with `item`'s key is present. Wait-free: a single
    /// traversal, no locks, no retries.
    pub fn contains(&self, item: &T) -> bool {
        let key = item_key(&self.build_hasher, item);
        unsafe {
            let mut curr = self.head;
            while (*curr).key < key {
                curr = (*curr).next.load(Ordering::Acquire);
            }
            (*curr).key == key && !(*curr).marked.load(Ordering::Acquire)
        }
    }

    // Locates the window for `key` and locks it. On return both `pred`
    // and `pred.next` are locked and validated.
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

                (*pred).mutex.unlock();
                (*curr).mutex.unlock();
            }
        }
    }

    // No re-traversal needed: the marks witness reachability.
    fn validate(&self, pred: *mut Node<T>, curr: *mut Node<T>) -> bool {
        unsafe {
            !(*pred).marked.load(Ordering::Acquire)
                && !(*curr).marked.load(Ordering::Acquire)
                && (*pred).next.load(Ordering::Relaxed) == curr
        }
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

impl<T, S> Drop for LazyList<T, S> {
    fn drop(&mut self) {
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
