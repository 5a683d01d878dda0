//! Fine-grained list: a lock per node, hand-over-hand traversal.

use std::cell::Cell;
use std::hash::{BuildHasher, Hash};
use std::ptr;

use foldhash::fast::RandomState;
use kilit::{Lock, TtasLock};

use crate::key::{item_key, KEY_MAX, KEY_MIN};

struct Node<T> {
    key: usize,
    item: Option<T>,
    next: Cell<*mut Node<T>>,
    mutex: TtasLock,
}

impl<T> Node<T> {
    fn alloc(key: usize, item: Option<T>) -> *mut Self {
        Box::into_raw(Box::new(Self {
            key,
            item,
            next: Cell::new(ptr::null_mut()),
            mutex: TtasLock::new(),
        }))
    }
}

/// Sorted-set list with per-node locks.
///
/// Traversal is hand-over-hand (lock coupling): lock the successor
/// before releasing the predecessor, keeping at most two nodes locked.
/// Locks are always taken in key order, which rules out deadlock, and
/// physical removal happens with both surrounding locks held, so no
/// deletion marking is needed.
pub struct FineList<T, S = RandomState> {
    head: *mut Node<T>,
    build_hasher: S,
}

unsafe impl<T: Send, S: Send> Send for FineList<T, S> {}
unsafe impl<T: Send, S: Sync> Sync for FineList<T, S> {}

impl<T, S: Default> Default for FineList<T, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S: Default> FineList<T, S> {
    /// Creates an empty list.
    pub fn new() -> Self {
        let head = Node::alloc(KEY_MIN, None);
        let tail = Node::alloc(KEY_MAX, None);
        unsafe { (*head).next.set(tail) };
        Self {
            head,
            build_hasher: S::default(),
        }
    }
}

impl<T: Hash, S: BuildHasher> FineList<T, S> {
    /// Inserts `item`. Returns `false` (dropping `item`) when a matching
    /// key is already present.
    pub fn add(&self, item: T) -> bool {
        let key = item_key(&self.build_hasher, &item);
        let (pred, found) = self.search(key);

        unsafe {
            let curr = (*pred).next.get();
            if !found {
                let node = Node::alloc(key, Some(item));
                (*node).next.set(curr);
                (*pred).next.set(node);
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
            let curr = (*pred).next.get();
            if found {
                (*pred).next.set((*curr).next.get());
                (*curr).mutex.unlock();
                drop(Box::from_raw(curr));
            } else {
                (*curr).mutex.unlock();
            }
            (*pred).mutex.unlock();
        }
        found
    }

    /// Whether an item with `item`'s key is present.
    pub fn contains(&self, item: &T) -> bool {
        let key = item_key(&self.build_hasher, item);
        let (pred, found) = self.search(key);
        unsafe {
            (*(*pred).next.get()).mutex.unlock();
            (*pred).mutex.unlock();
        }
        found
    }

    // Hand-over-hand search. On return both `pred` and `pred.next` are
    // locked; the caller must unlock them.
    fn search(&self, key: usize) -> (*mut Node<T>, bool) {
        unsafe {
            (*self.head).mutex.lock();
            let mut pred = self.head;
            let mut curr = (*pred).next.get();
            (*curr).mutex.lock();

            while (*curr).key < key {
                (*pred).mutex.unlock();
                pred = curr;
                curr = (*curr).next.get();
                (*curr).mutex.lock();
            }

            (pred, (*curr).key == key)
        }
    }
}

impl<T, S> Drop for FineList<T, S> {
    fn drop(&mut self) {
        // Not thread-safe: the caller guarantees exclusive access, as
        // the &mut receiver already enforces.
        let mut node = self.head;
        while !node.is_null() {
            let next = unsafe { (*node).next.get() };
            unsafe { drop(Box::from_raw(node)) };
            node = next;
        }
    }
}
