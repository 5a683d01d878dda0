//! Coarse-grained list: one lock around everything.

use std::cell::Cell;
use std::hash::{BuildHasher, Hash};
use std::ptr;

use foldhash::fast::RandomState;
use kilit::{LockGuard, TtasLock};

use crate::key::{item_key, KEY_MAX, KEY_MIN};

struct Node<T> {
    key: usize,
    item: Option<T>,
    next: Cell<*mut Node<T>>,
}

impl<T> Node<T> {
    fn sentinel(key: usize) -> *mut Self {
        Box::into_raw(Box::new(Self {
            key,
            item: None,
            next: Cell::new(ptr::null_mut()),
        }))
    }

    fn new(key: usize, item: T) -> *mut Self {
        Box::into_raw(Box::new(Self {
            key,
            item: Some(item),
            next: Cell::new(ptr::null_mut()),
        }))
    }
}

/// Sorted-set list protected by a single whole-list mutex.
///
/// Every operation takes the lock, scans, and releases; operations
/// linearize at the lock acquisition. The baseline the finer-grained
/// lists are measured against.
pub struct CoarseList<T, S = RandomState> {
    head: *mut Node<T>,
    mutex: TtasLock,
    build_hasher: S,
}

unsafe impl<T: Send, S: Send> Send for CoarseList<T, S> {}
unsafe impl<T: Send, S: Sync> Sync for CoarseList<T, S> {}

impl<T, S: Default> Default for CoarseList<T, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S: Default> CoarseList<T, S> {
    /// Creates an empty list: the two sentinels and nothing between.
    pub fn new() -> Self {
        let head = Node::sentinel(KEY_MIN);
        let tail = Node::sentinel(KEY_MAX);
        unsafe { (*head).next.set(tail) };
        Self {
            head,
            mutex: TtasLock::new(),
            build_hasher: S::default(),
        }
    }
}

impl<T: Hash, S: BuildHasher> CoarseList<T, S> {
    /// Inserts `item`. Returns `false` (dropping `item`) when a matching
    /// key is already present.
    pub fn add(&self, item: T) -> bool {
        let key = item_key(&self.build_hasher, &item);
        let _guard = LockGuard::acquire(&self.mutex);

        let (pred, found) = self.search(key);
        if found {
            return false;
        }

        unsafe {
            let node = Node::new(key, item);
            (*node).next.set((*pred).next.get());
            (*pred).next.set(node);
        }
        true
    }

    /// Removes the item matching `item`'s key. Returns whether anything
    /// was removed.
    pub fn remove(&self, item: &T) -> bool {
        let key = item_key(&self.build_hasher, item);
        let _guard = LockGuard::acquire(&self.mutex);

        let (pred, found) = self.search(key);
        if !found {
            return false;
        }

        unsafe {
            let node = (*pred).next.get();
            (*pred).next.set((*node).next.get());
            drop(Box::from_raw(node));
        }
        true
    }

    /// Whether an item with `item`'s key is present.
    pub fn contains(&self, item: &T) -> bool {
        let key = item_key(&self.build_hasher, item);
        let _guard = LockGuard::acquire(&self.mutex);
        self.search(key).1
    }

    // Scan for `key` with the mutex held. Returns the predecessor of the
    // first node with a key >= `key`, and whether that node matches.
    fn search(&self, key: usize) -> (*mut Node<T>, bool) {
        unsafe {
            let mut pred = self.head;
            let mut curr = (*pred).next.get();
            while (*curr).key < key {
                pred = curr;
                curr = (*curr).next.get();
            }
            (pred, (*curr).key == key)
        }
    }
}

impl<T, S> Drop for CoarseList<T, S> {
    fn drop(&mut self) {
        let mut node = self.head;
        while !node.is_null() {
            let next = unsafe { (*node).next.get() };
            unsafe { drop(Box::from_raw(node)) };
            node = next;
        }
    }
}
