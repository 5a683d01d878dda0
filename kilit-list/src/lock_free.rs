//! Lock-free list: Harris–Michael with marked successor pointers.

use std::cell::Cell;
use std::hash::{BuildHasher, Hash};
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use foldhash::fast::RandomState;
use kilit::AtomicMarkablePtr;

use crate::key::{item_key, KEY_MAX, KEY_MIN};

struct Node<T> {
    key: usize,
    item: Option<T>,
    // The mark bit on `next` means *this* node is logically deleted.
    next: AtomicMarkablePtr<Node<T>>,
    // Garbage-list link, written once by the unlinking thread.
    next_deleted: Cell<*mut Node<T>>,
}

impl<T> Node<T> {
    fn alloc(key: usize, item: Option<T>) -> *mut Self {
        Box::into_raw(Box::new(Self {
            key,
            item,
            next: AtomicMarkablePtr::new(ptr::null_mut(), false),
            next_deleted: Cell::new(ptr::null_mut()),
        }))
    }
}

/// Lock-free sorted-set list (Harris–Michael).
///
/// Deletion is announced by setting the mark bit *inside* the deleted
/// node's successor pointer, in the same CAS that fixes the successor
/// value. Traversals treat a marked node as absent, and the internal
/// window search physically unlinks any it encounters. `add` and
/// `remove` are lock-free; `contains` is wait-free.
///
/// Unlinked nodes go onto a CAS-prepended garbage list and are freed
/// when the list is dropped — no traversal can dereference a node after
/// it has disappeared from every live `next` chain, so deferred
/// reclamation is sufficient.
pub struct LockFreeList<T, S = RandomState> {
    head: *mut Node<T>,
    garbage: AtomicPtr<Node<T>>,
    build_hasher: S,
}

unsafe impl<T: Send, S: Send> Send for LockFreeList<T, S> {}
unsafe impl<T: Send, S: Sync> Sync for LockFreeList<T, S> {}

impl<T, S: Default> Default for LockFreeList<T, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S: Default> LockFreeList<T, S> {
    /// Creates an empty list.
    pub fn new() -> Self {
        let head = Node::alloc(KEY_MIN, None);
        let tail = Node::alloc(KEY_MAX, None);
        unsafe { (*head).next.store(tail, false, Ordering::Relaxed) };
        Self {
            head,
            garbage: AtomicPtr::new(ptr::null_mut()),
            build_hasher: S::default(),
        }
    }
}

impl<T: Hash, S: BuildHasher> LockFreeList<T, S> {
    /// Inserts `item`. Returns `false` (dropping `item`) when a matching
    /// key is already present.
    pub fn add(&self, item: T) -> bool {
        let key = item_key(&self.build_hasher, &item);
        let mut item = item;
        loop {
            let (pred, curr) = self.find(key);
            unsafe {
                if (*curr).key == key {
                    return false;
                }

                let node = Node::alloc(key, Some(item));
                (*node).next.store(curr, false, Ordering::Relaxed);

                // Succeeds only if pred is unmarked and still points at
                // curr; the release publishes the new node's fields.
                if (*pred).next.compare_exchange(
                    curr,
                    node,
                    false,
                    false,
                    Ordering::Release,
                    Ordering::Relaxed,
                ) {
                    return true;
                }

                // Lost the race; take the node back and retry.
                let boxed = Box::from_raw(node);
                item = boxed.item.unwrap();
            }
        }
    }

    /// Removes the item matching `item`'s key. Returns whether anything
    /// was removed.
    pub fn remove(&self, item: &T) -> bool {
        let key = item_key(&self.build_hasher, item);
        loop {
            let (pred, curr) = self.find(key);
            unsafe {
                if (*curr).key != key {
                    return false;
                }

                let succ = (*curr).next.load_ptr(Ordering::Acquire);

                // Logical removal — the linearization point. Fails if the
                // successor changed or someone else marked curr first.
                if !(*curr).next.compare_exchange(
                    succ,
                    succ,
                    false,
                    true,
                    Ordering::Release,
                    Ordering::Relaxed,
                ) {
                    continue;
                }

                // Best-effort physical removal; a failure leaves the node
                // for a later `find` to unlink.
                if (*pred).next.compare_exchange(
                    curr,
                    succ,
                    false,
                    false,
                    Ordering::Release,
                    Ordering::Relaxed,
                ) {
                    self.push_garbage(curr);
                }

                return true;
            }
        }
    }

    /// Whether an item with `item`'s key is present. Wait-free: a single
    /// traversal that never CASes.
    pub fn contains(&self, item: &T) -> bool {
        let key = item_key(&self.build_hasher, item);
        unsafe {
            let mut curr = (*self.head).next.load_ptr(Ordering::Acquire);
            while (*curr).key < key {
                curr = (*curr).next.load_ptr(Ordering::Acquire);
            }
            (*curr).key == key && !(*curr).next.is_marked(Ordering::Acquire)
        }
    }

    // Returns the window `(pred, curr)` with `pred.key < key <=
    // curr.key`, both unmarked, unlinking marked nodes along the way. A
    // failed unlink CAS means pred itself changed; restart from head.
    fn find(&self, key: usize) -> (*mut Node<T>, *mut Node<T>) {
        'retry: loop {
            unsafe {
                let mut pred = self.head;
                let mut curr = (*pred).next.load_ptr(Ordering::Acquire);

                loop {
                    let (mut succ, mut marked) = (*curr).next.load(Ordering::Acquire);

                    while marked {
                        if !(*pred).next.compare_exchange(
                            curr,
                            succ,
                            false,
                            false,
                            Ordering::Release,
                            Ordering::Relaxed,
                        ) {
                            // pred was marked or relinked under us.
                            continue 'retry;
                        }
                        self.push_garbage(curr);

                        curr = succ;
                        let (s, m) = (*curr).next.load(Ordering::Acquire);
                        succ = s;
                        marked = m;
                    }

                    if (*curr).key >= key {
                        return (pred, curr);
                    }

                    pred = curr;
                    curr = succ;
                }
            }
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

impl<T, S> Drop for LockFreeList<T, S> {
    fn drop(&mut self) {
        // Physically unlinked nodes live only on the garbage chain; the
        // main chain still holds everything else, marked or not.
        let mut node = *self.garbage.get_mut();
        while !node.is_null() {
            let next = unsafe { (*node).next_deleted.get() };
            unsafe { drop(Box::from_raw(node)) };
            node = next;
        }

        let mut node = self.head;
        while !node.is_null() {
            let next = unsafe { (*node).next.load_ptr(Ordering::Relaxed) };
            unsafe { drop(Box::from_raw(node)) };
            node = next;
        }
    }
}
