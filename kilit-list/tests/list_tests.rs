//! Set-semantics and stress tests for the five list flavours.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use kilit_list::{CoarseList, FineList, LazyList, LockFreeList, OptimisticList};

// The canonical sequence: duplicate adds rejected, removal works, and
// a removed item is gone.
macro_rules! sequential_set_semantics {
    ($name:ident, $list:expr) => {
        #[test]
        fn $name() {
            let list = $list;
            assert!(list.add(1));
            assert!(!list.add(1));
            assert!(list.remove(&1));
            assert!(!list.contains(&1));
            assert!(!list.remove(&1));

            assert!(list.add(2));
            assert!(list.add(3));
            assert!(list.contains(&2));
            assert!(list.contains(&3));
            assert!(!list.contains(&4));
        }
    };
}

sequential_set_semantics!(coarse_set_semantics, CoarseList::<i32>::new());
sequential_set_semantics!(fine_set_semantics, FineList::<i32>::new());
sequential_set_semantics!(optimistic_set_semantics, OptimisticList::<i32>::new());
sequential_set_semantics!(lazy_set_semantics, LazyList::<i32>::new());
sequential_set_semantics!(lock_free_set_semantics, LockFreeList::<i32>::new());

// Items whose values sit on the key-space boundaries must behave like
// any other item; the sentinels own the actual boundary keys.
#[test]
fn lock_free_list_handles_boundary_values() {
    let list = LockFreeList::<usize>::new();

    assert!(!list.contains(&usize::MIN));
    assert!(!list.contains(&usize::MAX));

    assert!(list.add(usize::MIN));
    assert!(list.add(usize::MAX));

    assert!(list.contains(&usize::MIN));
    assert!(list.contains(&usize::MAX));

    assert!(list.remove(&usize::MIN));
    assert!(list.remove(&usize::MAX));
    assert!(!list.contains(&usize::MIN));
    assert!(!list.contains(&usize::MAX));
}

#[test]
fn coarse_list_handles_boundary_values() {
    let list = CoarseList::<usize>::new();
    assert!(list.add(usize::MIN));
    assert!(list.add(usize::MAX));
    assert!(list.contains(&usize::MIN));
    assert!(list.contains(&usize::MAX));
}

// Each value is contested by two adders and one remover; ledger counts
// must balance: successful adds - successful removes = final presence.
macro_rules! contended_set_stress {
    ($name:ident, $list:expr) => {
        #[test]
        #[cfg_attr(miri, ignore)]
        fn $name() {
            const VALUES: usize = 512;

            let list = Arc::new($list);
            let added = Arc::new(AtomicUsize::new(0));
            let removed = Arc::new(AtomicUsize::new(0));

            let mut handles = vec![];
            for _ in 0..2 {
                let list = list.clone();
                let added = added.clone();
                handles.push(thread::spawn(move || {
                    for v in 0..VALUES {
                        if list.add(v) {
                            added.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }));
            }
            {
                let list = list.clone();
                let removed = removed.clone();
                handles.push(thread::spawn(move || {
                    for v in 0..VALUES {
                        if list.remove(&v) {
                            removed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }));
            }
            for h in handles {
                h.join().unwrap();
            }

            let present = (0..VALUES).filter(|v| list.contains(v)).count();
            assert_eq!(
                added.load(Ordering::Relaxed) - removed.load(Ordering::Relaxed),
                present
            );
            // Two adders racing on the same value: exactly one wins per
            // still-present value, so presence never exceeds VALUES.
            assert!(present <= VALUES);
        }
    };
}

contended_set_stress!(coarse_contended_stress, CoarseList::<usize>::new());
contended_set_stress!(fine_contended_stress, FineList::<usize>::new());
contended_set_stress!(optimistic_contended_stress, OptimisticList::<usize>::new());
contended_set_stress!(lazy_contended_stress, LazyList::<usize>::new());
contended_set_stress!(lock_free_contended_stress, LockFreeList::<usize>::new());

// Disjoint per-thread ranges: all adds and removes must succeed, and
// the survivors are exactly the odd-indexed values.
macro_rules! disjoint_range_stress {
    ($name:ident, $list:expr) => {
        #[test]
        #[cfg_attr(miri, ignore)]
        fn $name() {
            const THREADS: usize = 4;
            const PER_THREAD: usize = 256;

            let list = Arc::new($list);

            let mut handles = vec![];
            for t in 0..THREADS {
                let list = list.clone();
                handles.push(thread::spawn(move || {
                    let base = t * PER_THREAD;
                    for v in base..base + PER_THREAD {
                        assert!(list.add(v));
                    }
                    for v in (base..base + PER_THREAD).step_by(2) {
                        assert!(list.remove(&v));
                    }
                }));
            }
            for h in handles {
                h.join().unwrap();
            }

            for v in 0..THREADS * PER_THREAD {
                assert_eq!(list.contains(&v), v % 2 == 1, "value {v}");
            }
        }
    };
}

disjoint_range_stress!(coarse_disjoint_stress, CoarseList::<usize>::new());
disjoint_range_stress!(fine_disjoint_stress, FineList::<usize>::new());
disjoint_range_stress!(optimistic_disjoint_stress, OptimisticList::<usize>::new());
disjoint_range_stress!(lazy_disjoint_stress, LazyList::<usize>::new());
disjoint_range_stress!(lock_free_disjoint_stress, LockFreeList::<usize>::new());

// Lazy and lock-free `contains` never block, even while writers churn.
#[test]
#[cfg_attr(miri, ignore)]
fn lazy_contains_is_nonblocking_under_churn() {
    let list = Arc::new(LazyList::<usize>::new());
    for v in 0..64 {
        list.add(v);
    }

    let churn = {
        let list = list.clone();
        thread::spawn(move || {
            for _ in 0..200 {
                for v in 64..96 {
                    list.add(v);
                    list.remove(&v);
                }
            }
        })
    };

    for _ in 0..200 {
        for v in 0..64 {
            assert!(list.contains(&v));
        }
    }
    churn.join().unwrap();
}
