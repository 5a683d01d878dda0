//! LIFO and elimination behavior of the stack family.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use kilit::Empty;
use kilit_stack::{EliminationBackoffStack, TreiberStack};

#[test]
fn treiber_stack_is_lifo() {
    let stack = TreiberStack::new();
    assert_eq!(stack.pop(), Err(Empty));

    for i in 1..=100 {
        stack.push(i);
    }
    for i in (1..=100).rev() {
        assert_eq!(stack.pop(), Ok(i));
    }
    assert_eq!(stack.pop(), Err(Empty));
}

#[test]
#[cfg_attr(miri, ignore)]
fn treiber_stack_multiset_is_conserved() {
    const THREADS: usize = 4;
    const PER_THREAD: usize = 2_000;

    let stack = Arc::new(TreiberStack::new());
    let seen = Arc::new(std::sync::Mutex::new(HashSet::new()));

    let mut handles = vec![];
    for t in 0..THREADS {
        let stack = stack.clone();
        handles.push(thread::spawn(move || {
            for i in 0..PER_THREAD {
                stack.push(t * PER_THREAD + i);
            }
        }));
    }
    for _ in 0..THREADS {
        let stack = stack.clone();
        let seen = seen.clone();
        handles.push(thread::spawn(move || {
            let mut taken = vec![];
            for _ in 0..PER_THREAD {
                loop {
                    if let Ok(value) = stack.pop() {
                        taken.push(value);
                        break;
                    }
                    thread::yield_now();
                }
            }
            seen.lock().unwrap().extend(taken);
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(seen.lock().unwrap().len(), THREADS * PER_THREAD);
    assert_eq!(stack.pop(), Err(Empty));
}

// Per-thread LIFO residue: a thread that pushes then immediately pops
// with no interference must get its own value back.
#[test]
#[cfg_attr(miri, ignore)]
fn treiber_stack_uncontended_push_pop_pairs() {
    let stack = Arc::new(TreiberStack::new());

    let mut handles = vec![];
    for t in 0..4 {
        let stack = stack.clone();
        handles.push(thread::spawn(move || {
            for i in 0..1_000 {
                stack.push((t, i));
                // Someone's pair, not necessarily ours, under contention;
                // the stack stays balanced either way.
                assert!(stack.pop().is_ok());
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(stack.pop(), Err(Empty));
}

#[test]
fn elimination_stack_single_thread() {
    let stack = EliminationBackoffStack::new(16);

    stack.push(42);
    assert_eq!(stack.pop(), Ok(42));
    assert_eq!(stack.pop(), Err(Empty));

    for i in 1..=50 {
        stack.push(i);
    }
    for i in (1..=50).rev() {
        assert_eq!(stack.pop(), Ok(i));
    }
}

// Sixteen threads of alternating push/pop pairs; the arrival rate keeps
// the elimination array busy, and every operation must still complete
// with the multiset conserved.
#[test]
#[cfg_attr(miri, ignore)]
fn elimination_stack_alternating_pairs_complete() {
    const THREADS: usize = 16;
    const PAIRS: usize = 1_000;

    let stack = Arc::new(EliminationBackoffStack::new(16));
    let popped = Arc::new(AtomicUsize::new(0));

    let mut handles = vec![];
    for t in 0..THREADS {
        let stack = stack.clone();
        let popped = popped.clone();
        handles.push(thread::spawn(move || {
            for i in 0..PAIRS {
                stack.push(t * PAIRS + i);
                loop {
                    if stack.pop().is_ok() {
                        popped.fetch_add(1, Ordering::Relaxed);
                        break;
                    }
                    thread::yield_now();
                }
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(popped.load(Ordering::Relaxed), THREADS * PAIRS);
    assert_eq!(stack.pop(), Err(Empty));
}

#[test]
#[cfg_attr(miri, ignore)]
fn elimination_stack_multiset_is_conserved() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 1_000;

    let stack = Arc::new(EliminationBackoffStack::new(8));
    let seen = Arc::new(std::sync::Mutex::new(HashSet::new()));

    let mut handles = vec![];
    for t in 0..THREADS / 2 {
        let stack = stack.clone();
        handles.push(thread::spawn(move || {
            for i in 0..PER_THREAD {
                stack.push(t * PER_THREAD + i);
            }
        }));
    }
    for _ in 0..THREADS / 2 {
        let stack = stack.clone();
        let seen = seen.clone();
        handles.push(thread::spawn(move || {
            let mut taken = vec![];
            for _ in 0..PER_THREAD {
                loop {
                    if let Ok(value) = stack.pop() {
                        taken.push(value);
                        break;
                    }
                    thread::yield_now();
                }
            }
            seen.lock().unwrap().extend(taken);
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(seen.lock().unwrap().len(), THREADS / 2 * PER_THREAD);
    assert_eq!(stack.pop(), Err(Empty));
}
