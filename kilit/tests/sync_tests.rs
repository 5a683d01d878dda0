//! Condition variable and derived-synchronizer tests.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use kilit::{
    ConditionVariable, CvStatus, FifoRwLock, Lock, NotOwner, ReentrantLock, Semaphore,
    SimpleRwLock, TtasLock,
};

// Shared mutable state for the monitor-style tests; only touched with
// the accompanying mutex held.
struct Guarded<T>(UnsafeCell<T>);

unsafe impl<T: Send> Sync for Guarded<T> {}

impl<T> Guarded<T> {
    fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }

    unsafe fn get(&self) -> *mut T {
        self.0.get()
    }
}

// Producer/consumer over a tiny monitor buffer: every produced item is
// consumed, none invented, no lost wakeups.
#[test]
#[cfg_attr(miri, ignore)]
fn condvar_producer_consumer_loses_no_wakeups() {
    const ITEMS: u32 = 10_000;
    const CAPACITY: u32 = 4;

    let mutex = Arc::new(TtasLock::new());
    let cv = Arc::new(ConditionVariable::new());
    let buffered = Arc::new(Guarded::new(0u32));
    let consumed = Arc::new(AtomicU32::new(0));

    let producer = {
        let mutex = mutex.clone();
        let cv = cv.clone();
        let buffered = buffered.clone();
        thread::spawn(move || {
            for _ in 0..ITEMS {
                mutex.lock();
                cv.wait_while(&*mutex, || unsafe { *buffered.get() } == CAPACITY);
                unsafe { *buffered.get() += 1 };
                mutex.unlock();
                cv.notify_all();
            }
        })
    };

    let consumer = {
        let mutex = mutex.clone();
        let cv = cv.clone();
        let buffered = buffered.clone();
        let consumed = consumed.clone();
        thread::spawn(move || {
            for _ in 0..ITEMS {
                mutex.lock();
                cv.wait_while(&*mutex, || unsafe { *buffered.get() } == 0);
                unsafe { *buffered.get() -= 1 };
                mutex.unlock();
                cv.notify_all();
                consumed.fetch_add(1, Ordering::Relaxed);
            }
        })
    };

    producer.join().unwrap();
    consumer.join().unwrap();

    assert_eq!(consumed.load(Ordering::Relaxed), ITEMS);
    assert_eq!(unsafe { *buffered.get() }, 0);
}

#[test]
#[cfg_attr(miri, ignore)]
fn condvar_wait_for_times_out_without_notifier() {
    let mutex = TtasLock::new();
    let cv = ConditionVariable::new();

    mutex.lock();
    let start = Instant::now();
    let status = cv.wait_for(&mutex, Duration::from_millis(20));
    mutex.unlock();

    assert_eq!(status, CvStatus::Timeout);
    assert!(start.elapsed() >= Duration::from_millis(20));
}

#[test]
#[cfg_attr(miri, ignore)]
fn condvar_notify_one_wakes_exactly_one_waiter() {
    let mutex = Arc::new(TtasLock::new());
    let cv = Arc::new(ConditionVariable::new());
    let woken = Arc::new(AtomicU32::new(0));

    let mut handles = vec![];
    for _ in 0..3 {
        let mutex = mutex.clone();
        let cv = cv.clone();
        let woken = woken.clone();
        handles.push(thread::spawn(move || {
            mutex.lock();
            cv.wait(&*mutex);
            woken.fetch_add(1, Ordering::Relaxed);
            mutex.unlock();
        }));
    }

    // Let all three park.
    thread::sleep(Duration::from_millis(100));

    cv.notify_one();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(woken.load(Ordering::Relaxed), 1);

    cv.notify_all();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(woken.load(Ordering::Relaxed), 3);
}

// Readers may overlap each other; writers overlap nothing.
macro_rules! rwlock_exclusion_test {
    ($name:ident, $lock:expr) => {
        #[test]
        #[cfg_attr(miri, ignore)]
        fn $name() {
            const READERS: usize = 4;
            const WRITERS: usize = 2;
            const ROUNDS: usize = 200;

            let lock = Arc::new($lock);
            let active_readers = Arc::new(AtomicU32::new(0));
            let active_writers = Arc::new(AtomicU32::new(0));
            let max_readers = Arc::new(AtomicU32::new(0));
            let overlap = Arc::new(AtomicBool::new(false));

            let mut handles = vec![];
            for _ in 0..READERS {
                let lock = lock.clone();
                let active_readers = active_readers.clone();
                let active_writers = active_writers.clone();
                let max_readers = max_readers.clone();
                let overlap = overlap.clone();
                handles.push(thread::spawn(move || {
                    for _ in 0..ROUNDS {
                        lock.read_lock();
                        let now = active_readers.fetch_add(1, Ordering::SeqCst) + 1;
                        max_readers.fetch_max(now, Ordering::SeqCst);
                        if active_writers.load(Ordering::SeqCst) != 0 {
                            overlap.store(true, Ordering::SeqCst);
                        }
                        thread::yield_now();
                        active_readers.fetch_sub(1, Ordering::SeqCst);
                        lock.read_unlock();
                    }
                }));
            }
            for _ in 0..WRITERS {
                let lock = lock.clone();
                let active_readers = active_readers.clone();
                let active_writers = active_writers.clone();
                let overlap = overlap.clone();
                handles.push(thread::spawn(move || {
                    for _ in 0..ROUNDS {
                        lock.write_lock();
                        let writers = active_writers.fetch_add(1, Ordering::SeqCst) + 1;
                        if writers != 1 || active_readers.load(Ordering::SeqCst) != 0 {
                            overlap.store(true, Ordering::SeqCst);
                        }
                        thread::yield_now();
                        active_writers.fetch_sub(1, Ordering::SeqCst);
                        lock.write_unlock();
                    }
                }));
            }
            for h in handles {
                h.join().unwrap();
            }

            assert!(!overlap.load(Ordering::SeqCst), "writer overlapped someone");
            assert!(
                max_readers.load(Ordering::SeqCst) >= 2,
                "readers never overlapped; the lock is too strict"
            );
        }
    };
}

rwlock_exclusion_test!(simple_rwlock_reader_writer_exclusion, SimpleRwLock::new());
rwlock_exclusion_test!(fifo_rwlock_reader_writer_exclusion, FifoRwLock::new());

#[test]
#[cfg_attr(miri, ignore)]
fn fifo_rwlock_admits_writer_under_reader_stream() {
    let lock = Arc::new(FifoRwLock::new());
    let writer_done = Arc::new(AtomicBool::new(false));

    // A steady stream of short readers.
    let mut readers = vec![];
    for _ in 0..4 {
        let lock = lock.clone();
        let writer_done = writer_done.clone();
        readers.push(thread::spawn(move || {
            while !writer_done.load(Ordering::SeqCst) {
                lock.read_lock();
                thread::yield_now();
                lock.read_unlock();
            }
        }));
    }

    let writer = {
        let lock = lock.clone();
        let writer_done = writer_done.clone();
        thread::spawn(move || {
            lock.write_lock();
            lock.write_unlock();
            writer_done.store(true, Ordering::SeqCst);
        })
    };

    writer.join().unwrap();
    for r in readers {
        r.join().unwrap();
    }
    assert!(writer_done.load(Ordering::SeqCst));
}

#[test]
fn reentrant_lock_allows_same_thread_relock() {
    let lock = ReentrantLock::new();
    lock.lock();
    lock.lock();
    assert_eq!(lock.unlock(), Ok(()));
    assert_eq!(lock.unlock(), Ok(()));
    // The count is zero now; another unlock is a caller bug.
    assert_eq!(lock.unlock(), Err(NotOwner));
}

#[test]
#[cfg_attr(miri, ignore)]
fn reentrant_lock_rejects_non_owner_unlock() {
    let lock = Arc::new(ReentrantLock::new());
    lock.lock();

    let intruder = {
        let lock = lock.clone();
        thread::spawn(move || lock.unlock())
    };
    assert_eq!(intruder.join().unwrap(), Err(NotOwner));

    assert_eq!(lock.unlock(), Ok(()));
}

#[test]
#[cfg_attr(miri, ignore)]
fn reentrant_lock_excludes_other_threads() {
    const THREADS: u32 = 4;
    const ITERATIONS: u32 = 2_000;

    let lock = Arc::new(ReentrantLock::new());
    let counter = Arc::new(Guarded::new(0u32));

    let mut handles = vec![];
    for _ in 0..THREADS {
        let lock = lock.clone();
        let counter = counter.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..ITERATIONS {
                lock.lock();
                // Nested hold exercises the count path under contention.
                lock.lock();
                unsafe { *counter.get() += 1 };
                lock.unlock().unwrap();
                lock.unlock().unwrap();
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(unsafe { *counter.get() }, THREADS * ITERATIONS);
}

#[test]
#[cfg_attr(miri, ignore)]
fn semaphore_bounds_concurrency() {
    const PERMITS: u64 = 3;
    const THREADS: usize = 8;

    let semaphore = Arc::new(Semaphore::new(PERMITS));
    let inside = Arc::new(AtomicU32::new(0));
    let too_many = Arc::new(AtomicBool::new(false));

    let mut handles = vec![];
    for _ in 0..THREADS {
        let semaphore = semaphore.clone();
        let inside = inside.clone();
        let too_many = too_many.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..200 {
                semaphore.acquire();
                if inside.fetch_add(1, Ordering::SeqCst) + 1 > PERMITS as u32 {
                    too_many.store(true, Ordering::SeqCst);
                }
                thread::yield_now();
                inside.fetch_sub(1, Ordering::SeqCst);
                semaphore.release();
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert!(!too_many.load(Ordering::SeqCst));
    assert_eq!(semaphore.value(), PERMITS);
}

#[test]
fn semaphore_try_acquire_paths() {
    let semaphore = Semaphore::new(2);

    assert!(semaphore.try_acquire());
    assert!(semaphore.try_acquire_n(1));
    assert!(!semaphore.try_acquire());
    assert_eq!(semaphore.value(), 0);

    let start = Instant::now();
    assert!(!semaphore.try_acquire_for(Duration::from_millis(20)));
    assert!(start.elapsed() >= Duration::from_millis(20));

    semaphore.release_n(2);
    assert!(semaphore.try_acquire_n(2));
    semaphore.release();
    assert!(semaphore.try_acquire_for(Duration::from_millis(20)));
}
