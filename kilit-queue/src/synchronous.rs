//! Synchronous hand-off queue.

use std::cell::UnsafeCell;

use kilit::{ConditionVariable, Lock, TtasLock};

struct State<T> {
    item: Option<T>,
    // Latch admitting one in-flight enqueue at a time; a second enqueuer
    // waits until the first hand-off completes entirely.
    enqueuing: bool,
}

/// Rendezvous queue: no buffer, every transfer is a meeting.
///
/// `enqueue` publishes its item and waits until a `dequeue` consumes it;
/// `dequeue` waits for an item, consumes it, and signals the producer.
/// Both directions block, and each successful transfer pairs exactly one
/// enqueuer with exactly one dequeuer.
pub struct SynchronousQueue<T> {
    state: UnsafeCell<State<T>>,
    mutex: TtasLock,
    cv: ConditionVariable,
}

// `state` is only touched under `mutex`.
unsafe impl<T: Send> Send for SynchronousQueue<T> {}
unsafe impl<T: Send> Sync for SynchronousQueue<T> {}

impl<T> Default for SynchronousQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SynchronousQueue<T> {
    /// Creates the queue with no transfer in flight.
    pub fn new() -> Self {
        Self {
            state: UnsafeCell::new(State {
                item: None,
                enqueuing: false,
            }),
            mutex: TtasLock::new(),
            cv: ConditionVariable::new(),
        }
    }

    /// Hands `value` to a dequeuer, blocking until one takes it.
    pub fn enqueue(&self, value: T) {
        self.mutex.lock();
        unsafe {
            while (*self.state.get()).enqueuing {
                self.cv.wait(&self.mutex);
            }
            (*self.state.get()).enqueuing = true;
            (*self.state.get()).item = Some(value);
            self.cv.notify_all();
            while (*self.state.get()).item.is_some() {
                self.cv.wait(&self.mutex);
            }
            (*self.state.get()).enqueuing = false;
        }
        self.cv.notify_all();
        self.mutex.unlock();
    }

    /// Takes a value from an enqueuer, blocking until one offers.
    pub fn dequeue(&self) -> T {
        self.mutex.lock();
        let value = unsafe {
            while (*self.state.get()).item.is_none() {
                self.cv.wait(&self.mutex);
            }
            (*self.state.get()).item.take().unwrap()
        };
        self.cv.notify_all();
        self.mutex.unlock();
        value
    }
}
