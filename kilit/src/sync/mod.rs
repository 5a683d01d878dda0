//! Synchronizers derived from the lock family: a hand-built condition
//! variable and the reader/writer, reentrant, and counting primitives
//! layered on top of it.

mod condvar;
mod reentrant;
mod rwlock;
mod semaphore;

pub use condvar::ConditionVariable;
pub use reentrant::ReentrantLock;
pub use rwlock::{FifoRwLock, SimpleRwLock};
pub use semaphore::Semaphore;
