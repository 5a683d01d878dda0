//! Kilit: blocking and non-blocking synchronization primitives.
//!
//! This crate is the bottom of the kilit workspace. It provides:
//!
//! - **Atomic tagged pointers**: [`AtomicStampedPtr`] (pointer + 64-bit
//!   stamp in one 128-bit atomic word, defeating ABA) and
//!   [`AtomicMarkablePtr`] (pointer + mark bit packed into the pointer's
//!   alignment bits).
//! - **Exponential backoff**: [`Backoff`], drawing uniformly random delays
//!   and doubling the window up to a bound.
//! - **The lock family**: unfair spinlocks ([`TasLock`], [`TtasLock`],
//!   [`BackoffLock`]), FIFO queue locks ([`TicketLock`], [`ArrayLock`],
//!   [`McsLock`], [`ClhLock`]), the classroom mutual-exclusion protocols
//!   ([`PetersonLock`], [`FilterLock`]), and the timeout-capable locks
//!   ([`TimeoutLock`], [`CompositeLock`]).
//! - **Derived synchronizers** built on the spinlocks and a hand-rolled
//!   [`ConditionVariable`]: [`SimpleRwLock`], [`FifoRwLock`],
//!   [`ReentrantLock`], [`Semaphore`].
//! - **Hazard pointers**: [`HazardDomain`], a reservation-slot reclamation
//!   scheme available to lock-free containers.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::thread;
//! use kilit::{Lock, TtasLock};
//!
//! let lock = Arc::new(TtasLock::new());
//! let mut handles = vec![];
//! for _ in 0..4 {
//!     let lock = lock.clone();
//!     handles.push(thread::spawn(move || {
//!         lock.lock();
//!         // critical section
//!         lock.unlock();
//!     }));
//! }
//! for h in handles {
//!     h.join().unwrap();
//! }
//! ```

#![warn(missing_docs)]

mod backoff;
mod error;
mod hazard;
mod markable;
mod stamped;
mod utils;

pub mod lock;
pub mod sync;

pub use backoff::Backoff;
pub use error::{CvStatus, Empty, NotOwner, ReservationExhausted, Timeout};
pub use hazard::HazardDomain;
pub use lock::{
    ArrayLock, BackoffLock, ClhLock, CompositeLock, FilterLock, Lock, LockGuard, McsLock,
    PetersonLock, TasLock, TicketLock, TimeoutLock, TtasLock,
};
pub use markable::AtomicMarkablePtr;
pub use stamped::AtomicStampedPtr;
pub use sync::{ConditionVariable, FifoRwLock, ReentrantLock, Semaphore, SimpleRwLock};
pub use utils::CacheAligned;
