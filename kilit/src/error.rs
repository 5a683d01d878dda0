//! Typed errors shared across the kilit workspace.

use std::fmt;

/// Returned when popping or dequeuing from an empty non-blocking container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Empty;

impl fmt::Display for Empty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "operation on an empty container")
    }
}

impl std::error::Error for Empty {}

/// Returned when a deadline elapses inside a timed operation.
///
/// The timeout-capable locks catch this internally and surface a `false`
/// `try_lock` result; the exchanger surfaces it to its caller directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout;

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deadline elapsed before the operation could complete")
    }
}

impl std::error::Error for Timeout {}

/// Returned by [`ReentrantLock::unlock`] when the caller does not hold the
/// lock. This is a caller bug, not a transient condition.
///
/// [`ReentrantLock::unlock`]: crate::ReentrantLock::unlock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotOwner;

impl fmt::Display for NotOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "the calling thread does not hold the lock")
    }
}

impl std::error::Error for NotOwner {}

/// Returned when a thread's hazard-pointer reservation slots are all in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationExhausted;

impl fmt::Display for ReservationExhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no free hazard-pointer reservation slot")
    }
}

impl std::error::Error for ReservationExhausted {}

/// Outcome of a timed condition-variable wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CvStatus {
    /// The wait returned because the waiter was notified.
    NoTimeout,
    /// The wait returned because the deadline elapsed.
    Timeout,
}
