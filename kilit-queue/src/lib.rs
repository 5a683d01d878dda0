//! FIFO queues for Kilit.
//!
//! - [`UnboundedQueue`]: two locks (one per end), sentinel head;
//!   non-blocking `dequeue` that reports [`Empty`].
//! - [`BoundedQueue`]: capacity-limited monitor queue; both ends block.
//! - [`LockFreeQueue`]: Michael–Scott with helping; no locks at all.
//! - [`RecycleQueue`]: Michael–Scott over stamped pointers with a
//!   lock-free free list for node reuse.
//! - [`SynchronousQueue`]: no buffer; enqueue and dequeue rendezvous.
//!
//! [`Empty`]: kilit::Empty

mod bounded;
mod lock_free;
mod recycle;
mod synchronous;
mod unbounded;

pub use bounded::BoundedQueue;
pub use lock_free::LockFreeQueue;
pub use recycle::RecycleQueue;
pub use synchronous::SynchronousQueue;
pub use unbounded::UnboundedQueue;
