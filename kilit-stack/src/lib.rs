//! LIFO stacks for Kilit.
//!
//! - [`TreiberStack`]: the classic single-CAS-on-top stack, with
//!   randomized exponential backoff between failed attempts.
//! - [`EliminationBackoffStack`]: a Treiber stack that, under
//!   contention, pairs pushes directly with concurrent pops through an
//!   array of lock-free exchangers — an eliminated pair never touches
//!   the top pointer at all.

mod elimination;
mod treiber;

pub use elimination::EliminationBackoffStack;
pub use treiber::TreiberStack;
