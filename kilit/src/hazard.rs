//! Hazard-pointer reclamation domain.
//!
//! A reservation-slot scheme for lock-free containers: readers reserve
//! the pointers they are about to dereference, retirers defer frees
//! until no thread reserves the pointer. This module is self-contained —
//! the containers in this workspace default to their simpler
//! garbage-list scheme and can adopt hazard pointers without any change
//! in external behavior.

use std::cell::{Cell, UnsafeCell};
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::error::ReservationExhausted;

struct Reclaim {
    ptr: *mut (),
    drop_fn: unsafe fn(*mut ()),
}

impl Reclaim {
    fn new<T>(ptr: *mut T) -> Self {
        unsafe fn drop_box<T>(ptr: *mut ()) {
            unsafe { drop(Box::from_raw(ptr as *mut T)) };
        }
        Self {
            ptr: ptr as *mut (),
            drop_fn: drop_box::<T>,
        }
    }
}

impl Drop for Reclaim {
    fn drop(&mut self) {
        unsafe { (self.drop_fn)(self.ptr) };
    }
}

struct ThreadContext {
    // Read by every thread scanning for reservations.
    reservations: Box<[AtomicPtr<()>]>,
    // Owned by the registering thread.
    pending_reclaims: UnsafeCell<Vec<Reclaim>>,
    // Immutable once the context is published.
    next: *mut ThreadContext,
}

thread_local! {
    static SELF_CTX: Cell<*mut ThreadContext> = const { Cell::new(ptr::null_mut()) };
}

/// A hazard-pointer domain.
///
/// Threads register once, reserving a bounded number of slots; between
/// `op_begin` and `op_end` they may [`try_reserve`] pointers they intend
/// to dereference and [`sched_for_reclaim`] pointers they unlinked.
/// `op_end` clears the thread's reservations and frees every pending
/// pointer no longer reserved by *any* registered thread.
///
/// Thread contexts live until the domain is dropped; a thread
/// participates in at most one domain at a time. Dropping the domain
/// frees all contexts and any still-pending pointers, and requires that
/// no thread is inside an operation.
///
/// [`try_reserve`]: HazardDomain::try_reserve
/// [`sched_for_reclaim`]: HazardDomain::sched_for_reclaim
pub struct HazardDomain {
    head: AtomicPtr<ThreadContext>,
}

unsafe impl Send for HazardDomain {}
unsafe impl Sync for HazardDomain {}

impl HazardDomain {
    /// Creates a domain with no registered threads.
    pub fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Registers the calling thread with `slots` reservation slots.
    /// Call once per thread, before any other operation.
    pub fn register_thread(&self, slots: usize) {
        let ctx = Box::into_raw(Box::new(ThreadContext {
            reservations: (0..slots)
                .map(|_| AtomicPtr::new(ptr::null_mut()))
                .collect(),
            pending_reclaims: UnsafeCell::new(Vec::new()),
            next: ptr::null_mut(),
        }));

        let mut head = self.head.load(Ordering::Acquire);
        loop {
            unsafe { (*ctx).next = head };
            match self
                .head
                .compare_exchange_weak(head, ctx, Ordering::Release, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(current) => head = current,
            }
        }

        SELF_CTX.with(|c| c.set(ctx));
    }

    /// Marks the beginning of a concurrent operation.
    pub fn op_begin(&self) {}

    /// Schedules `ptr` for deferred reclamation. `ptr` must have been
    /// allocated by `Box` and must no longer be reachable from the
    /// structure's live reference chains.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `Box::into_raw` and must not be scheduled
    /// twice.
    pub unsafe fn sched_for_reclaim<T>(&self, ptr: *mut T) {
        let ctx = self.self_ctx();
        unsafe { (*(*ctx).pending_reclaims.get()).push(Reclaim::new(ptr)) };
    }

    /// Reserves `ptr`, protecting it from reclamation until
    /// [`unreserve`](HazardDomain::unreserve) or
    /// [`op_end`](HazardDomain::op_end).
    ///
    /// # Errors
    ///
    /// Returns [`ReservationExhausted`] when every slot of the calling
    /// thread is in use.
    pub fn try_reserve<T>(&self, ptr: *const T) -> Result<(), ReservationExhausted> {
        let ctx = self.self_ctx();
        let reservations = unsafe { &(*ctx).reservations };
        for reservation in reservations.iter() {
            if reservation.load(Ordering::Relaxed).is_null() {
                reservation.store(ptr as *mut (), Ordering::Release);
                return Ok(());
            }
        }
        Err(ReservationExhausted)
    }

    /// Drops the calling thread's reservation of `ptr`, if any.
    pub fn unreserve<T>(&self, ptr: *const T) {
        let ctx = self.self_ctx();
        let reservations = unsafe { &(*ctx).reservations };
        for reservation in reservations.iter() {
            if ptr::eq(reservation.load(Ordering::Relaxed), ptr as *mut ()) {
                reservation.store(ptr::null_mut(), Ordering::Release);
            }
        }
    }

    /// Marks the end of a concurrent operation: clears the calling
    /// thread's reservations and frees its pending pointers that no
    /// thread currently reserves.
    pub fn op_end(&self) {
        let ctx = self.self_ctx();
        let reservations = unsafe { &(*ctx).reservations };
        for reservation in reservations.iter() {
            reservation.store(ptr::null_mut(), Ordering::Release);
        }

        let pending = unsafe { &mut *(*ctx).pending_reclaims.get() };
        // Dropping a Reclaim frees its pointer; the retained ones stay
        // pending for a later op_end.
        pending.retain(|reclaim| !self.is_unreserved(reclaim.ptr));
    }

    fn self_ctx(&self) -> *mut ThreadContext {
        let ctx = SELF_CTX.with(|c| c.get());
        assert!(
            !ctx.is_null(),
            "thread used a HazardDomain without calling register_thread"
        );
        ctx
    }

    // Whether no registered thread currently reserves `ptr`.
    fn is_unreserved(&self, ptr: *mut ()) -> bool {
        let mut curr = self.head.load(Ordering::Acquire);
        while !curr.is_null() {
            unsafe {
                for reservation in (*curr).reservations.iter() {
                    if ptr::eq(reservation.load(Ordering::Acquire), ptr) {
                        return false;
                    }
                }
                curr = (*curr).next;
            }
        }
        true
    }
}

impl Default for HazardDomain {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for HazardDomain {
    fn drop(&mut self) {
        let mut curr = *self.head.get_mut();
        while !curr.is_null() {
            let ctx = unsafe { Box::from_raw(curr) };
            curr = ctx.next;
            // Dropping the context drops its pending reclaims, freeing
            // whatever was still deferred.
        }
    }
}
