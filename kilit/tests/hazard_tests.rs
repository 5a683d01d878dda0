//! Hazard-domain tests: reservations block reclamation, exhaustion is
//! reported, unreserved pointers are freed on op_end.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use kilit::{HazardDomain, ReservationExhausted};

// Reports its own drop so tests can observe reclamation.
struct Tracked {
    freed: Arc<AtomicBool>,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.freed.store(true, Ordering::Release);
    }
}

#[test]
fn reservations_are_bounded() {
    let domain = HazardDomain::new();
    domain.register_thread(2);

    let a = 1u32;
    let b = 2u32;
    let c = 3u32;

    assert_eq!(domain.try_reserve(&a as *const u32), Ok(()));
    assert_eq!(domain.try_reserve(&b as *const u32), Ok(()));
    assert_eq!(
        domain.try_reserve(&c as *const u32),
        Err(ReservationExhausted)
    );

    // Freeing a slot makes room again.
    domain.unreserve(&a as *const u32);
    assert_eq!(domain.try_reserve(&c as *const u32), Ok(()));

    domain.op_end();
}

#[test]
#[cfg_attr(miri, ignore)]
fn reserved_pointer_survives_op_end() {
    let domain = Arc::new(HazardDomain::new());
    let freed = Arc::new(AtomicBool::new(false));

    domain.register_thread(4);

    let ptr = Box::into_raw(Box::new(Tracked {
        freed: freed.clone(),
    }));
    assert_eq!(domain.try_reserve(ptr as *const Tracked), Ok(()));

    // A second thread unlinks the pointer and tries to reclaim it.
    let (first_pass_tx, first_pass_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let reclaimer = {
        let domain = domain.clone();
        let ptr = ptr as usize;
        thread::spawn(move || {
            domain.register_thread(4);
            domain.op_begin();
            unsafe { domain.sched_for_reclaim(ptr as *mut Tracked) };
            domain.op_end();
            first_pass_tx.send(()).unwrap();

            // Main unreserves, then we retry.
            release_rx.recv().unwrap();
            domain.op_begin();
            domain.op_end();
        })
    };

    first_pass_rx.recv().unwrap();
    // Still reserved by this thread: must not have been freed.
    assert!(!freed.load(Ordering::Acquire));

    domain.unreserve(ptr as *const Tracked);
    release_tx.send(()).unwrap();
    reclaimer.join().unwrap();

    assert!(freed.load(Ordering::Acquire));
}

#[test]
fn pending_reclaims_are_freed_with_the_domain() {
    let freed = Arc::new(AtomicBool::new(false));
    {
        let domain = HazardDomain::new();
        domain.register_thread(2);

        let ptr = Box::into_raw(Box::new(Tracked {
            freed: freed.clone(),
        }));
        // Reserve it ourselves so op_end cannot free it.
        assert_eq!(domain.try_reserve(ptr as *const Tracked), Ok(()));
        unsafe { domain.sched_for_reclaim(ptr) };

        // Clearing reservations at op_end releases it...
        domain.op_end();
    }
    // ...and at the latest, dropping the domain reclaims everything.
    assert!(freed.load(Ordering::Acquire));
}
