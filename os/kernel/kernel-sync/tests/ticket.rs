mod common;

use common::Yield;
use kernel_sync::{Mutex, RawTicket, WaitEvent};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

type Ticket = RawTicket<Yield>;

static PARKED: AtomicUsize = AtomicUsize::new(0);
static WOKEN: AtomicUsize = AtomicUsize::new(0);

/// Counts parks and wake-ups the way `wfe` / `sev` would see them.
struct Counted;

impl WaitEvent for Counted {
    fn wait() {
        PARKED.fetch_add(1, Ordering::SeqCst);
        thread::yield_now();
    }

    fn signal() {
        WOKEN.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn waiters_are_served_in_ticket_order() {
    let lock = Arc::new(Ticket::new());
    let log = Arc::new(std::sync::Mutex::new(Vec::new()));

    lock.lock();

    let mut handles = Vec::new();
    for id in 0..4_u16 {
        let waiter = Arc::clone(&lock);
        let log = Arc::clone(&log);
        handles.push(thread::spawn(move || {
            let ticket = waiter.acquire();
            log.lock().unwrap().push((id, ticket));
            unsafe { waiter.unlock() };
        }));

        // Wait until this thread holds its ticket before starting the next one,
        // so the issue order is the spawn order.
        while lock.tickets().next() != id + 2 {
            thread::yield_now();
        }
    }

    assert!(lock.is_contended());
    unsafe { lock.unlock() };

    for h in handles {
        h.join().unwrap();
    }

    let log = log.lock().unwrap();
    assert_eq!(*log, vec![(0, 1), (1, 2), (2, 3), (3, 4)]);
    assert!(!lock.is_locked());
}

#[test]
fn grants_follow_ticket_issue_under_contention() {
    let threads = 4;
    let iters = 500;

    let lock = Arc::new(Ticket::new());
    let grants = Arc::new(std::sync::Mutex::new(Vec::with_capacity(threads * iters)));
    let start = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let lock = Arc::clone(&lock);
            let grants = Arc::clone(&grants);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for _ in 0..iters {
                    let ticket = lock.acquire();
                    grants.lock().unwrap().push(ticket);
                    unsafe { lock.unlock() };
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    // Every grant is the ticket right after the previous one.
    let grants = grants.lock().unwrap();
    assert_eq!(grants.len(), threads * iters);
    for (i, t) in grants.iter().enumerate() {
        assert_eq!(usize::from(*t), i);
    }
}

#[test]
fn try_lock_does_not_queue() {
    let lock = Ticket::new();
    lock.lock();
    let before = lock.tickets();
    for _ in 0..10 {
        assert!(!lock.try_lock());
    }
    assert_eq!(lock.tickets(), before);
    unsafe { lock.unlock() };
    assert!(lock.try_lock());
    unsafe { lock.unlock() };
}

#[test]
fn four_writers_never_interleave() {
    let lock: Arc<Mutex<Vec<u32>, Ticket>> = Arc::new(Mutex::new(Vec::new()));
    let start = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (1..=4_u32)
        .map(|id| {
            let lock = Arc::clone(&lock);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                let mut log = lock.lock();
                log.push(id);
                // Give the others every chance to barge in.
                thread::sleep(Duration::from_millis(5));
                log.push(id);
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    let log = lock.lock();
    assert_eq!(log.len(), 8);
    for pair in log.chunks(2) {
        assert_eq!(pair[0], pair[1], "critical sections interleaved: {:?}", *log);
    }

    let mut ids: Vec<u32> = log.chunks(2).map(|p| p[0]).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3, 4]);
}

#[test]
fn queued_waiter_parks_until_release_signals() {
    let lock = Arc::new(RawTicket::<Counted>::new());
    lock.lock();
    assert_eq!(PARKED.load(Ordering::SeqCst), 0);

    let waiter = Arc::clone(&lock);
    let h = thread::spawn(move || {
        waiter.lock();
        unsafe { waiter.unlock() };
    });

    while PARKED.load(Ordering::SeqCst) == 0 {
        thread::yield_now();
    }
    assert_eq!(WOKEN.load(Ordering::SeqCst), 0);

    unsafe { lock.unlock() };
    h.join().unwrap();

    // One signal per release: ours and the waiter's.
    assert_eq!(WOKEN.load(Ordering::SeqCst), 2);
    assert!(!lock.is_locked());
}
