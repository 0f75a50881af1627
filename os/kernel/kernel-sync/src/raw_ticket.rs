use crate::atomic::{AtomicWord, exclusive_update};
use crate::barrier::smp_mb;
use crate::event::{Spin, WaitEvent};
use crate::{RawLock, RawUnlock};
use bitfield_struct::bitfield;
use core::fmt;
use core::marker::PhantomData;
use core::sync::atomic::AtomicU32;

/// The ticket lock word.
///
/// Both halves wrap at 16 bits. The lock is free iff `owner == next`;
/// `next - owner` is the number of cores holding or queued for it.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct Tickets {
    /// Bits 0–15 — ticket currently allowed into the critical section.
    pub owner: u16,

    /// Bits 16–31 — next ticket to hand out.
    pub next: u16,
}

impl Tickets {
    #[inline]
    #[must_use]
    pub const fn is_locked(self) -> bool {
        self.owner() != self.next()
    }

    /// More than one ticket outstanding: someone is queued behind the holder.
    #[inline]
    #[must_use]
    pub const fn is_contended(self) -> bool {
        self.next().wrapping_sub(self.owner()) > 1
    }
}

/// Adds one to `next`; the carry out of bit 31 is discarded.
const TICKET_INC: u32 = 1 << 16;

/// FIFO ticket spinlock.
///
/// Acquire takes a ticket by incrementing `next` with one exclusive sequence,
/// then parks on `E` until `owner` reaches it. Release bumps `owner`, which
/// hands the lock to exactly the next ticket holder.
///
/// Not recursive: taking a ticket while already holding one deadlocks.
pub struct RawTicket<E = Spin> {
    slock: AtomicU32,
    _event: PhantomData<fn() -> E>,
}

impl<E> Default for RawTicket<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for RawTicket<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = self.tickets();
        write!(f, "RawTicket(o: {}, n: {})", t.owner(), t.next())
    }
}

impl<E> RawTicket<E> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slock: AtomicU32::new(0),
            _event: PhantomData,
        }
    }

    /// Unsynchronized snapshot of the lock word.
    #[inline]
    #[must_use]
    pub fn tickets(&self) -> Tickets {
        Tickets::from_bits(AtomicWord::load(&self.slock))
    }

    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.tickets().is_locked()
    }

    #[inline]
    #[must_use]
    pub fn is_contended(&self) -> bool {
        self.tickets().is_contended()
    }
}

impl<E: WaitEvent> RawTicket<E> {
    /// Takes a ticket, waits for it to be served and returns it.
    #[inline]
    #[must_use]
    pub fn acquire(&self) -> u16 {
        let (Ok(old) | Err(old)) =
            exclusive_update(&self.slock, |v| Some(v.wrapping_add(TICKET_INC)));
        let old = Tickets::from_bits(old);
        let ticket = old.next();

        let mut owner = old.owner();
        while owner != ticket {
            E::wait();
            owner = self.tickets().owner();
        }

        smp_mb();
        ticket
    }

    #[inline]
    pub fn lock(&self) {
        let _ = self.acquire();
    }

    /// Takes a ticket only if it would be served immediately.
    #[inline]
    #[must_use]
    pub fn try_lock(&self) -> bool {
        let claimed = exclusive_update(&self.slock, |v| {
            (!Tickets::from_bits(v).is_locked()).then(|| v.wrapping_add(TICKET_INC))
        })
        .is_ok();

        if claimed {
            smp_mb();
        }
        claimed
    }

    /// # Safety
    /// The caller must hold the lock.
    #[inline]
    pub unsafe fn unlock(&self) {
        smp_mb();
        let _ = exclusive_update(&self.slock, |v| {
            let t = Tickets::from_bits(v);
            Some(t.with_owner(t.owner().wrapping_add(1)).into_bits())
        });
        E::signal();
    }
}

impl<E: WaitEvent> RawLock for RawTicket<E> {
    fn raw_lock(&self) {
        self.lock();
    }

    fn raw_try_lock(&self) -> bool {
        self.try_lock()
    }
}

impl<E: WaitEvent> RawUnlock for RawTicket<E> {
    unsafe fn raw_unlock(&self) {
        unsafe { self.unlock() }
    }
}
