use crate::irq::{IrqControl, IrqState};
use crate::{RawLock, RawRwLock, RawUnlock};
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Uniprocessor lock: masks local interrupts instead of spinning.
///
/// With a single core the only concurrent party is an interrupt handler, so
/// holding the lock means holding interrupts off. Implements both
/// [`RawLock`] and [`RawRwLock`] so it can stand in for the ticket lock and
/// the reader-writer lock in a non-`smp` build.
///
/// Read locks nest; the interrupt state from the outermost acquisition is the
/// one restored. Re-taking an exclusive lock is a caller bug and trips a
/// debug assertion.
pub struct RawUp<I: IrqControl> {
    irq: I,
    depth: AtomicU32,
    were_enabled: AtomicBool,
}

impl<I: IrqControl + Default> Default for RawUp<I> {
    fn default() -> Self {
        Self::new(I::default())
    }
}

impl<I: IrqControl> RawUp<I> {
    #[must_use]
    pub const fn new(irq: I) -> Self {
        Self {
            irq,
            depth: AtomicU32::new(0),
            were_enabled: AtomicBool::new(false),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.depth.load(Ordering::Relaxed) != 0
    }

    #[inline]
    fn enter(&self) {
        let state = self.irq.irq_save();
        // Interrupts are off from here on; relaxed accesses suffice.
        if self.depth.load(Ordering::Relaxed) == 0 {
            self.were_enabled
                .store(state.were_enabled(), Ordering::Relaxed);
        }
        self.depth.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn leave(&self) {
        let prev = self.depth.fetch_sub(1, Ordering::Relaxed);
        debug_assert_ne!(prev, 0, "RawUp released while not held");
        if prev == 1 {
            let were_enabled = self.were_enabled.load(Ordering::Relaxed);
            self.irq.irq_restore(IrqState::new(were_enabled));
        }
    }

    #[inline]
    pub fn lock(&self) {
        debug_assert!(!self.is_locked(), "RawUp: recursive lock");
        self.enter();
    }

    /// On a single core the lock can only be seen held by the core itself,
    /// so failure is reported rather than deadlocking.
    #[inline]
    #[must_use]
    pub fn try_lock(&self) -> bool {
        if self.is_locked() {
            return false;
        }
        self.enter();
        true
    }

    /// # Safety
    /// The caller must hold the lock.
    #[inline]
    pub unsafe fn unlock(&self) {
        self.leave();
    }
}

impl<I: IrqControl> RawLock for RawUp<I> {
    fn raw_lock(&self) {
        self.lock();
    }

    fn raw_try_lock(&self) -> bool {
        self.try_lock()
    }
}

impl<I: IrqControl> RawUnlock for RawUp<I> {
    unsafe fn raw_unlock(&self) {
        unsafe { self.unlock() }
    }
}

impl<I: IrqControl> RawRwLock for RawUp<I> {
    fn raw_read_lock(&self) {
        self.enter();
    }

    fn raw_try_read_lock(&self) -> bool {
        self.enter();
        true
    }

    unsafe fn raw_read_unlock(&self) {
        self.leave();
    }

    fn raw_write_lock(&self) {
        self.lock();
    }

    fn raw_try_write_lock(&self) -> bool {
        self.try_lock()
    }

    unsafe fn raw_write_unlock(&self) {
        self.leave();
    }
}
