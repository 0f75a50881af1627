//! # Wait/signal hints for spinning waiters
//!
//! ARM cores park a spinning waiter with `wfe` and wake all parked cores with
//! `sev` after the lock word changes. The locks in this crate are written
//! against [`WaitEvent`] so the same algorithms run with the low-power hint
//! on ARM and with a plain `spin_loop` hint everywhere else.
//!
//! `wait` may return spuriously; callers always re-check the lock word.

/// The park/unpark pair used by spinning waiters.
pub trait WaitEvent {
    /// Park the current core until an event (or any interrupt) arrives.
    fn wait();

    /// Wake every core parked in [`WaitEvent::wait`].
    fn signal();
}

/// Portable busy-wait: a `spin_loop` hint and no wake-up.
#[derive(Debug, Default, Copy, Clone)]
pub struct Spin;

impl WaitEvent for Spin {
    #[inline]
    fn wait() {
        core::hint::spin_loop();
    }

    #[inline]
    fn signal() {}
}

/// ARM `wfe` / `dsb; sev`.
///
/// Only sound where the event register is reliably set by every lock release,
/// i.e. when all users of the lock word use this hint.
#[cfg(any(target_arch = "arm", target_arch = "aarch64"))]
#[derive(Debug, Default, Copy, Clone)]
pub struct Wfe;

#[cfg(any(target_arch = "arm", target_arch = "aarch64"))]
impl WaitEvent for Wfe {
    #[inline]
    fn wait() {
        // SAFETY: `wfe` only suspends the core until the next event.
        unsafe { core::arch::asm!("wfe", options(nomem, nostack, preserves_flags)) }
    }

    #[inline]
    fn signal() {
        crate::barrier::dsb();
        // SAFETY: `sev` only sets the event register on all cores.
        unsafe { core::arch::asm!("sev", options(nomem, nostack, preserves_flags)) }
    }
}
