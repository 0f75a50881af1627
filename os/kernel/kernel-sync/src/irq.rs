use crate::{Mutex, MutexGuard, RawLock, RawUnlock};
use core::ops::{Deref, DerefMut};

/// Saved local interrupt state, as returned by [`IrqControl::irq_save`].
#[must_use]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IrqState {
    were_enabled: bool,
}

impl IrqState {
    #[inline]
    pub const fn new(were_enabled: bool) -> Self {
        Self { were_enabled }
    }

    /// Whether interrupts were enabled when the state was saved.
    #[inline]
    #[must_use]
    pub const fn were_enabled(self) -> bool {
        self.were_enabled
    }
}

/// Local interrupt masking for one core.
///
/// [`ArchIrq`] drives the real mask bit. Anything else implementing this
/// (a hypervisor shim, a simulated core) must keep the same contract:
/// `irq_save` disables and reports the previous state, `irq_restore`
/// re-enables only if that state says interrupts were on.
pub trait IrqControl {
    fn irqs_disabled(&self) -> bool;

    /// Disables interrupts and returns the previous state.
    fn irq_save(&self) -> IrqState;

    /// Restores the state returned by a matching [`IrqControl::irq_save`].
    fn irq_restore(&self, state: IrqState);
}

/// RAII guard that disables interrupts on creation and restores them on drop.
///
/// On drop, interrupts are re-enabled **only** if they were enabled when the
/// guard was created, so guards nest.
///
/// # Examples
///
/// ```
/// use kernel_sync::irq::{IrqControl, IrqGuard, IrqState};
/// use std::cell::Cell;
///
/// struct FakeCpu(Cell<bool>);
///
/// impl IrqControl for FakeCpu {
///     fn irqs_disabled(&self) -> bool { !self.0.get() }
///     fn irq_save(&self) -> IrqState { IrqState::new(self.0.replace(false)) }
///     fn irq_restore(&self, s: IrqState) { if s.were_enabled() { self.0.set(true) } }
/// }
///
/// let cpu = FakeCpu(Cell::new(true));
/// {
///     let _g = IrqGuard::new(&cpu);
///     assert!(cpu.irqs_disabled());
/// }
/// assert!(!cpu.irqs_disabled());
/// ```
pub struct IrqGuard<'i, I: IrqControl + ?Sized> {
    irq: &'i I,
    state: IrqState,
}

impl<'i, I: IrqControl + ?Sized> IrqGuard<'i, I> {
    #[inline]
    #[must_use]
    pub fn new(irq: &'i I) -> Self {
        let state = irq.irq_save();
        Self { irq, state }
    }

    #[inline]
    pub const fn state(&self) -> IrqState {
        self.state
    }
}

impl<I: IrqControl + ?Sized> Drop for IrqGuard<'_, I> {
    fn drop(&mut self) {
        self.irq.irq_restore(self.state);
    }
}

/// A mutex guard that also keeps local interrupts disabled while held.
///
/// Created by [`Mutex::lock_irqsave`]: interrupts are masked first, then the
/// lock is taken. On drop the lock is released first, then interrupts are
/// restored (field order is drop order).
///
/// This keeps an interrupt handler on the same core from spinning on a lock
/// its own core already holds.
pub struct IrqMutex<'a, T, R: RawLock + RawUnlock, I: IrqControl + ?Sized> {
    guard: MutexGuard<'a, T, R>,
    _irq: IrqGuard<'a, I>,
}

impl<T, R: RawLock + RawUnlock> Mutex<T, R> {
    /// Acquires the mutex with local interrupts disabled for the guard's lifetime.
    #[inline]
    pub fn lock_irqsave<'a, I: IrqControl + ?Sized>(&'a self, irq: &'a I) -> IrqMutex<'a, T, R, I> {
        let ig = IrqGuard::new(irq);
        let guard = self.lock();
        IrqMutex { guard, _irq: ig }
    }
}

impl<T, R: RawLock + RawUnlock, I: IrqControl + ?Sized> Deref for IrqMutex<'_, T, R, I> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T, R: RawLock + RawUnlock, I: IrqControl + ?Sized> DerefMut for IrqMutex<'_, T, R, I> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

/// The executing core's interrupt mask.
///
/// # Safety & Privilege
///
/// Must only be used where masking interrupts is permitted (kernel mode).
/// Calling it from user space faults.
#[cfg(any(target_arch = "arm", target_arch = "aarch64", target_arch = "x86_64"))]
#[derive(Debug, Default, Copy, Clone)]
pub struct ArchIrq;

#[cfg(target_arch = "arm")]
impl IrqControl for ArchIrq {
    #[inline]
    fn irqs_disabled(&self) -> bool {
        let cpsr: u32;
        // SAFETY: reading CPSR has no side effects.
        unsafe { core::arch::asm!("mrs {}, cpsr", out(reg) cpsr, options(nomem, nostack, preserves_flags)) }
        cpsr & (1 << 7) != 0
    }

    #[inline]
    fn irq_save(&self) -> IrqState {
        let enabled = !self.irqs_disabled();
        // SAFETY: privileged mode required; see type docs.
        unsafe { core::arch::asm!("cpsid i", options(nomem, nostack, preserves_flags)) }
        IrqState::new(enabled)
    }

    #[inline]
    fn irq_restore(&self, state: IrqState) {
        if state.were_enabled() {
            // SAFETY: privileged mode required; see type docs.
            unsafe { core::arch::asm!("cpsie i", options(nomem, nostack, preserves_flags)) }
        }
    }
}

#[cfg(target_arch = "aarch64")]
impl IrqControl for ArchIrq {
    #[inline]
    fn irqs_disabled(&self) -> bool {
        let daif: u64;
        // SAFETY: reading DAIF has no side effects.
        unsafe { core::arch::asm!("mrs {}, daif", out(reg) daif, options(nomem, nostack, preserves_flags)) }
        daif & (1 << 7) != 0
    }

    #[inline]
    fn irq_save(&self) -> IrqState {
        let enabled = !self.irqs_disabled();
        // SAFETY: EL1 required; see type docs.
        unsafe { core::arch::asm!("msr daifset, #2", options(nomem, nostack, preserves_flags)) }
        IrqState::new(enabled)
    }

    #[inline]
    fn irq_restore(&self, state: IrqState) {
        if state.were_enabled() {
            // SAFETY: EL1 required; see type docs.
            unsafe { core::arch::asm!("msr daifclr, #2", options(nomem, nostack, preserves_flags)) }
        }
    }
}

#[cfg(target_arch = "x86_64")]
impl IrqControl for ArchIrq {
    #[inline]
    fn irqs_disabled(&self) -> bool {
        rflags() & (1 << 9) == 0
    }

    #[inline]
    fn irq_save(&self) -> IrqState {
        let enabled = !self.irqs_disabled();
        if enabled {
            // SAFETY: CPL0 required; see type docs.
            unsafe { core::arch::asm!("cli", options(nomem, nostack, preserves_flags)) }
        }
        IrqState::new(enabled)
    }

    #[inline]
    fn irq_restore(&self, state: IrqState) {
        if state.were_enabled() {
            // SAFETY: CPL0 required; see type docs.
            unsafe { core::arch::asm!("sti", options(nomem, nostack, preserves_flags)) }
        }
    }
}

/// Returns the current `RFLAGS` value (via `pushfq/pop`).
#[cfg(target_arch = "x86_64")]
#[inline]
fn rflags() -> u64 {
    let r: u64;
    // SAFETY: reads the flags register through the stack only.
    unsafe { core::arch::asm!("pushfq; pop {}", out(reg) r, options(nomem, preserves_flags)) }
    r
}
