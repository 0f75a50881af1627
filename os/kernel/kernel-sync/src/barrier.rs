//! # Memory barriers
//!
//! Ordering points with no data dependency.
//!
//! | Function                 | Orders                                   | Hardware effect        |
//! |--------------------------|------------------------------------------|------------------------|
//! | [`mb`]                   | all prior loads/stores before all later  | `dmb ish` / `mfence`   |
//! | [`rmb`]                  | prior loads before later loads           | `dmb ishld` (AArch64)  |
//! | [`wmb`]                  | prior stores before later stores         | `dmb ishst` (AArch64)  |
//! | [`barrier`]              | compiler reordering only                 | none                   |
//!
//! The `smp_*` forms are what lock and atomic code uses: they are real fences
//! in an `smp` build and collapse to [`barrier`] on a uniprocessor build, where
//! the only other observer is an interrupt handler on the same core.
//!
//! Every read-modify-write that must appear as a single point in the global
//! order (lock acquire/release, `*_return` atomics, `cmpxchg`, `xchg`) is
//! bracketed by [`smp_mb`] on both sides. Bare counter updates are not.

use core::sync::atomic::{Ordering, compiler_fence, fence};

/// Full barrier: all loads and stores before it are observed before all
/// loads and stores after it, by every core.
#[inline]
pub fn mb() {
    fence(Ordering::SeqCst);
}

/// Read barrier: earlier loads complete before later loads.
#[inline]
pub fn rmb() {
    fence(Ordering::Acquire);
}

/// Write barrier: earlier stores become visible before later stores.
#[inline]
pub fn wmb() {
    fence(Ordering::Release);
}

/// Compiler-only barrier. No instruction is emitted.
#[inline]
pub fn barrier() {
    compiler_fence(Ordering::SeqCst);
}

/// Alias of [`mb`].
#[inline]
pub fn full_barrier() {
    mb();
}

/// Alias of [`rmb`].
#[inline]
pub fn read_barrier() {
    rmb();
}

/// Alias of [`wmb`].
#[inline]
pub fn write_barrier() {
    wmb();
}

/// Alias of [`barrier`].
#[inline]
pub fn compiler_barrier() {
    barrier();
}

/// SMP full barrier.
#[inline]
pub fn smp_mb() {
    #[cfg(feature = "smp")]
    mb();
    #[cfg(not(feature = "smp"))]
    barrier();
}

/// SMP read barrier.
#[inline]
pub fn smp_rmb() {
    #[cfg(feature = "smp")]
    rmb();
    #[cfg(not(feature = "smp"))]
    barrier();
}

/// SMP write barrier.
#[inline]
pub fn smp_wmb() {
    #[cfg(feature = "smp")]
    wmb();
    #[cfg(not(feature = "smp"))]
    barrier();
}

/// Orders earlier accesses before a following non-returning atomic
/// (`add`, `sub`, `inc`, `dec`, `clear_mask`).
#[inline]
pub fn smp_mb_before_atomic() {
    smp_mb();
}

/// Orders a preceding non-returning atomic before later accesses.
#[inline]
pub fn smp_mb_after_atomic() {
    smp_mb();
}

/// Data synchronization barrier.
///
/// Stronger than [`mb`] on ARM: waits for outstanding memory accesses and
/// cache/TLB maintenance to complete. Needed before `sev` and after TLB
/// maintenance.
#[inline]
pub fn dsb() {
    #[cfg(any(target_arch = "arm", target_arch = "aarch64"))]
    // SAFETY: barrier instruction, no memory or register side effects.
    unsafe {
        core::arch::asm!("dsb ish", options(nostack, preserves_flags));
    }
    #[cfg(not(any(target_arch = "arm", target_arch = "aarch64")))]
    mb();
}

/// Instruction synchronization barrier.
///
/// Flushes the pipeline so that a context-ID or translation-table base write
/// takes effect for the following instructions.
#[inline]
pub fn isb() {
    #[cfg(any(target_arch = "arm", target_arch = "aarch64"))]
    // SAFETY: barrier instruction, no memory or register side effects.
    unsafe {
        core::arch::asm!("isb", options(nostack, preserves_flags));
    }
    #[cfg(not(any(target_arch = "arm", target_arch = "aarch64")))]
    barrier();
}
