//! # Kernel synchronization primitives
//!
//! Layered bottom-up:
//!
//! 1. [`atomic`]: counters built on one load-exclusive / store-exclusive loop.
//! 2. [`barrier`]: full, read, write and compiler barriers.
//! 3. [`RawTicket`] / [`RawRwSpin`]: FIFO ticket spinlock and reader-writer
//!    spinlock, parked on a [`WaitEvent`] hint while contended.
//! 4. [`Mutex`] / [`RwLock`]: data-owning RAII wrappers over any raw lock.
//!
//! ## UP vs. SMP
//!
//! The `smp` feature (on by default) picks the lock strategy at build time.
//! [`ArchSpin`] and [`ArchRwSpin`] are the ticket and reader-writer spinlocks
//! on SMP, and [`RawUp`] (interrupt masking) on a uniprocessor build. Code
//! written against [`SpinLock`] / [`SpinRwLock`] does not change. Contended
//! SMP waiters park with `wfe` on ARM and spin everywhere else
//! ([`ArchEvent`]).

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod atomic;
pub mod barrier;
pub mod event;
pub mod irq;
mod mutex;
mod raw_rwlock;
mod raw_ticket;
mod raw_up;
mod rwlock;

pub use atomic::{AtomicCounter, AtomicWord};
#[cfg(target_has_atomic = "64")]
pub use atomic::AtomicCounter64;
pub use event::{Spin, WaitEvent};
#[cfg(any(target_arch = "arm", target_arch = "aarch64"))]
pub use event::Wfe;
#[cfg(any(target_arch = "arm", target_arch = "aarch64", target_arch = "x86_64"))]
pub use irq::ArchIrq;
pub use irq::{IrqControl, IrqGuard, IrqMutex, IrqState};
pub use mutex::{Mutex, MutexGuard};
pub use raw_rwlock::{RawRwSpin, WRITER};
pub use raw_ticket::{RawTicket, Tickets};
pub use raw_up::RawUp;
pub use rwlock::{RwLock, RwLockReadGuard, RwLockWriteGuard};

pub type TicketMutex<T> = Mutex<T, RawTicket>;

/// How contended SMP locks wait on this target.
#[cfg(any(target_arch = "arm", target_arch = "aarch64"))]
pub type ArchEvent = Wfe;
#[cfg(not(any(target_arch = "arm", target_arch = "aarch64")))]
pub type ArchEvent = Spin;

/// The spinlock strategy for this build.
#[cfg(feature = "smp")]
pub type ArchSpin = RawTicket<ArchEvent>;
#[cfg(not(feature = "smp"))]
pub type ArchSpin = RawUp<ArchIrq>;

/// The reader-writer lock strategy for this build.
#[cfg(feature = "smp")]
pub type ArchRwSpin = RawRwSpin<ArchEvent>;
#[cfg(not(feature = "smp"))]
pub type ArchRwSpin = RawUp<ArchIrq>;

pub type SpinLock<T> = Mutex<T, ArchSpin>;
pub type SpinLockGuard<'a, T> = MutexGuard<'a, T, ArchSpin>;
pub type SpinRwLock<T> = RwLock<T, ArchRwSpin>;

pub trait RawLock {
    fn raw_lock(&self);
    fn raw_try_lock(&self) -> bool;
}

pub trait RawUnlock {
    /// # Safety
    /// The caller must hold the lock.
    unsafe fn raw_unlock(&self);
}

/// Shared/exclusive raw lock.
pub trait RawRwLock {
    fn raw_read_lock(&self);
    fn raw_try_read_lock(&self) -> bool;

    /// # Safety
    /// The caller must hold a read lock.
    unsafe fn raw_read_unlock(&self);

    fn raw_write_lock(&self);
    fn raw_try_write_lock(&self) -> bool;

    /// # Safety
    /// The caller must hold the write lock.
    unsafe fn raw_write_unlock(&self);
}
