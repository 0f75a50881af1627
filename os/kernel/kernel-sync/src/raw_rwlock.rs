use crate::RawRwLock;
use crate::atomic::{AtomicWord, exclusive_update};
use crate::barrier::smp_mb;
use crate::event::{Spin, WaitEvent};
use core::fmt;
use core::marker::PhantomData;
use core::sync::atomic::AtomicU32;

/// Bit 31: a writer owns the lock.
pub const WRITER: u32 = 0x8000_0000;

/// Spinning reader-writer lock in a single word.
///
/// | Word            | State              |
/// |-----------------|--------------------|
/// | `0`             | free               |
/// | `0x8000_0000`   | write-locked       |
/// | `n` (bit 31 clear) | `n` readers     |
///
/// Writers only get in when the word is exactly zero, so a steady stream of
/// readers can keep a writer waiting. Readers never get in past a writer.
pub struct RawRwSpin<E = Spin> {
    lock: AtomicU32,
    _event: PhantomData<fn() -> E>,
}

impl<E> Default for RawRwSpin<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for RawRwSpin<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = AtomicWord::load(&self.lock);
        if v & WRITER != 0 {
            f.write_str("RawRwSpin(writer)")
        } else {
            write!(f, "RawRwSpin(readers: {v})")
        }
    }
}

impl<E> RawRwSpin<E> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            lock: AtomicU32::new(0),
            _event: PhantomData,
        }
    }

    /// Unsynchronized snapshot of the lock word.
    #[inline]
    #[must_use]
    pub fn value(&self) -> u32 {
        AtomicWord::load(&self.lock)
    }

    #[inline]
    #[must_use]
    pub fn is_write_locked(&self) -> bool {
        self.value() & WRITER != 0
    }

    /// Number of readers; `0` while a writer holds the lock.
    #[inline]
    #[must_use]
    pub fn readers(&self) -> u32 {
        let v = self.value();
        if v & WRITER == 0 { v } else { 0 }
    }

    /// A reader would get in right now.
    #[inline]
    #[must_use]
    pub fn can_read(&self) -> bool {
        self.value() < WRITER
    }

    /// A writer would get in right now.
    #[inline]
    #[must_use]
    pub fn can_write(&self) -> bool {
        self.value() == 0
    }
}

/// Reader increment: refused if the result has bit 31 set.
#[inline]
fn reader_inc(v: u32) -> Option<u32> {
    let next = v.wrapping_add(1);
    (next & WRITER == 0).then_some(next)
}

impl<E: WaitEvent> RawRwSpin<E> {
    #[inline]
    pub fn write_lock(&self) {
        while exclusive_update(&self.lock, |v| (v == 0).then_some(WRITER)).is_err() {
            E::wait();
        }
        smp_mb();
    }

    #[inline]
    #[must_use]
    pub fn try_write_lock(&self) -> bool {
        let ok = exclusive_update(&self.lock, |v| (v == 0).then_some(WRITER)).is_ok();
        if ok {
            smp_mb();
        }
        ok
    }

    /// # Safety
    /// The caller must hold the write lock.
    #[inline]
    pub unsafe fn write_unlock(&self) {
        smp_mb();
        AtomicWord::store(&self.lock, 0);
        E::signal();
    }

    #[inline]
    pub fn read_lock(&self) {
        while exclusive_update(&self.lock, reader_inc).is_err() {
            E::wait();
        }
        smp_mb();
    }

    #[inline]
    #[must_use]
    pub fn try_read_lock(&self) -> bool {
        let ok = exclusive_update(&self.lock, reader_inc).is_ok();
        if ok {
            smp_mb();
        }
        ok
    }

    /// # Safety
    /// The caller must hold a read lock.
    #[inline]
    pub unsafe fn read_unlock(&self) {
        smp_mb();
        let (Ok(old) | Err(old)) = exclusive_update(&self.lock, |v| Some(v.wrapping_sub(1)));
        debug_assert!(old != 0 && old & WRITER == 0, "read_unlock without a reader");
        if old == 1 {
            E::signal();
        }
    }
}

impl<E: WaitEvent> RawRwLock for RawRwSpin<E> {
    fn raw_read_lock(&self) {
        self.read_lock();
    }

    fn raw_try_read_lock(&self) -> bool {
        self.try_read_lock()
    }

    unsafe fn raw_read_unlock(&self) {
        unsafe { self.read_unlock() }
    }

    fn raw_write_lock(&self) {
        self.write_lock();
    }

    fn raw_try_write_lock(&self) -> bool {
        self.try_write_lock()
    }

    unsafe fn raw_write_unlock(&self) {
        unsafe { self.write_unlock() }
    }
}
