use crate::RawRwLock;
use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};

/// Data behind a reader-writer lock `R`.
pub struct RwLock<T, R> {
    raw: R,
    cell: UnsafeCell<T>,
    _no_send_sync: PhantomData<*mut ()>,
}

unsafe impl<T: Send + Sync, R: Sync> Sync for RwLock<T, R> {}
unsafe impl<T: Send, R: Send> Send for RwLock<T, R> {}

impl<T, R> RwLock<T, R> {
    #[must_use]
    pub const fn from_raw(raw: R, value: T) -> Self {
        Self {
            raw,
            cell: UnsafeCell::new(value),
            _no_send_sync: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub const fn get_mut(&mut self) -> &mut T {
        self.cell.get_mut()
    }

    #[inline]
    #[must_use]
    pub fn into_inner(self) -> T {
        self.cell.into_inner()
    }

    #[inline]
    #[must_use]
    pub const fn raw(&self) -> &R {
        &self.raw
    }
}

impl<T, R: Default> RwLock<T, R> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::from_raw(R::default(), value)
    }
}

impl<T, R: RawRwLock> RwLock<T, R> {
    #[inline]
    pub fn read(&self) -> RwLockReadGuard<'_, T, R> {
        self.raw.raw_read_lock();
        RwLockReadGuard { l: self }
    }

    #[inline]
    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, T, R>> {
        self.raw
            .raw_try_read_lock()
            .then(|| RwLockReadGuard { l: self })
    }

    #[inline]
    pub fn write(&self) -> RwLockWriteGuard<'_, T, R> {
        self.raw.raw_write_lock();
        RwLockWriteGuard { l: self }
    }

    #[inline]
    pub fn try_write(&self) -> Option<RwLockWriteGuard<'_, T, R>> {
        self.raw
            .raw_try_write_lock()
            .then(|| RwLockWriteGuard { l: self })
    }
}

#[must_use = "if unused the read lock is released immediately"]
pub struct RwLockReadGuard<'a, T, R: RawRwLock> {
    l: &'a RwLock<T, R>,
}

impl<T, R: RawRwLock> Deref for RwLockReadGuard<'_, T, R> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.l.cell.get() }
    }
}

impl<T, R: RawRwLock> Drop for RwLockReadGuard<'_, T, R> {
    fn drop(&mut self) {
        unsafe { self.l.raw.raw_read_unlock() }
    }
}

#[must_use = "if unused the write lock is released immediately"]
pub struct RwLockWriteGuard<'a, T, R: RawRwLock> {
    l: &'a RwLock<T, R>,
}

impl<T, R: RawRwLock> Deref for RwLockWriteGuard<'_, T, R> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.l.cell.get() }
    }
}

impl<T, R: RawRwLock> DerefMut for RwLockWriteGuard<'_, T, R> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.l.cell.get() }
    }
}

impl<T, R: RawRwLock> Drop for RwLockWriteGuard<'_, T, R> {
    fn drop(&mut self) {
        unsafe { self.l.raw.raw_write_unlock() }
    }
}
