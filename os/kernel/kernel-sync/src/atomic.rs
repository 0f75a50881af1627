//! # Atomic primitive layer
//!
//! ARM does not have fetch-and-op instructions before v8.1; every
//! read-modify-write is a load-exclusive / store-exclusive (`ldrex`/`strex`)
//! sequence that is retried when the store loses its exclusive reservation.
//! [`AtomicWord`] captures exactly that capability, and [`exclusive_update`]
//! is the one retry loop the rest of the crate is written against.
//!
//! On the host (and on any ISA with a compare-and-swap) the capability is
//! provided by `compare_exchange_weak`, whose spurious failure is the same
//! event as a failed `strex`: somebody touched the location since the load.
//!
//! ## Barrier contract
//!
//! | Operation                                   | Barriers          |
//! |---------------------------------------------|-------------------|
//! | `read`, `set`, `add`, `sub`, `inc`, `dec`   | none              |
//! | `*_return`, `*_and_test`, `add_negative`    | `smp_mb` both sides |
//! | `cmpxchg`, `xchg`, `add_unless`             | `smp_mb` both sides |
//!
//! Contention never surfaces as an error: the loops retry without backoff.

use crate::barrier::smp_mb;
use core::fmt;
#[cfg(target_has_atomic = "64")]
use core::sync::atomic::{AtomicI64, AtomicU64};
use core::sync::atomic::{AtomicI32, AtomicU32, AtomicUsize, Ordering};

/// A memory word with an exclusive monitor.
///
/// Implementations must make [`store_exclusive`](AtomicWord::store_exclusive)
/// fail whenever the word may have been written since the paired
/// [`load_exclusive`](AtomicWord::load_exclusive). Spurious failures are
/// allowed; callers always retry.
pub trait AtomicWord {
    type Value: Copy + Eq;

    /// Plain single-copy atomic load (`ldr`).
    fn load(&self) -> Self::Value;

    /// Plain single-copy atomic store (`str`).
    fn store(&self, value: Self::Value);

    /// Load and open an exclusive reservation (`ldrex`).
    fn load_exclusive(&self) -> Self::Value;

    /// Store `new` iff the reservation opened when `observed` was loaded is
    /// still intact (`strex`). Returns `false` if the store did not happen.
    fn store_exclusive(&self, observed: Self::Value, new: Self::Value) -> bool;
}

macro_rules! impl_atomic_word {
    ($atomic:ty, $value:ty) => {
        impl AtomicWord for $atomic {
            type Value = $value;

            #[inline]
            fn load(&self) -> $value {
                <$atomic>::load(self, Ordering::Relaxed)
            }

            #[inline]
            fn store(&self, value: $value) {
                <$atomic>::store(self, value, Ordering::Relaxed);
            }

            #[inline]
            fn load_exclusive(&self) -> $value {
                <$atomic>::load(self, Ordering::Relaxed)
            }

            #[inline]
            fn store_exclusive(&self, observed: $value, new: $value) -> bool {
                self.compare_exchange_weak(observed, new, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
            }
        }
    };
}

impl_atomic_word!(AtomicU32, u32);
impl_atomic_word!(AtomicI32, i32);
impl_atomic_word!(AtomicUsize, usize);
#[cfg(target_has_atomic = "64")]
impl_atomic_word!(AtomicU64, u64);
#[cfg(target_has_atomic = "64")]
impl_atomic_word!(AtomicI64, i64);

/// Runs one load-exclusive / compute / store-exclusive sequence to completion.
///
/// `f` receives the loaded value and returns the value to store, or `None` to
/// leave the word untouched. The sequence is restarted only when the
/// conditional store fails; a `None` from `f` ends it immediately.
///
/// Returns `Ok(old)` when `f(old)` was stored and `Err(old)` when `f` declined.
///
/// # Errors
/// `Err` carries the observed value when `f` aborted the update; it is a
/// control-flow result, not a fault.
#[inline]
pub fn exclusive_update<W, F>(word: &W, mut f: F) -> Result<W::Value, W::Value>
where
    W: AtomicWord + ?Sized,
    F: FnMut(W::Value) -> Option<W::Value>,
{
    loop {
        let old = word.load_exclusive();
        let Some(new) = f(old) else {
            return Err(old);
        };
        if word.store_exclusive(old, new) {
            return Ok(old);
        }
    }
}

macro_rules! atomic_counter {
    ($(#[$meta:meta])* $name:ident, $atomic:ty, $int:ty) => {
        $(#[$meta])*
        #[repr(transparent)]
        pub struct $name {
            counter: $atomic,
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new(0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.read()).finish()
            }
        }

        impl $name {
            #[must_use]
            pub const fn new(value: $int) -> Self {
                Self {
                    counter: <$atomic>::new(value),
                }
            }

            /// Plain read. May be stale; never torn.
            #[inline]
            #[must_use]
            pub fn read(&self) -> $int {
                AtomicWord::load(&self.counter)
            }

            /// Plain write.
            #[inline]
            pub fn set(&self, value: $int) {
                AtomicWord::store(&self.counter, value);
            }

            #[inline]
            pub fn add(&self, delta: $int) {
                let _ = exclusive_update(&self.counter, |v| Some(v.wrapping_add(delta)));
            }

            #[inline]
            pub fn sub(&self, delta: $int) {
                let _ = exclusive_update(&self.counter, |v| Some(v.wrapping_sub(delta)));
            }

            #[inline]
            pub fn inc(&self) {
                self.add(1);
            }

            #[inline]
            pub fn dec(&self) {
                self.sub(1);
            }

            /// Adds `delta` and returns the new value. Fully ordered.
            #[inline]
            pub fn add_return(&self, delta: $int) -> $int {
                smp_mb();
                let (Ok(old) | Err(old)) =
                    exclusive_update(&self.counter, |v| Some(v.wrapping_add(delta)));
                smp_mb();
                old.wrapping_add(delta)
            }

            /// Subtracts `delta` and returns the new value. Fully ordered.
            #[inline]
            pub fn sub_return(&self, delta: $int) -> $int {
                smp_mb();
                let (Ok(old) | Err(old)) =
                    exclusive_update(&self.counter, |v| Some(v.wrapping_sub(delta)));
                smp_mb();
                old.wrapping_sub(delta)
            }

            #[inline]
            pub fn inc_return(&self) -> $int {
                self.add_return(1)
            }

            #[inline]
            pub fn dec_return(&self) -> $int {
                self.sub_return(1)
            }

            #[inline]
            pub fn inc_and_test(&self) -> bool {
                self.add_return(1) == 0
            }

            #[inline]
            pub fn dec_and_test(&self) -> bool {
                self.sub_return(1) == 0
            }

            #[inline]
            pub fn sub_and_test(&self, delta: $int) -> bool {
                self.sub_return(delta) == 0
            }

            #[inline]
            pub fn add_negative(&self, delta: $int) -> bool {
                self.add_return(delta) < 0
            }

            /// Stores `new` if the counter holds `expected`.
            ///
            /// Returns the value observed; the exchange happened iff it equals
            /// `expected`. A mismatch returns immediately without writing.
            #[inline]
            pub fn cmpxchg(&self, expected: $int, new: $int) -> $int {
                smp_mb();
                let (Ok(old) | Err(old)) =
                    exclusive_update(&self.counter, |v| (v == expected).then_some(new));
                smp_mb();
                old
            }

            /// Unconditionally stores `new`, returning the previous value.
            #[inline]
            pub fn xchg(&self, new: $int) -> $int {
                smp_mb();
                let (Ok(old) | Err(old)) = exclusive_update(&self.counter, |_| Some(new));
                smp_mb();
                old
            }

            /// Adds `delta` unless the counter holds `unless`.
            ///
            /// Returns `true` if the addition happened.
            #[inline]
            pub fn add_unless(&self, delta: $int, unless: $int) -> bool {
                let mut c = self.read();
                while c != unless {
                    let old = self.cmpxchg(c, c.wrapping_add(delta));
                    if old == c {
                        return true;
                    }
                    c = old;
                }
                false
            }

            /// Increments unless zero. Returns `true` if it incremented.
            #[inline]
            pub fn inc_not_zero(&self) -> bool {
                self.add_unless(1, 0)
            }

            #[inline]
            pub fn get_mut(&mut self) -> &mut $int {
                self.counter.get_mut()
            }

            #[inline]
            #[must_use]
            pub fn into_inner(self) -> $int {
                self.counter.into_inner()
            }
        }
    };
}

atomic_counter!(
    /// A 32-bit signed counter (`atomic_t`).
    ///
    /// ```
    /// use kernel_sync::atomic::AtomicCounter;
    ///
    /// let c = AtomicCounter::new(5);
    /// assert_eq!(c.add_return(2), 7);
    /// assert_eq!(c.cmpxchg(1, 100), 7); // mismatch: untouched
    /// assert_eq!(c.cmpxchg(7, 100), 7);
    /// assert_eq!(c.read(), 100);
    /// ```
    AtomicCounter,
    AtomicI32,
    i32
);

#[cfg(target_has_atomic = "64")]
atomic_counter!(
    /// A 64-bit signed counter (`atomic64_t`).
    ///
    /// On 32-bit ARM this is the `ldrexd`/`strexd` pair; the single-copy
    /// atomicity of the doubleword is what keeps `read` from tearing.
    AtomicCounter64,
    AtomicI64,
    i64
);

impl AtomicCounter {
    /// Atomically clears the bits in `mask`. Not ordered.
    #[inline]
    pub fn clear_mask(&self, mask: u32) {
        let _ = exclusive_update(&self.counter, |v| {
            Some(v & !i32::from_ne_bytes(mask.to_ne_bytes()))
        });
    }
}

#[cfg(target_has_atomic = "64")]
impl AtomicCounter64 {
    /// Decrements if the result stays non-negative.
    ///
    /// Returns the decremented value whether or not it was stored, so a
    /// negative return means the counter was left alone.
    #[inline]
    pub fn dec_if_positive(&self) -> i64 {
        smp_mb();
        let (Ok(old) | Err(old)) = exclusive_update(&self.counter, |v| {
            let next = v.wrapping_sub(1);
            (next >= 0).then_some(next)
        });
        smp_mb();
        old.wrapping_sub(1)
    }
}
