use core::fmt;
use core::sync::atomic::AtomicU32;
use kernel_sync::atomic::{AtomicWord, exclusive_update};

/// Width of [`CpuMask`].
pub const MAX_CPUS: u32 = 32;

/// Logical index of a core, `0..nr_cpus`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct CpuId(u32);

impl CpuId {
    /// # Panics
    /// If `id` does not fit a [`CpuMask`].
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        assert!(id < MAX_CPUS, "CPU index does not fit the CPU mask");
        Self(id)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    const fn bit(self) -> u32 {
        1 << self.0
    }
}

impl fmt::Display for CpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cpu{}", self.0)
    }
}

/// Set of cores, one bit per [`CpuId`].
///
/// Individual bit updates are atomic but unordered; callers that need the
/// mask to agree with other state update it under that state's lock.
#[derive(Default)]
pub struct CpuMask {
    bits: AtomicU32,
}

impl CpuMask {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bits: AtomicU32::new(0),
        }
    }

    #[inline]
    #[must_use]
    pub fn bits(&self) -> u32 {
        AtomicWord::load(&self.bits)
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bits() == 0
    }

    #[inline]
    #[must_use]
    pub fn test(&self, cpu: CpuId) -> bool {
        self.bits() & cpu.bit() != 0
    }

    #[inline]
    pub fn set(&self, cpu: CpuId) {
        let _ = self.test_and_set(cpu);
    }

    /// Sets the bit for `cpu` and returns whether it was already set.
    #[inline]
    #[must_use]
    pub fn test_and_set(&self, cpu: CpuId) -> bool {
        let bit = cpu.bit();
        match exclusive_update(&self.bits, |v| (v & bit == 0).then_some(v | bit)) {
            Ok(_) => false,
            Err(_) => true,
        }
    }

    #[inline]
    pub fn clear(&self, cpu: CpuId) {
        let bit = cpu.bit();
        let _ = exclusive_update(&self.bits, |v| (v & bit != 0).then_some(v & !bit));
    }

    #[inline]
    pub fn clear_all(&self) {
        AtomicWord::store(&self.bits, 0);
    }

    /// The cores currently in the set, lowest first.
    #[must_use]
    pub fn iter(&self) -> impl Iterator<Item = CpuId> {
        let bits = self.bits();
        (0..MAX_CPUS)
            .filter(move |i| bits & (1 << i) != 0)
            .map(CpuId)
    }
}

impl fmt::Debug for CpuMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CpuMask({:#010x})", self.bits())
    }
}
