use crate::context_id::ContextId;
use crate::cpumask::CpuMask;
use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};
#[cfg(feature = "smp")]
use kernel_sync::SpinLock;

/// Physical address of an address space's first-level translation table.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct PageTableBase(u64);

impl PageTableBase {
    #[inline]
    #[must_use]
    pub const fn new(phys: u64) -> Self {
        Self(phys)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// Per-address-space ASID bookkeeping (`mm->context`).
pub struct MmContext {
    id: AtomicU32,
    /// Serializes stale-generation checks against `id` and `cpus`.
    #[cfg(feature = "smp")]
    pub(crate) id_lock: SpinLock<()>,
    cpus: CpuMask,
}

impl MmContext {
    /// A fresh context: ID 0 (no ASID) and no cores.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: AtomicU32::new(0),
            #[cfg(feature = "smp")]
            id_lock: SpinLock::new(()),
            cpus: CpuMask::new(),
        }
    }

    /// Current `(generation, asid)`.
    ///
    /// Read without the lock: a stale value only ever makes the caller take
    /// the slow path.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ContextId {
        ContextId::from_bits(self.id.load(Ordering::Relaxed))
    }

    #[cfg(feature = "smp")]
    #[inline]
    pub(crate) fn set_id(&self, id: ContextId) {
        self.id.store(id.into_bits(), Ordering::Relaxed);
    }

    /// Cores that have run this address space in the current generation.
    #[inline]
    #[must_use]
    pub const fn cpus(&self) -> &CpuMask {
        &self.cpus
    }
}

impl Default for MmContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MmContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MmContext")
            .field("id", &self.id())
            .field("cpus", &self.cpus)
            .finish_non_exhaustive()
    }
}

/// A user address space as the context switch sees it.
#[derive(Debug)]
pub struct AddressSpace {
    pgd: PageTableBase,
    context: MmContext,
}

impl AddressSpace {
    /// Creates an address space with no ASID (`init_new_context`).
    #[must_use]
    pub fn new(pgd: PageTableBase) -> Self {
        Self {
            pgd,
            context: MmContext::new(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn pgd(&self) -> PageTableBase {
        self.pgd
    }

    #[inline]
    #[must_use]
    pub const fn context(&self) -> &MmContext {
        &self.context
    }
}
