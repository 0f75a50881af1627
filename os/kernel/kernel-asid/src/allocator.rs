//! Global ASID allocation with generation rollover.
//!
//! `last_asid` is a [`ContextId`]-encoded counter. Handing out an ASID bumps
//! it by one; when the low byte wraps to zero the generation advances and
//! every core has to drop what its TLB knows about the previous generation:
//!
//! 1. The rolling-over core flushes its own TLB and takes slot `cpu + 1`.
//! 2. Every other core is cross-called into [`AsidAllocator::reset_context`],
//!    which flushes its TLB and moves the address space it is running into
//!    slot `cpu + 1` of the new generation.
//! 3. `last_asid` skips past the `nr_cpus` reserved slots.
//!
//! All of this happens under the global lock. Lock order is the global lock,
//! then an address space's `id_lock`.

use crate::config::{AsidConfig, AsidConfigError};
use crate::context_id::{ASID_BITS, ASID_FIRST_VERSION, ContextId, GENERATION_MASK};
use crate::mm::AddressSpace;
use crate::platform::{Cpu, SmpCall};
use core::sync::atomic::{AtomicU32, Ordering};
use kernel_sync::barrier::{dsb, isb, smp_rmb, smp_wmb};
use kernel_sync::{AtomicCounter64, SpinLock};
use log::{debug, info};

/// The per-kernel ASID allocator (`cpu_last_asid` and `cpu_asid_lock`).
pub struct AsidAllocator {
    last_asid: AtomicU32,
    lock: SpinLock<()>,
    config: AsidConfig,
    allocations: AtomicCounter64,
    rollovers: AtomicCounter64,
}

/// Snapshot of the allocator counters.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct AsidStats {
    /// IDs installed by [`AsidAllocator::new_context`], rollover slots included.
    pub allocations: u64,
    /// Generation advances.
    pub rollovers: u64,
}

impl AsidAllocator {
    /// # Errors
    /// Returns the [`AsidConfigError`] from [`AsidConfig::validate`].
    pub fn new(config: AsidConfig) -> Result<Self, AsidConfigError> {
        config.validate()?;
        info!(
            "ASID allocator: {} CPUs, {ASID_BITS}-bit ASIDs, VIVT ASID-tagged icache: {}",
            config.nr_cpus, config.icache_vivt_asid_tagged
        );
        Ok(Self {
            last_asid: AtomicU32::new(ASID_FIRST_VERSION),
            lock: SpinLock::new(()),
            config,
            allocations: AtomicCounter64::new(0),
            rollovers: AtomicCounter64::new(0),
        })
    }

    #[inline]
    #[must_use]
    pub const fn config(&self) -> &AsidConfig {
        &self.config
    }

    /// The most recently handed out ID; its generation is the current one.
    #[inline]
    #[must_use]
    pub fn last_asid(&self) -> ContextId {
        ContextId::from_bits(self.last_asid.load(Ordering::Relaxed))
    }

    #[inline]
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.last_asid().generation()
    }

    #[must_use]
    pub fn stats(&self) -> AsidStats {
        AsidStats {
            allocations: u64::try_from(self.allocations.read()).unwrap_or_default(),
            rollovers: u64::try_from(self.rollovers.read()).unwrap_or_default(),
        }
    }

    /// Gives `mm` an ID of the current generation, rolling over if the
    /// generation is exhausted, and marks `cpu` as running it.
    ///
    /// Must be called with interrupts enabled: a rollover cross-calls the
    /// other cores and waits for them, and one of them may be rolling over
    /// towards this core at the same time.
    ///
    /// # Panics
    /// If `cpu` is not one of the configured `nr_cpus` cores.
    pub fn new_context<C, S>(&self, cpu: &C, smp: &S, mm: &AddressSpace)
    where
        C: Cpu + ?Sized,
        S: SmpCall + ?Sized,
    {
        let slot = self.slot(cpu);
        debug_assert!(
            !cpu.irqs_disabled(),
            "ASID allocation with interrupts disabled"
        );

        let _guard = self.lock.lock();

        // A rollover on another core may have moved `mm` into the current
        // generation while we were waiting for the lock.
        if mm.context().id().is_current(self.last_asid()) {
            mm.context().cpus().set(cpu.id());
            return;
        }

        let mut asid = self.last_asid.load(Ordering::Relaxed).wrapping_add(1);
        if asid == 0 {
            asid = ASID_FIRST_VERSION;
        }
        self.last_asid.store(asid, Ordering::Relaxed);

        if asid & !GENERATION_MASK == 0 {
            let base = asid;
            asid = base + slot;
            self.rollovers.inc();
            debug!(
                "ASID rollover on {}: generation {:#x}",
                cpu.id(),
                base >> ASID_BITS
            );

            self.flush_context(cpu);
            smp_wmb();
            smp.call_function_others(&|other| self.reset_context(other));

            self.last_asid
                .store(base + self.config.nr_cpus, Ordering::Relaxed);
        }

        self.allocations.inc();
        self.set_mm_context(cpu, mm, ContextId::from_bits(asid));
    }

    /// Rollover cross-call handler, run on each core other than the one
    /// rolling over.
    ///
    /// # Panics
    /// If `cpu` is not one of the configured `nr_cpus` cores.
    pub fn reset_context(&self, cpu: &dyn Cpu) {
        smp_rmb();
        let asid = self.last_asid.load(Ordering::Relaxed) + self.slot(cpu);

        self.flush_context(cpu);
        cpu.with_active_mm(&mut |mm| {
            self.set_mm_context(cpu, mm, ContextId::from_bits(asid));
            cpu.switch_mm(mm.pgd(), mm.context().id());
        });
    }

    /// Installs `id` in `mm` unless another core already moved it into the
    /// current generation, then marks `cpu` in its mask.
    pub fn set_mm_context<C>(&self, cpu: &C, mm: &AddressSpace, id: ContextId)
    where
        C: Cpu + ?Sized,
    {
        let ctx = mm.context();
        let _guard = ctx.id_lock.lock_irqsave(cpu);
        if !ctx.id().is_current(self.last_asid()) {
            ctx.set_id(id);
            ctx.cpus().clear_all();
        }
        ctx.cpus().set(cpu.id());
    }

    /// Offset of `cpu`'s reserved ID from the first ID of a generation.
    fn slot<C: Cpu + ?Sized>(&self, cpu: &C) -> u32 {
        let id = cpu.id();
        assert!(
            id.as_u32() < self.config.nr_cpus,
            "{id} is outside the {} CPUs the ASID allocator reserves slots for",
            self.config.nr_cpus
        );
        id.as_u32() + 1
    }

    /// Drops every TLB entry of the previous generation on `cpu`.
    fn flush_context<C: Cpu + ?Sized>(&self, cpu: &C) {
        cpu.set_context_id(ContextId::NONE);
        isb();
        cpu.local_flush_tlb_all();
        if self.config.icache_vivt_asid_tagged {
            cpu.flush_icache_all();
            dsb();
        }
    }
}

impl core::fmt::Debug for AsidAllocator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AsidAllocator")
            .field("last_asid", &self.last_asid())
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
