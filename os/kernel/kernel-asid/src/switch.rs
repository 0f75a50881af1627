use crate::allocator::AsidAllocator;
use crate::mm::AddressSpace;
use crate::platform::{Cpu, SmpCall};
use core::ptr;
use kernel_sync::IrqGuard;
use log::trace;

/// Outcome of a context-switch hook.
#[must_use = "a deferred switch has to be completed with `finish_switch`"]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SwitchMm {
    /// `next` was already loaded on this core; nothing was touched.
    Unchanged,
    /// `next` is loaded with an ID of the current generation.
    Switched,
    /// `next` needs a new ID but interrupts were masked. The core keeps
    /// running on the previous translation tables until
    /// [`AsidAllocator::finish_switch`].
    Deferred,
}

impl SwitchMm {
    #[inline]
    #[must_use]
    pub const fn is_deferred(self) -> bool {
        matches!(self, Self::Deferred)
    }
}

impl AsidAllocator {
    /// Scheduler hook: switch `cpu` from `prev` to `next`.
    ///
    /// Usually called with interrupts masked, in which case a switch that
    /// needs a rollover comes back as [`SwitchMm::Deferred`].
    pub fn switch_mm<C, S>(
        &self,
        cpu: &C,
        smp: &S,
        prev: Option<&AddressSpace>,
        next: &AddressSpace,
    ) -> SwitchMm
    where
        C: Cpu + ?Sized,
        S: SmpCall + ?Sized,
    {
        let id = cpu.id();
        let cpus = next.context().cpus();

        // Migrated threads may find stale lines for their ASID in this core's
        // icache.
        if !cpus.is_empty() && !cpus.test(id) {
            trace!("{id}: icache flush for migrated mm {:#x}", next.pgd().as_u64());
            cpu.flush_icache_all();
        }

        let already_loaded = cpus.test_and_set(id);
        let same_mm = prev.is_some_and(|p| ptr::eq(p, next));
        if !already_loaded || !same_mm {
            return self.check_and_switch_context(cpu, smp, next);
        }
        SwitchMm::Unchanged
    }

    /// Exec-time switch to a freshly created address space. Interrupts are
    /// expected to be enabled, so this never defers.
    pub fn activate_mm<C, S>(&self, cpu: &C, smp: &S, prev: Option<&AddressSpace>, next: &AddressSpace)
    where
        C: Cpu + ?Sized,
        S: SmpCall + ?Sized,
    {
        let outcome = self.switch_mm(cpu, smp, prev, next);
        self.finish_switch(cpu, smp, next, outcome);
    }

    /// Loads `mm` on `cpu`, allocating a new ID first if its generation is
    /// stale.
    ///
    /// The generation check and the register load are done with interrupts
    /// masked, so no rollover cross-call lands between them.
    pub fn check_and_switch_context<C, S>(&self, cpu: &C, smp: &S, mm: &AddressSpace) -> SwitchMm
    where
        C: Cpu + ?Sized,
        S: SmpCall + ?Sized,
    {
        let irq = IrqGuard::new(cpu);
        let id = mm.context().id();
        if id.is_current(self.last_asid()) {
            cpu.switch_mm(mm.pgd(), id);
            return SwitchMm::Switched;
        }

        if !irq.state().were_enabled() {
            trace!("{}: switch to mm {:#x} deferred", cpu.id(), mm.pgd().as_u64());
            return SwitchMm::Deferred;
        }

        drop(irq);
        self.switch_new_context(cpu, smp, mm);
        SwitchMm::Switched
    }

    /// Completes a switch that [`AsidAllocator::switch_mm`] deferred. Call it
    /// once interrupts are enabled again; any other outcome is a no-op.
    pub fn finish_switch<C, S>(&self, cpu: &C, smp: &S, mm: &AddressSpace, outcome: SwitchMm)
    where
        C: Cpu + ?Sized,
        S: SmpCall + ?Sized,
    {
        if outcome.is_deferred() {
            self.switch_new_context(cpu, smp, mm);
        }
    }

    fn switch_new_context<C, S>(&self, cpu: &C, smp: &S, mm: &AddressSpace)
    where
        C: Cpu + ?Sized,
        S: SmpCall + ?Sized,
    {
        // Only loops if another core rolled over between the allocation and
        // the register load.
        loop {
            self.new_context(cpu, smp, mm);

            let _irq = IrqGuard::new(cpu);
            let id = mm.context().id();
            if id.is_current(self.last_asid()) {
                cpu.switch_mm(mm.pgd(), id);
                return;
            }
        }
    }
}
