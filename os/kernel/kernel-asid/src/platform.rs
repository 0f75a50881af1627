//! Hardware hooks the context switch is written against.
//!
//! A port implements [`Cpu`] once per core (MMU register writes, local cache
//! and TLB maintenance) and [`SmpCall`] once for the interrupt controller.

use crate::context_id::ContextId;
use crate::cpumask::CpuId;
use crate::mm::{AddressSpace, PageTableBase};
use kernel_sync::IrqControl;

/// The executing core.
///
/// Every method acts on the core it is called on. Interrupt masking comes
/// from [`IrqControl`]; the allocator masks interrupts through it around
/// register updates that must not be split by a rollover IPI.
pub trait Cpu: IrqControl {
    /// Logical index of this core. It must be below the `nr_cpus` the
    /// allocator was configured with: each such core owns one reserved slot
    /// per generation, and the allocator panics on any other index.
    fn id(&self) -> CpuId;

    /// Programs the context-ID register with `id`.
    fn set_context_id(&self, id: ContextId);

    /// Loads `pgd` and `id` together (`cpu_switch_mm`).
    fn switch_mm(&self, pgd: PageTableBase, id: ContextId);

    /// Invalidates every TLB entry on this core.
    fn local_flush_tlb_all(&self);

    /// Invalidates the instruction cache on this core.
    fn flush_icache_all(&self);

    /// Calls `f` with the address space the scheduler has made active on this
    /// core, if any.
    fn with_active_mm(&self, f: &mut dyn FnMut(&AddressSpace));
}

/// Inter-processor function calls.
pub trait SmpCall {
    /// Runs `f` on every online core except the caller and returns once all
    /// of them have finished.
    ///
    /// Each target runs `f` from interrupt context, so a core with interrupts
    /// masked delays the caller until it unmasks them. Cores that are offline
    /// are skipped.
    fn call_function_others(&self, f: &(dyn Fn(&dyn Cpu) + Sync));
}
