use crate::context_id::ContextId;
use crate::mm::AddressSpace;
use crate::platform::Cpu;
use core::ptr;

/// Uniprocessor context switching: every address space runs with tag 0.
///
/// Without per-space tags the TLB cannot tell address spaces apart, so each
/// switch to a different space flushes it.
#[derive(Debug, Default, Copy, Clone)]
pub struct UpContext;

impl UpContext {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Returns whether anything was loaded.
    pub fn switch_mm<C: Cpu + ?Sized>(&self, cpu: &C, prev: Option<&AddressSpace>, next: &AddressSpace) -> bool {
        next.context().cpus().set(cpu.id());
        if prev.is_some_and(|p| ptr::eq(p, next)) {
            return false;
        }
        cpu.local_flush_tlb_all();
        cpu.switch_mm(next.pgd(), ContextId::NONE);
        true
    }

    pub fn activate_mm<C: Cpu + ?Sized>(&self, cpu: &C, prev: Option<&AddressSpace>, next: &AddressSpace) {
        let _ = self.switch_mm(cpu, prev, next);
    }
}
