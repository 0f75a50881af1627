//! A simulated SMP machine.
//!
//! Each core has an interrupt line with three states: free, masked by the
//! core's own task context, or busy running a cross-call handler. A
//! cross-call waits for the target's line to be free, claims it and runs the
//! handler on the caller's thread on behalf of the target. That gives the
//! same ordering guarantees as a real IPI: a core with interrupts masked
//! never observes a handler in the middle of its critical section.
//!
//! Every write to a core's page-table base or context-ID register is checked
//! against every other core: two different address spaces resident at the
//! same time must never carry the same `(generation, asid)`.

#![allow(dead_code)]

use kernel_asid::{AddressSpace, ContextId, Cpu, CpuId, PageTableBase, SmpCall};
#[cfg(feature = "smp")]
use kernel_asid::{AsidAllocator, SwitchMm};
use kernel_sync::{IrqControl, IrqState};
use std::sync::atomic::{AtomicU8, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

const LINE_FREE: u8 = 0;
const LINE_MASKED: u8 = 1;
const LINE_HANDLING: u8 = 2;

/// Architectural state of one simulated core.
#[derive(Debug, Default, Clone, Copy)]
pub struct Registers {
    pub pgd: Option<PageTableBase>,
    pub ctx: ContextId,
    pub tlb_flushes: u64,
    pub icache_flushes: u64,
}

struct Core {
    line: AtomicU8,
    active: Mutex<Option<Arc<AddressSpace>>>,
}

pub struct Machine {
    cores: Vec<Core>,
    regs: Mutex<Vec<Registers>>,
    online: AtomicU32,
    violations: Mutex<Vec<String>>,
    ipis: AtomicUsize,
}

impl Machine {
    pub fn new(nr_cpus: u32) -> Self {
        let n = usize::try_from(nr_cpus).unwrap();
        Self {
            cores: (0..n)
                .map(|_| Core {
                    line: AtomicU8::new(LINE_FREE),
                    active: Mutex::new(None),
                })
                .collect(),
            regs: Mutex::new(vec![Registers::default(); n]),
            online: AtomicU32::new(if nr_cpus == 32 { u32::MAX } else { (1 << nr_cpus) - 1 }),
            violations: Mutex::new(Vec::new()),
            ipis: AtomicUsize::new(0),
        }
    }

    /// The task-context view of core `id`.
    pub fn cpu(&self, id: u32) -> SimCpu<'_> {
        SimCpu {
            machine: self,
            id: CpuId::new(id),
        }
    }

    pub fn set_online(&self, id: u32, online: bool) {
        if online {
            self.online.fetch_or(1 << id, Ordering::SeqCst);
        } else {
            self.online.fetch_and(!(1 << id), Ordering::SeqCst);
        }
    }

    pub fn registers(&self, id: u32) -> Registers {
        self.regs.lock().unwrap()[usize::try_from(id).unwrap()]
    }

    /// Cross-call handlers run so far, summed over all targets.
    pub fn ipis(&self) -> usize {
        self.ipis.load(Ordering::SeqCst)
    }

    pub fn violations(&self) -> Vec<String> {
        self.violations.lock().unwrap().clone()
    }

    /// Makes `mm` the active address space of an idle core, as if it had
    /// been switched in before the test started.
    pub fn set_active(&self, id: u32, mm: Option<Arc<AddressSpace>>) {
        *self.core(CpuId::new(id)).active.lock().unwrap() = mm;
    }

    fn core(&self, id: CpuId) -> &Core {
        &self.cores[id.as_usize()]
    }

    fn update(&self, id: CpuId, f: impl FnOnce(&mut Registers)) {
        let mut regs = self.regs.lock().unwrap();
        f(&mut regs[id.as_usize()]);

        let me = regs[id.as_usize()];
        let Some(my_pgd) = me.pgd else { return };
        if me.ctx.asid() == 0 {
            return;
        }
        for (other, r) in regs.iter().enumerate() {
            if other == id.as_usize() {
                continue;
            }
            if let Some(pgd) = r.pgd
                && pgd != my_pgd
                && r.ctx == me.ctx
            {
                self.violations.lock().unwrap().push(format!(
                    "{id} and cpu{other} both run {:?} for {my_pgd:?} / {pgd:?}",
                    me.ctx
                ));
            }
        }
    }
}

/// Register and cache operations shared by task and interrupt context.
trait Hw {
    fn machine(&self) -> &Machine;
    fn cpu_id(&self) -> CpuId;

    fn hw_set_context_id(&self, id: ContextId) {
        self.machine().update(self.cpu_id(), |r| r.ctx = id);
    }

    fn hw_switch_mm(&self, pgd: PageTableBase, id: ContextId) {
        self.machine().update(self.cpu_id(), |r| {
            r.pgd = Some(pgd);
            r.ctx = id;
        });
    }

    fn hw_flush_tlb(&self) {
        self.machine().update(self.cpu_id(), |r| r.tlb_flushes += 1);
    }

    fn hw_flush_icache(&self) {
        self.machine().update(self.cpu_id(), |r| r.icache_flushes += 1);
    }

    fn hw_with_active_mm(&self, f: &mut dyn FnMut(&AddressSpace)) {
        let active = self.machine().core(self.cpu_id()).active.lock().unwrap().clone();
        if let Some(mm) = active {
            f(&mm);
        }
    }
}

macro_rules! impl_cpu {
    ($ty:ident) => {
        impl Cpu for $ty<'_> {
            fn id(&self) -> CpuId {
                self.id
            }

            fn set_context_id(&self, id: ContextId) {
                self.hw_set_context_id(id);
            }

            fn switch_mm(&self, pgd: PageTableBase, id: ContextId) {
                self.hw_switch_mm(pgd, id);
            }

            fn local_flush_tlb_all(&self) {
                self.hw_flush_tlb();
            }

            fn flush_icache_all(&self) {
                self.hw_flush_icache();
            }

            fn with_active_mm(&self, f: &mut dyn FnMut(&AddressSpace)) {
                self.hw_with_active_mm(f);
            }
        }

        impl Hw for $ty<'_> {
            fn machine(&self) -> &Machine {
                self.machine
            }

            fn cpu_id(&self) -> CpuId {
                self.id
            }
        }
    };
}

/// Core `id` running in task context on the calling thread.
pub struct SimCpu<'m> {
    machine: &'m Machine,
    id: CpuId,
}

impl_cpu!(SimCpu);

impl IrqControl for SimCpu<'_> {
    fn irqs_disabled(&self) -> bool {
        self.machine.core(self.id).line.load(Ordering::SeqCst) == LINE_MASKED
    }

    fn irq_save(&self) -> IrqState {
        let line = &self.machine.core(self.id).line;
        if line.load(Ordering::SeqCst) == LINE_MASKED {
            return IrqState::new(false);
        }
        while line
            .compare_exchange(LINE_FREE, LINE_MASKED, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            thread::yield_now();
        }
        IrqState::new(true)
    }

    fn irq_restore(&self, state: IrqState) {
        if state.were_enabled() {
            self.machine.core(self.id).line.store(LINE_FREE, Ordering::SeqCst);
        }
    }
}

impl SmpCall for SimCpu<'_> {
    fn call_function_others(&self, f: &(dyn Fn(&dyn Cpu) + Sync)) {
        let online = self.machine.online.load(Ordering::SeqCst);
        for (i, core) in self.machine.cores.iter().enumerate() {
            let target = CpuId::new(u32::try_from(i).unwrap());
            if target == self.id || online & (1 << i) == 0 {
                continue;
            }
            while core
                .line
                .compare_exchange(LINE_FREE, LINE_HANDLING, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                thread::yield_now();
            }
            f(&IrqCpu {
                machine: self.machine,
                id: target,
            });
            self.machine.ipis.fetch_add(1, Ordering::SeqCst);
            core.line.store(LINE_FREE, Ordering::SeqCst);
        }
    }
}

impl SimCpu<'_> {
    /// Replaces the active address space and returns the previous one.
    pub fn set_active(&self, mm: Option<Arc<AddressSpace>>) -> Option<Arc<AddressSpace>> {
        std::mem::replace(&mut *self.machine.core(self.id).active.lock().unwrap(), mm)
    }

    /// A scheduler context switch to `next`: interrupts masked around
    /// `switch_mm`, the deferred part completed after they are restored.
    #[cfg(feature = "smp")]
    pub fn context_switch(&self, alloc: &AsidAllocator, next: &Arc<AddressSpace>) -> SwitchMm {
        let irq = self.irq_save();
        let prev = self.set_active(Some(Arc::clone(next)));
        let outcome = alloc.switch_mm(self, self, prev.as_deref(), next);

        let regs = self.machine.registers(self.id.as_u32());
        if outcome.is_deferred() {
            assert_eq!(regs.pgd, prev.as_ref().map(|p| p.pgd()));
        } else {
            assert_eq!(regs.pgd, Some(next.pgd()));
        }

        self.irq_restore(irq);
        alloc.finish_switch(self, self, next, outcome);
        outcome
    }
}

/// Core `id` as seen by a cross-call handler: interrupts are masked.
struct IrqCpu<'m> {
    machine: &'m Machine,
    id: CpuId,
}

impl_cpu!(IrqCpu);

impl IrqControl for IrqCpu<'_> {
    fn irqs_disabled(&self) -> bool {
        true
    }

    fn irq_save(&self) -> IrqState {
        IrqState::new(false)
    }

    fn irq_restore(&self, _state: IrqState) {}
}

/// `n` address spaces with distinct, page-aligned table bases.
pub fn address_spaces(n: usize) -> Vec<Arc<AddressSpace>> {
    (0..n)
        .map(|i| {
            let base = 0x4000_0000 + u64::try_from(i).unwrap() * 0x4000;
            Arc::new(AddressSpace::new(PageTableBase::new(base)))
        })
        .collect()
}
