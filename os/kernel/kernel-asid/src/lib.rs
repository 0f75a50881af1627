//! # ASID allocation and address-space switching
//!
//! ARMv6+ tags TLB entries with an 8-bit address space ID, so switching
//! address spaces does not need a TLB flush as long as no two live address
//! spaces share a tag. [`AsidAllocator`] hands out tags, extends them with a
//! generation number so stale ones can be recognised without scanning, and
//! on exhaustion rolls every core over to a new generation.
//!
//! The scheduler drives it through [`AsidAllocator::switch_mm`],
//! [`AsidAllocator::activate_mm`] and [`AsidAllocator::finish_switch`]. The
//! port supplies the hardware through [`Cpu`] and [`SmpCall`].
//!
//! Without the `smp` feature the allocator is compiled out and [`UpContext`]
//! runs every address space with tag 0.

#![cfg_attr(not(test), no_std)]

#[cfg(feature = "smp")]
mod allocator;
pub mod config;
pub mod context_id;
pub mod cpumask;
pub mod mm;
pub mod platform;
#[cfg(feature = "smp")]
mod switch;
mod up;

#[cfg(feature = "smp")]
pub use allocator::{AsidAllocator, AsidStats};
pub use config::{AsidConfig, AsidConfigError};
pub use context_id::{ASID_BITS, ASID_FIRST_VERSION, ContextId, NUM_USER_ASIDS};
pub use cpumask::{CpuId, CpuMask, MAX_CPUS};
pub use mm::{AddressSpace, MmContext, PageTableBase};
pub use platform::{Cpu, SmpCall};
#[cfg(feature = "smp")]
pub use switch::SwitchMm;
pub use up::UpContext;
