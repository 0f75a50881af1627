use bitfield_struct::bitfield;

/// Width of the hardware ASID field.
pub const ASID_BITS: u32 = 8;

/// Bits of a context ID that hold the generation.
pub const GENERATION_MASK: u32 = !0 << ASID_BITS;

/// The first context ID value of generation 1.
///
/// Generation 0 is never handed out, so an ID of `0` always reads as stale.
pub const ASID_FIRST_VERSION: u32 = 1 << ASID_BITS;

/// Tags available to address spaces per generation. Tag 0 is reserved for the
/// window in which a core flushes its TLB.
pub const NUM_USER_ASIDS: u32 = (1 << ASID_BITS) - 1;

/// `context.id`: hardware ASID in the low byte, generation above it.
///
/// The whole word increases monotonically as IDs are handed out, so the
/// allocator's `last_asid` uses the same encoding.
#[bitfield(u32)]
#[derive(PartialEq, Eq, Hash)]
pub struct ContextId {
    /// Bits 0–7 — the tag programmed into the context-ID register.
    #[bits(8)]
    pub asid: u8,

    /// Bits 8–31 — the rollover epoch the tag belongs to.
    #[bits(24)]
    pub generation: u32,
}

impl ContextId {
    /// "No ASID yet"; never current.
    pub const NONE: Self = Self::new();

    #[inline]
    #[must_use]
    pub const fn from_parts(generation: u32, asid: u8) -> Self {
        Self::new().with_generation(generation).with_asid(asid)
    }

    /// Whether `self` belongs to the same generation as `last`.
    #[inline]
    #[must_use]
    pub const fn is_current(self, last: Self) -> bool {
        (self.into_bits() ^ last.into_bits()) >> ASID_BITS == 0
    }

    /// Generation bits in place, ASID cleared.
    #[inline]
    #[must_use]
    pub const fn generation_bits(self) -> u32 {
        self.into_bits() & GENERATION_MASK
    }
}
