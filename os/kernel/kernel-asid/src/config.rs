use crate::cpumask::MAX_CPUS;
use thiserror::Error;

/// Boot-time parameters of the ASID allocator.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AsidConfig {
    /// Cores that take part in rollover; each gets a reserved slot per
    /// generation.
    pub nr_cpus: u32,

    /// The instruction cache is VIVT and tagged with the ASID, so a reused
    /// ASID can hit stale instructions unless the icache is flushed too.
    pub icache_vivt_asid_tagged: bool,
}

impl AsidConfig {
    #[must_use]
    pub const fn new(nr_cpus: u32) -> Self {
        Self {
            nr_cpus,
            icache_vivt_asid_tagged: false,
        }
    }

    #[must_use]
    pub const fn with_vivt_asid_tagged_icache(mut self, tagged: bool) -> Self {
        self.icache_vivt_asid_tagged = tagged;
        self
    }

    /// # Errors
    /// See [`AsidConfigError`].
    pub const fn validate(&self) -> Result<(), AsidConfigError> {
        if self.nr_cpus == 0 {
            return Err(AsidConfigError::NoCpus);
        }
        if self.nr_cpus > MAX_CPUS {
            return Err(AsidConfigError::TooManyCpus(self.nr_cpus));
        }
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum AsidConfigError {
    #[error("at least one CPU is required")]
    NoCpus,
    #[error("{0} CPUs do not fit the {MAX_CPUS}-bit CPU mask")]
    TooManyCpus(u32),
}
