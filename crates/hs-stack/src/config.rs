//! Reclamation domain configuration.

use crate::error::{Error, Result};

/// Default size of the hazard pointer table.
pub const HAZARD_SLOTS_DEFAULT: usize = 100;

/// Configuration for a [`Domain`](crate::Domain).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainConfig {
    /// Fixed number of hazard pointer slots. Bounds how many threads may
    /// pop from stacks in the domain at the same time.
    pub hazard_slots_count: usize,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            hazard_slots_count: HAZARD_SLOTS_DEFAULT,
        }
    }
}

impl DomainConfig {
    #[must_use]
    pub fn with_hazard_slots(mut self, count: usize) -> Self {
        self.hazard_slots_count = count;
        self
    }

    /// Check every value before a domain is built from it.
    pub fn validate(&self) -> Result<()> {
        if self.hazard_slots_count == 0 {
            return Err(Error::InvalidConfig {
                key: "hazard_slots_count",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }
}
