//! The DST environment: one seed drives every random decision.

use std::fmt;

use crate::fault::{FaultConfig, FaultInjector, FaultStats};
use crate::random::DeterministicRng;

/// Deterministic environment for one simulated (or real) thread.
#[derive(Debug, Clone)]
pub struct DstEnv {
    seed: u64,
    rng: DeterministicRng,
    fault: FaultInjector,
}

impl DstEnv {
    /// Environment with the default fault configuration.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_fault_config(seed, FaultConfig::default())
    }

    #[must_use]
    pub fn with_fault_config(seed: u64, config: FaultConfig) -> Self {
        let rng = DeterministicRng::new(seed);
        let fault = FaultInjector::new(DeterministicRng::new(rng.child_seed(0)), config);
        Self { seed, rng, fault }
    }

    /// Child environment for the `index`-th worker, same fault config.
    #[must_use]
    pub fn fork(&self, index: u64) -> Self {
        Self::with_fault_config(
            self.rng.child_seed(index + 1),
            self.fault.config().clone(),
        )
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn rng(&mut self) -> &mut DeterministicRng {
        &mut self.rng
    }

    pub fn fault(&mut self) -> &mut FaultInjector {
        &mut self.fault
    }

    /// Busy-spin for a random number of iterations if a delay fires.
    ///
    /// Under real threads this widens race windows; in single-threaded
    /// runs it only costs time.
    pub fn maybe_delay(&mut self) -> bool {
        match self.fault.next_delay() {
            Some(spins) => {
                for _ in 0..spins {
                    std::hint::spin_loop();
                }
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn format_seed(&self) -> String {
        format!("DST_SEED={}", self.seed)
    }

    #[must_use]
    pub fn stats(&self) -> DstEnvStats {
        DstEnvStats {
            seed: self.seed,
            fault: self.fault.stats(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DstEnvStats {
    pub seed: u64,
    pub fault: FaultStats,
}

impl fmt::Display for DstEnvStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DST_SEED={} checks={} faults={} delays={}",
            self.seed, self.fault.checks_count, self.fault.faults_count, self.fault.delays_count
        )
    }
}
