//! Probabilistic fault and delay injection.

use crate::random::DeterministicRng;

/// How often faults and delays fire.
#[derive(Debug, Clone)]
pub struct FaultConfig {
    /// Probability that an operation boundary injects a fault
    pub failure_probability: f64,
    /// Probability that an operation boundary spins before continuing
    pub delay_probability: f64,
    /// Upper bound on spin iterations for one delay
    pub delay_spins_max: u32,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            failure_probability: 0.05,
            delay_probability: 0.1,
            delay_spins_max: 256,
        }
    }
}

impl FaultConfig {
    /// No faults, no delays.
    #[must_use]
    pub fn none() -> Self {
        Self {
            failure_probability: 0.0,
            delay_probability: 0.0,
            delay_spins_max: 0,
        }
    }

    /// Delays only; useful for real-thread stress where "faults" have no
    /// meaning but perturbing the interleaving does.
    #[must_use]
    pub fn delays_only() -> Self {
        Self {
            failure_probability: 0.0,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            failure_probability: 0.2,
            delay_probability: 0.3,
            delay_spins_max: 4096,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultStats {
    pub checks_count: u64,
    pub faults_count: u64,
    pub delays_count: u64,
}

/// Decides, deterministically, when to inject faults and delays.
#[derive(Debug, Clone)]
pub struct FaultInjector {
    rng: DeterministicRng,
    config: FaultConfig,
    stats: FaultStats,
}

impl FaultInjector {
    #[must_use]
    pub fn new(rng: DeterministicRng, config: FaultConfig) -> Self {
        Self {
            rng,
            config,
            stats: FaultStats::default(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &FaultConfig {
        &self.config
    }

    pub fn should_fail(&mut self) -> bool {
        self.stats.checks_count += 1;
        if self.config.failure_probability <= 0.0 {
            return false;
        }
        let fail = self.rng.gen_bool(self.config.failure_probability.min(1.0));
        if fail {
            self.stats.faults_count += 1;
        }
        fail
    }

    /// Spin count for a delay at this boundary, if one fires.
    pub fn next_delay(&mut self) -> Option<u32> {
        if self.config.delay_probability <= 0.0 || self.config.delay_spins_max == 0 {
            return None;
        }
        if !self.rng.gen_bool(self.config.delay_probability.min(1.0)) {
            return None;
        }
        self.stats.delays_count += 1;
        Some(self.rng.gen_range(1..=self.config.delay_spins_max))
    }

    #[must_use]
    pub fn stats(&self) -> FaultStats {
        self.stats
    }
}
