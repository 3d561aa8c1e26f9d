//! DST test harness for reproducible runs.
//!
//! The harness provides:
//! - Configurable number of simulated threads
//! - Seeded choice of which thread runs next
//! - Fault injection between operations
//! - Invariant checking every N operations

use crate::env::DstEnv;
use crate::fault::FaultConfig;

/// Configuration for the DST harness.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub threads_count: usize,
    pub operations_per_thread: u64,
    pub fault_config: FaultConfig,
    /// Check invariants after every N operations (0 = only at the end)
    pub invariant_check_interval: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            threads_count: 4,
            operations_per_thread: 100,
            fault_config: FaultConfig::default(),
            invariant_check_interval: 10,
        }
    }
}

impl HarnessConfig {
    #[must_use]
    pub fn stress() -> Self {
        Self {
            threads_count: 8,
            operations_per_thread: 1000,
            fault_config: FaultConfig::aggressive(),
            invariant_check_interval: 100,
        }
    }

    #[must_use]
    pub fn quick() -> Self {
        Self {
            threads_count: 2,
            operations_per_thread: 50,
            fault_config: FaultConfig::none(),
            invariant_check_interval: 10,
        }
    }
}

/// Result of a harness run.
#[derive(Debug, Clone)]
pub struct HarnessResult {
    pub seed: u64,
    pub operations_count: u64,
    pub context_switches_count: u64,
    pub faults_injected_count: u64,
    pub invariant_checks_count: u64,
    pub all_invariants_held: bool,
    pub first_violation: Option<String>,
}

impl HarnessResult {
    #[must_use]
    pub fn format(&self) -> String {
        let status = if self.all_invariants_held { "PASS" } else { "FAIL" };
        let mut result = format!(
            "[{}] DST_SEED={} ops={} switches={} faults={} checks={}",
            status,
            self.seed,
            self.operations_count,
            self.context_switches_count,
            self.faults_injected_count,
            self.invariant_checks_count
        );
        if let Some(violation) = &self.first_violation {
            result.push_str(&format!("\n  Violation: {violation}"));
        }
        result
    }
}

/// Deterministic harness. Given the same seed, the same sequence of
/// simulated-thread choices and faults is produced.
pub struct DstHarness {
    env: DstEnv,
    config: HarnessConfig,
    operations_count: u64,
    context_switches_count: u64,
    invariant_checks_count: u64,
    violation: Option<String>,
}

impl DstHarness {
    #[must_use]
    pub fn new(seed: u64, config: HarnessConfig) -> Self {
        debug_assert!(seed != 0, "Seed should not be zero");
        debug_assert!(config.threads_count > 0, "Must have at least one thread");

        Self {
            env: DstEnv::with_fault_config(seed, config.fault_config.clone()),
            config,
            operations_count: 0,
            context_switches_count: 0,
            invariant_checks_count: 0,
            violation: None,
        }
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.env.seed()
    }

    pub fn env(&mut self) -> &mut DstEnv {
        &mut self.env
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.violation.is_some()
    }

    fn stop_with_violation(&mut self, message: String) {
        self.violation.get_or_insert(message);
    }

    fn should_check_invariants(&self) -> bool {
        self.config.invariant_check_interval != 0
            && self.operations_count % self.config.invariant_check_interval == 0
    }

    /// Run one simulated thread. `generate_op` returns `None` to skip a step.
    pub fn run_single_threaded<F, T, R>(&mut self, mut generate_op: F, mut execute: R) -> HarnessResult
    where
        F: FnMut(&mut DstEnv, u64) -> Option<T>,
        R: FnMut(&mut DstEnv, T) -> Result<(), String>,
    {
        for step in 0..self.config.operations_per_thread {
            if self.is_stopped() {
                break;
            }
            if let Some(op) = generate_op(&mut self.env, step) {
                if let Err(e) = execute(&mut self.env, op) {
                    self.stop_with_violation(e);
                    break;
                }
                self.operations_count += 1;
            }
            self.env.maybe_delay();
        }

        self.build_result()
    }

    /// Interleave `threads_count` simulated threads on the calling thread.
    ///
    /// At every step the next thread is drawn from the seeded RNG among
    /// those with operations left.
    pub fn run_interleaved<F, T, R, I>(
        &mut self,
        mut generate_op: F,
        mut execute: R,
        mut check_invariants: I,
    ) -> HarnessResult
    where
        F: FnMut(&mut DstEnv, usize, u64) -> Option<T>,
        R: FnMut(&mut DstEnv, usize, T) -> Result<(), String>,
        I: FnMut() -> Result<(), String>,
    {
        let ops_per_thread = self.config.operations_per_thread;
        let mut thread_steps = vec![0u64; self.config.threads_count];
        let mut previous: Option<usize> = None;

        while !self.is_stopped() {
            let runnable: Vec<usize> = (0..thread_steps.len())
                .filter(|&t| thread_steps[t] < ops_per_thread)
                .collect();
            if runnable.is_empty() {
                break;
            }
            let current = runnable[self.env.rng().gen_range(0..runnable.len())];
            if previous.is_some_and(|p| p != current) {
                self.context_switches_count += 1;
            }
            previous = Some(current);

            if let Some(op) = generate_op(&mut self.env, current, thread_steps[current]) {
                if let Err(e) = execute(&mut self.env, current, op) {
                    self.stop_with_violation(format!("Thread {current}: {e}"));
                    break;
                }
                self.operations_count += 1;
            }
            thread_steps[current] += 1;

            if self.should_check_invariants() {
                self.invariant_checks_count += 1;
                if let Err(e) = check_invariants() {
                    self.stop_with_violation(e);
                    break;
                }
            }
        }

        if !self.is_stopped() {
            self.invariant_checks_count += 1;
            if let Err(e) = check_invariants() {
                self.stop_with_violation(e);
            }
        }

        self.build_result()
    }

    fn build_result(&self) -> HarnessResult {
        HarnessResult {
            seed: self.env.seed(),
            operations_count: self.operations_count,
            context_switches_count: self.context_switches_count,
            faults_injected_count: self.env.stats().fault.faults_count,
            invariant_checks_count: self.invariant_checks_count,
            all_invariants_held: self.violation.is_none(),
            first_violation: self.violation.clone(),
        }
    }
}
