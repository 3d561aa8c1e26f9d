//! Fault injection for lock-free stacks.
//!
//! Faults are injected at OPERATION BOUNDARIES, never inside a CAS loop.
//! The stack under test stays pure; the runner decides before and after
//! each call whether the simulated thread fails, stalls, or forces a
//! reclamation pass.
//!
//! ```text
//! FaultPoint (pre-op) ──> push()/pop() ──> FaultPoint (post-op)
//!   "allocation fails?"                     "caller crashes?"
//!                                           "force a reclaim pass?"
//! ```

use std::collections::HashSet;

use crate::env::DstEnv;
use crate::fault::FaultConfig;

/// Where in an operation a fault is considered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    BeforeOperation,
    AfterOperation,
}

/// Faults the runner can inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultType {
    /// Node allocation fails; the push never starts
    AllocationFailure,
    /// Thread abandons the operation (before it starts, or after it
    /// completed but before the caller saw the result)
    ThreadCrash,
    /// Thread stalls for a while
    Delay,
    /// An extra reclamation pass runs at the boundary
    ReclaimTrigger,
}

/// Minimal interface a stack needs for DST.
pub trait DstTestableStack: Send + Sync {
    fn new() -> Self;
    fn push(&self, value: u64);
    fn pop(&self) -> Option<u64>;
    fn is_empty(&self) -> bool;

    /// Contents top to bottom. Only exact while no other thread runs.
    fn get_contents(&self) -> Vec<u64>;

    /// Run a reclamation pass, if the stack defers reclamation.
    fn reclaim(&self) {}
}

/// DST runner for a single simulated thread.
pub struct DstRunner<S> {
    stack: S,
    env: DstEnv,
    pushed: HashSet<u64>,
    popped: Vec<u64>,
    operations_count: u64,
    faults_injected: u64,
    abandoned_operations: u64,
    reclaim_triggers: u64,
}

impl<S: DstTestableStack> DstRunner<S> {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_fault_config(seed, FaultConfig::default())
    }

    #[must_use]
    pub fn with_fault_config(seed: u64, config: FaultConfig) -> Self {
        Self {
            stack: S::new(),
            env: DstEnv::with_fault_config(seed, config),
            pushed: HashSet::new(),
            popped: Vec::new(),
            operations_count: 0,
            faults_injected: 0,
            abandoned_operations: 0,
            reclaim_triggers: 0,
        }
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.env.seed()
    }

    #[must_use]
    pub fn stack(&self) -> &S {
        &self.stack
    }

    /// Push with fault injection at the boundaries.
    pub fn push(&mut self, value: u64) -> Result<(), FaultType> {
        if let Some(fault) = self.maybe_inject_fault(FaultPoint::BeforeOperation) {
            if matches!(fault, FaultType::ThreadCrash | FaultType::AllocationFailure) {
                if fault == FaultType::ThreadCrash {
                    self.abandoned_operations += 1;
                }
                return Err(fault);
            }
        }

        self.stack.push(value);
        self.operations_count += 1;
        // Push completed: the value is in the stack whatever happens next.
        self.pushed.insert(value);

        if let Some(FaultType::ThreadCrash) = self.maybe_inject_fault(FaultPoint::AfterOperation) {
            self.abandoned_operations += 1;
            return Err(FaultType::ThreadCrash);
        }
        Ok(())
    }

    /// Pop with fault injection at the boundaries.
    pub fn pop(&mut self) -> Result<Option<u64>, FaultType> {
        if let Some(FaultType::ThreadCrash) = self.maybe_inject_fault(FaultPoint::BeforeOperation) {
            self.abandoned_operations += 1;
            return Err(FaultType::ThreadCrash);
        }

        let result = self.stack.pop();
        self.operations_count += 1;
        self.popped.extend(result);

        if let Some(FaultType::ThreadCrash) = self.maybe_inject_fault(FaultPoint::AfterOperation) {
            // The value left the stack; the caller just never used it.
            self.abandoned_operations += 1;
            return Err(FaultType::ThreadCrash);
        }
        Ok(result)
    }

    /// Decide on a fault and apply the side-effecting ones in place.
    fn maybe_inject_fault(&mut self, point: FaultPoint) -> Option<FaultType> {
        if !self.env.fault().should_fail() {
            return None;
        }
        self.faults_injected += 1;

        let fault = match (point, self.env.rng().gen_range(0..4_u8)) {
            (FaultPoint::BeforeOperation, 0) => FaultType::AllocationFailure,
            (_, 1) => FaultType::ThreadCrash,
            (_, 2) => FaultType::ReclaimTrigger,
            _ => FaultType::Delay,
        };
        match fault {
            FaultType::Delay => {
                self.env.maybe_delay();
            }
            FaultType::ReclaimTrigger => {
                self.reclaim_triggers += 1;
                self.stack.reclaim();
            }
            FaultType::AllocationFailure | FaultType::ThreadCrash => {}
        }
        Some(fault)
    }

    pub fn check_no_lost_elements(&self) -> bool {
        let contents: HashSet<u64> = self.stack.get_contents().into_iter().collect();
        let popped: HashSet<u64> = self.popped.iter().copied().collect();
        self.pushed
            .iter()
            .all(|e| contents.contains(e) || popped.contains(e))
    }

    pub fn check_no_duplicates(&self) -> bool {
        let contents = self.stack.get_contents();
        let unique: HashSet<_> = contents.iter().collect();
        contents.len() == unique.len()
    }

    pub fn check_no_double_return(&self) -> bool {
        let mut seen = HashSet::with_capacity(self.popped.len());
        let contents: HashSet<u64> = self.stack.get_contents().into_iter().collect();
        self.popped
            .iter()
            .all(|e| seen.insert(*e) && !contents.contains(e))
    }

    #[must_use]
    pub fn stats(&self) -> DstStats {
        DstStats {
            seed: self.env.seed(),
            operations_count: self.operations_count,
            faults_injected: self.faults_injected,
            abandoned_operations: self.abandoned_operations,
            reclaim_triggers: self.reclaim_triggers,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DstStats {
    pub seed: u64,
    pub operations_count: u64,
    pub faults_injected: u64,
    pub abandoned_operations: u64,
    pub reclaim_triggers: u64,
}

impl DstStats {
    #[must_use]
    pub fn format(&self) -> String {
        format!(
            "DST_SEED={} ops={} faults={} abandoned={} reclaims={}",
            self.seed,
            self.operations_count,
            self.faults_injected,
            self.abandoned_operations,
            self.reclaim_triggers
        )
    }
}

#[derive(Debug, Clone)]
pub enum DstOp {
    Push(u64),
    Pop,
}

#[derive(Debug)]
pub struct DstResult {
    pub passed: bool,
    pub no_lost_elements: bool,
    pub no_duplicates: bool,
    pub no_double_return: bool,
    pub stats: DstStats,
    pub fault_errors: Vec<FaultType>,
}

impl DstResult {
    #[must_use]
    pub fn format(&self) -> String {
        let status = if self.passed { "PASS" } else { "FAIL" };
        let mut result = format!("[{}] {}", status, self.stats.format());
        if !self.no_lost_elements {
            result.push_str("\n  VIOLATION: NoLostElements");
        }
        if !self.no_duplicates {
            result.push_str("\n  VIOLATION: NoDuplicates");
        }
        if !self.no_double_return {
            result.push_str("\n  VIOLATION: NoDoubleReturn");
        }
        result
    }
}

/// Run `operations` through a fresh stack with fault injection and check
/// the conservation invariants at the end.
pub fn run_dst_scenario<S: DstTestableStack>(seed: u64, operations: Vec<DstOp>) -> DstResult {
    let mut runner: DstRunner<S> = DstRunner::new(seed);
    let mut fault_errors = Vec::new();

    for op in operations {
        let result = match op {
            DstOp::Push(v) => runner.push(v),
            DstOp::Pop => runner.pop().map(|_| ()),
        };
        // Faults are part of the scenario, not failures of it.
        if let Err(fault) = result {
            fault_errors.push(fault);
        }
    }

    let no_lost_elements = runner.check_no_lost_elements();
    let no_duplicates = runner.check_no_duplicates();
    let no_double_return = runner.check_no_double_return();

    DstResult {
        passed: no_lost_elements && no_duplicates && no_double_return,
        no_lost_elements,
        no_duplicates,
        no_double_return,
        stats: runner.stats(),
        fault_errors,
    }
}
