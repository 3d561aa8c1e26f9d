//! Real-thread stress driver.
//!
//! Unlike the harness, this runs on OS threads so the hardware picks the
//! interleaving. Each worker still draws its operations and delays from
//! its own seeded environment, so the *workload* is reproducible even
//! though the schedule is not.
//!
//! Run the stress tests under a memory-error detector to turn a
//! use-after-reclaim into a hard failure:
//!
//! ```bash
//! RUSTFLAGS="-Zsanitizer=address" cargo +nightly test --target x86_64-unknown-linux-gnu
//! STRESS_OPS=200 cargo +nightly miri test
//! ```

use std::collections::HashMap;
use std::sync::Barrier;
use std::thread;
use std::time::{Duration, Instant};

use crate::env::DstEnv;
use crate::fault::FaultConfig;
use crate::fault_injection::DstTestableStack;

/// Bits reserved for the per-thread sequence number in a pushed value.
const SEQUENCE_BITS: u32 = 40;

#[derive(Debug, Clone)]
pub struct StressConfig {
    pub seed: u64,
    pub threads_count: usize,
    pub operations_per_thread: u64,
    /// Percentage of operations that are pushes
    pub push_percent: u8,
    pub fault_config: FaultConfig,
}

impl StressConfig {
    /// 8 threads, 10^5 operations in total.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            threads_count: 8,
            operations_per_thread: 12_500,
            push_percent: 50,
            fault_config: FaultConfig::delays_only(),
        }
    }

    /// Override thread and operation counts from `STRESS_THREADS` and
    /// `STRESS_OPS` (operations per thread).
    #[must_use]
    pub fn from_env(seed: u64) -> Self {
        let mut config = Self::new(seed);
        if let Some(threads) = env_number("STRESS_THREADS") {
            config.threads_count = threads as usize;
        }
        if let Some(ops) = env_number("STRESS_OPS") {
            config.operations_per_thread = ops;
        }
        config
    }
}

fn env_number(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(n) => Some(n),
        Err(_) => panic!("{name} must be a valid u64, got {raw:?}"),
    }
}

/// Everything a stress run observed.
#[derive(Debug, Clone)]
pub struct StressReport {
    pub seed: u64,
    pub threads_count: usize,
    pub pushed: Vec<u64>,
    /// Values returned by pops while the workers ran
    pub popped: Vec<u64>,
    pub empty_pops: u64,
    /// Values drained after every worker joined
    pub remaining: Vec<u64>,
    pub elapsed: Duration,
}

impl StressReport {
    /// Conservation check: popped + remaining is exactly the pushed set,
    /// each value once.
    pub fn verify(&self) -> Result<(), String> {
        let mut seen: HashMap<u64, usize> = HashMap::with_capacity(self.pushed.len());
        for value in &self.pushed {
            if seen.insert(*value, 0).is_some() {
                return Err(format!("value {value} pushed twice by the driver"));
            }
        }

        for value in self.popped.iter().chain(&self.remaining) {
            match seen.get_mut(value) {
                None => return Err(format!("value {value} observed but never pushed")),
                Some(count) => {
                    *count += 1;
                    if *count > 1 {
                        return Err(format!("value {value} returned {count} times"));
                    }
                }
            }
        }

        let lost = seen.values().filter(|count| **count == 0).count();
        if lost > 0 {
            return Err(format!("{lost} pushed value(s) were never returned"));
        }
        Ok(())
    }

    #[must_use]
    pub fn format(&self) -> String {
        format!(
            "DST_SEED={} threads={} pushed={} popped={} empty_pops={} remaining={} elapsed={:?}",
            self.seed,
            self.threads_count,
            self.pushed.len(),
            self.popped.len(),
            self.empty_pops,
            self.remaining.len(),
            self.elapsed
        )
    }
}

#[derive(Default)]
struct WorkerLog {
    pushed: Vec<u64>,
    popped: Vec<u64>,
    empty_pops: u64,
}

/// Hammer `stack` from `config.threads_count` threads, then drain it.
///
/// Every pushed value is unique: the worker index sits above
/// `SEQUENCE_BITS` and a per-worker counter below.
pub fn run_stress<S: DstTestableStack>(stack: &S, config: &StressConfig) -> StressReport {
    debug_assert!(config.threads_count > 0);
    debug_assert!(config.push_percent <= 100);

    let root = DstEnv::with_fault_config(config.seed, config.fault_config.clone());
    let barrier = Barrier::new(config.threads_count);
    let started = Instant::now();

    let logs: Vec<WorkerLog> = thread::scope(|scope| {
        let handles: Vec<_> = (0..config.threads_count)
            .map(|index| {
                let mut env = root.fork(index as u64);
                let barrier = &barrier;
                scope.spawn(move || {
                    let mut log = WorkerLog::default();
                    let mut sequence = 0u64;
                    barrier.wait();

                    for _ in 0..config.operations_per_thread {
                        env.maybe_delay();
                        if env.rng().gen_range(0..100u8) < config.push_percent {
                            sequence += 1;
                            let value = ((index as u64 + 1) << SEQUENCE_BITS) | sequence;
                            stack.push(value);
                            log.pushed.push(value);
                        } else {
                            match stack.pop() {
                                Some(value) => log.popped.push(value),
                                None => log.empty_pops += 1,
                            }
                        }
                    }
                    log
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("stress worker panicked"))
            .collect()
    });
    let elapsed = started.elapsed();

    let mut remaining = Vec::new();
    while let Some(value) = stack.pop() {
        remaining.push(value);
    }

    let mut report = StressReport {
        seed: config.seed,
        threads_count: config.threads_count,
        pushed: Vec::new(),
        popped: Vec::new(),
        empty_pops: 0,
        remaining,
        elapsed,
    };
    for log in logs {
        report.pushed.extend(log.pushed);
        report.popped.extend(log.popped);
        report.empty_pops += log.empty_pops;
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct LockedStack(Mutex<Vec<u64>>);

    impl DstTestableStack for LockedStack {
        fn new() -> Self {
            Self(Mutex::new(Vec::new()))
        }

        fn push(&self, value: u64) {
            self.0.lock().unwrap().push(value);
        }

        fn pop(&self) -> Option<u64> {
            self.0.lock().unwrap().pop()
        }

        fn is_empty(&self) -> bool {
            self.0.lock().unwrap().is_empty()
        }

        fn get_contents(&self) -> Vec<u64> {
            self.0.lock().unwrap().iter().rev().copied().collect()
        }
    }

    #[test]
    fn test_stress_on_locked_stack() {
        let config = StressConfig {
            threads_count: 4,
            operations_per_thread: 500,
            ..StressConfig::new(77)
        };
        let stack = LockedStack::new();

        let report = run_stress(&stack, &config);
        report.verify().unwrap();
        assert!(stack.is_empty());
        assert_eq!(report.pushed.len(), report.popped.len() + report.remaining.len());
    }

    #[test]
    fn test_verify_catches_double_return() {
        let report = StressReport {
            seed: 1,
            threads_count: 1,
            pushed: vec![1, 2],
            popped: vec![1, 2],
            empty_pops: 0,
            remaining: vec![2],
            elapsed: Duration::ZERO,
        };
        assert!(report.verify().unwrap_err().contains("returned 2 times"));
    }

    #[test]
    fn test_verify_catches_loss() {
        let report = StressReport {
            seed: 1,
            threads_count: 1,
            pushed: vec![1, 2, 3],
            popped: vec![3],
            empty_pops: 0,
            remaining: vec![1],
            elapsed: Duration::ZERO,
        };
        assert!(report.verify().unwrap_err().contains("never returned"));
    }
}
