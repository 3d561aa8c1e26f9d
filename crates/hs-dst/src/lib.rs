//! # hs-dst
//!
//! Deterministic Simulation Testing for concurrent stacks.
//!
//! Every source of nondeterminism the tests control (operation choice,
//! simulated scheduling, injected faults, delays) is derived from one
//! seed, so a failing run can be replayed exactly.
//!
//! ## Drivers
//!
//! - `fault_injection`: single simulated thread, faults at operation boundaries
//! - `harness`: simulated interleaving of N threads on one OS thread
//! - `stress`: real OS threads with seeded workloads and delays
//!
//! ## Usage
//!
//! ```rust
//! use hs_dst::DstEnv;
//!
//! let mut env = DstEnv::new(12345);
//!
//! let value: u64 = env.rng().gen();
//! let choice = env.rng().gen_range(0..10);
//!
//! if env.fault().should_fail() {
//!     // simulate failure
//! }
//! # let _ = (value, choice);
//! ```
//!
//! ## Reproducibility
//!
//! ```bash
//! DST_SEED=12345 cargo test
//! ```

pub mod env;
pub mod fault;
pub mod fault_injection;
pub mod harness;
pub mod random;
pub mod stress;

pub use env::{DstEnv, DstEnvStats};
pub use fault::{FaultConfig, FaultInjector, FaultStats};
pub use fault_injection::{
    run_dst_scenario, DstOp, DstResult, DstRunner, DstStats, DstTestableStack, FaultPoint,
    FaultType,
};
pub use harness::{DstHarness, HarnessConfig, HarnessResult};
pub use random::DeterministicRng;
pub use stress::{run_stress, StressConfig, StressReport};

/// Get DST seed from environment or generate random one.
///
/// Prints the seed for reproduction. Use `DST_SEED=<seed>` to reproduce.
#[must_use]
pub fn get_or_generate_seed() -> u64 {
    match std::env::var("DST_SEED") {
        Ok(s) => {
            let seed: u64 = s.parse().expect("DST_SEED must be a valid u64");
            println!("DST_SEED={} (from environment)", seed);
            seed
        }
        Err(_) => {
            // Zero is reserved; harnesses reject it.
            let seed = rand::random::<u64>().max(1);
            println!("DST_SEED={} (randomly generated)", seed);
            seed
        }
    }
}

/// Number of seeds a multi-seed test should sweep, from `DST_ITERATIONS`.
#[must_use]
pub fn iterations_or(default: u64) -> u64 {
    std::env::var("DST_ITERATIONS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
