//! # hs-stack
//!
//! Lock-free LIFO stack with hazard-pointer memory reclamation.
//!
//! A popped node may still be read by threads that loaded it before it was
//! unlinked. Instead of freeing it, `pop` retires it to a [`Domain`],
//! which frees it once no hazard pointer names it.
//!
//! # Modules
//!
//! - `hazard`: Hazard Pointer Registry and per-thread slot cache
//! - `retire`: Reclamation List of pending-delete records
//! - `reclaim`: Reclaimer, stats, and the audit observer
//! - `domain`: one registry plus one list, shared by stacks
//! - `stack`: `HazardStack<T>`
//! - `tracked`: `TrackedStack`, which records history for property checks
//! - `kani_proofs`: Kani bounded model checking proofs
//!
//! # Usage
//!
//! ```rust
//! use hs_stack::HazardStack;
//!
//! let stack = HazardStack::new();
//! stack.push(1);
//! stack.push(2);
//! assert_eq!(stack.pop(), Some(2));
//! assert_eq!(stack.pop(), Some(1));
//! assert_eq!(stack.pop(), None);
//! ```
//!
//! # Testing
//!
//! ```bash
//! DST_SEED=12345 cargo test -p hs-stack
//! RUSTFLAGS="--cfg loom" cargo test -p hs-stack --test loom_hazard --release
//! cargo kani -p hs-stack
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod hazard;
pub mod kani_proofs;
pub mod reclaim;
pub mod retire;
pub mod stack;
pub mod tracked;

pub use config::{DomainConfig, HAZARD_SLOTS_DEFAULT};
pub use domain::Domain;
pub use error::{Error, Result};
pub use hazard::{current_thread_id, HazardGuard, HazardRegistry};
pub use reclaim::{ReclaimAudit, ReclaimObserver, ReclaimPass, ReclaimSnapshot, Reclaimer};
pub use retire::{Destructor, ReclamationList, RetireRecord, RetiredChain};
pub use stack::HazardStack;
pub use tracked::TrackedStack;
