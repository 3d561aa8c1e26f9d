//! # hs-core
//!
//! Core types and invariants for the hazard-pointer stack.
//!
//! This crate provides:
//! - `PropertyResult` and `PropertyChecker` for verifying invariants
//! - `Counterexample` for rendering failure paths
//! - Invariant traits for the stack (`StackProperties`) and for the
//!   deferred reclamation subsystem (`ReclamationProperties`)
//!
//! Implementations expose their observable state through the traits;
//! the checkers never reach into the data structures themselves.

pub mod counterexample;
pub mod invariants;
pub mod property;

pub use counterexample::{Counterexample, MemoryIssue, StateSnapshot, ThreadAction};
pub use invariants::{
    ReclamationProperties, ReclamationPropertyChecker, StackHistory, StackOpType, StackOperation,
    StackProperties, StackPropertyChecker,
};
pub use property::{PropertyChecker, PropertyResult};
