//! Invariant traits for the hazard-pointer stack.
//!
//! - `stack`: element conservation and LIFO replay
//! - `reclamation`: deferred-reclamation safety and bounded growth

pub mod reclamation;
pub mod stack;

pub use reclamation::{ReclamationProperties, ReclamationPropertyChecker};
pub use stack::{StackHistory, StackOpType, StackOperation, StackProperties, StackPropertyChecker};
