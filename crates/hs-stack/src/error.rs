//! Error types for the stack and its reclamation domain.

use thiserror::Error;

/// Result type for fallible stack operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// Every hazard slot in the domain is owned by a live thread.
    ///
    /// The table is sized for the maximum number of threads popping at
    /// once; retrying cannot help, so callers should treat this as a
    /// deployment sizing error.
    #[error("all {capacity} hazard pointer slots are claimed")]
    SlotsExhausted { capacity: usize },

    /// The calling thread already holds a live guard on its slot in this
    /// domain. A second guard would overwrite the first one's hazard.
    #[error("this thread's hazard slot is held by a live guard")]
    SlotInUse,

    /// A domain configuration value is out of range.
    #[error("invalid value for {key}: {reason}")]
    InvalidConfig {
        key: &'static str,
        reason: &'static str,
    },
}
