//! Typed errors for the sparse accumulation containers.

use thiserror::Error;

/// Errors from accumulator construction and bulk operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SparseError {
    /// A requested dimension does not fit the backend's packed key.
    #[error("dimension {dim} exceeds packed-key capacity {max}")]
    DimensionTooLarge { dim: usize, max: usize },

    /// Replication targets and multipliers must pair up one-to-one.
    #[error("replication expects {expected} multipliers, got {got}")]
    LengthMismatch { expected: usize, got: usize },
}
