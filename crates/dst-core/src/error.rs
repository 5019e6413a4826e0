//! Unified error types for the DST ecosystem
//!
//! This module provides a common error type [`DstError`] that can represent
//! errors from any part of the system. Domain-specific error types can be
//! converted to `DstError` for uniform error handling at API boundaries.
//!
//! # Example
//!
//! ```ignore
//! use dst_core::{DstError, DstResult};
//!
//! fn assemble_jacobian(root: &mut Component) -> DstResult<()> {
//!     let sd = build_state_data()?;
//!     root.jacobian_elements(&sd, &mut accumulator, &mode)?;
//!     Ok(())
//! }
//! ```

use crate::component::ComponentError;
use crate::locations::LocationError;
use crate::model::RegistryError;
use dst_sparse::SparseError;
use thiserror::Error;

/// Unified error type for all DST operations.
///
/// This enum provides a common error representation for the DST ecosystem,
/// allowing errors from tree edits, view resolution, model lookup, and
/// sparse storage to be handled uniformly.
#[derive(Error, Debug)]
pub enum DstError {
    /// Component tree structure errors
    #[error("Structure error: {0}")]
    Structure(#[from] ComponentError),

    /// Solver mode errors (unknown or inconsistent mode requests)
    #[error("Mode error: {0}")]
    Mode(String),

    /// State buffer resolution errors
    #[error("Location error: {0}")]
    Location(#[from] LocationError),

    /// Model registry errors
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Sparse accumulator errors
    #[error("Sparse error: {0}")]
    Sparse(#[from] SparseError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using DstError.
pub type DstResult<T> = Result<T, DstError>;

// Conversion from anyhow::Error
impl From<anyhow::Error> for DstError {
    fn from(err: anyhow::Error) -> Self {
        DstError::Other(err.to_string())
    }
}

// Conversion from string-like types for convenience
impl From<String> for DstError {
    fn from(s: String) -> Self {
        DstError::Other(s)
    }
}

impl From<&str> for DstError {
    fn from(s: &str) -> Self {
        DstError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DstError::Mode("no offset slot for mode".into());
        assert!(err.to_string().contains("Mode error"));
        assert!(err.to_string().contains("no offset slot"));
    }

    #[test]
    fn test_structure_error_conversion() {
        let structure_err = ComponentError::DuplicateName("bus1".into());
        let dst_err: DstError = structure_err.into();
        assert!(matches!(dst_err, DstError::Structure(_)));
    }

    #[test]
    fn test_location_error_conversion() {
        let loc_err = LocationError::MissingBuffer("dstate_dt");
        let dst_err: DstError = loc_err.into();
        assert!(dst_err.to_string().contains("dstate_dt"));
    }

    #[test]
    fn test_result_type_alias() {
        fn example_fn() -> DstResult<i32> {
            Ok(42)
        }
        assert_eq!(example_fn().unwrap(), 42);
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> DstResult<()> {
            Err(DstError::Config("test".into()))
        }

        fn outer() -> DstResult<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }
}
