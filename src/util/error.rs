//! Error types for dlprims.

use thiserror::Error;

/// Result alias for dlprims operations.
pub type DlResult<T> = std::result::Result<T, DlError>;

/// Errors that can occur when evaluating dlprims primitives.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum DlError {
    /// The input data or parameters are invalid.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// An array does not have the shape the operation requires.
    #[error("shape mismatch for {context}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    /// A threshold is non-finite or outside its valid range.
    #[error("invalid threshold {name}: {value}")]
    InvalidThreshold { name: &'static str, value: f64 },
    /// Stride, window, or padding settings produce no valid output.
    #[error("invalid hyperparameters: {reason}")]
    InvalidHyperParams { reason: &'static str },
    /// The requested identity is not in the face database.
    #[error("unknown identity: {0}")]
    UnknownIdentity(String),
}

impl DlError {
    pub(crate) fn shape(context: &'static str, expected: &[usize], got: &[usize]) -> Self {
        DlError::ShapeMismatch {
            context,
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }
}
