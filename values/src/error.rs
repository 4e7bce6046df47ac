//! Error types for the value system.

use thiserror::Error;
use crate::types::ValueKind;

/// Result type for value operations.
pub type ValueResult<T> = Result<T, ValueError>;

/// Errors that can occur when building or converting values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    /// Type mismatch during conversion.
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: ValueKind,
        actual: ValueKind,
    },

    /// Payload does not satisfy its structural invariants.
    #[error("Invalid value: {message}")]
    InvalidValue {
        message: String,
    },

    /// Tensor data length disagrees with its shape.
    #[error("Shape mismatch: shape {shape:?} needs {expected} elements, got {actual}")]
    ShapeMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for ValueError {
    fn from(err: serde_json::Error) -> Self {
        ValueError::SerializationError(err.to_string())
    }
}
