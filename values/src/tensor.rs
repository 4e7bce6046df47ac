//! Dense f32 tensor payload.

use serde::{Deserialize, Serialize};

use crate::error::{ValueError, ValueResult};

/// Row-major f32 tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl Tensor {
    /// Create a tensor, checking that `data` fills `shape` exactly.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> ValueResult<Self> {
        let tensor = Self { shape, data };
        tensor.validate()?;
        Ok(tensor)
    }

    /// One-dimensional tensor over `data`.
    pub fn vector(data: Vec<f32>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Number of elements implied by the shape (1 for a rank-0 scalar).
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn validate(&self) -> ValueResult<()> {
        let expected = self.numel();
        if expected != self.data.len() {
            return Err(ValueError::ShapeMismatch {
                shape: self.shape.clone(),
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }
}
