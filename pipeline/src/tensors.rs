//! Tensor post-processing
//!
//! Model-free transforms over the last axis of a tensor, the usual last step
//! after a classifier or embedding model:
//! `softmax`, `sigmoid`, `l2-normalize` and `argmax` (returns a tensor of
//! indices with the last axis removed).

use ndarray::{ArrayD, ArrayViewMut, ArrayViewMut1, Axis, Dimension, IxDyn};

use modelflow_values::{PipelineValue, Tensor, ValueKind};

use crate::base::{validate_inputs, Pipeline};
use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::spec::PipelineSpec;
use crate::types::PipelineType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorOp {
    Softmax,
    Sigmoid,
    L2Normalize,
    Argmax,
}

impl std::str::FromStr for TensorOp {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "softmax" => Ok(Self::Softmax),
            "sigmoid" => Ok(Self::Sigmoid),
            "l2-normalize" | "normalize" | "l2" => Ok(Self::L2Normalize),
            "argmax" => Ok(Self::Argmax),
            other => Err(format!("unknown tensor op '{}'", other)),
        }
    }
}

pub struct TensorsPipeline {
    op: TensorOp,
}

impl TensorsPipeline {
    pub fn new(op: TensorOp) -> Self {
        Self { op }
    }

    pub fn from_spec(spec: &PipelineSpec, _context: &PipelineContext) -> Result<Self> {
        let reader = spec.reader(PipelineType::Tensors.as_str());
        let op = reader
            .parse("op")?
            .ok_or_else(|| reader.error("op", "is required"))?;
        Ok(Self::new(op))
    }

    pub fn op(&self) -> TensorOp {
        self.op
    }

    /// Apply the op to one tensor
    pub fn apply(&self, tensor: &Tensor) -> std::result::Result<Tensor, String> {
        if tensor.shape.is_empty() {
            return Err("tensor must have at least one axis".to_string());
        }
        if tensor.shape.last() == Some(&0) {
            return Err("last axis must not be empty".to_string());
        }

        let mut array = ArrayD::from_shape_vec(IxDyn(&tensor.shape), tensor.data.clone())
            .map_err(|e| e.to_string())?;
        let axis = Axis(array.ndim() - 1);

        match self.op {
            TensorOp::Softmax => array.lanes_mut(axis).into_iter().for_each(softmax_lane),
            TensorOp::Sigmoid => array.mapv_inplace(sigmoid),
            TensorOp::L2Normalize => array.lanes_mut(axis).into_iter().for_each(|mut lane| {
                let norm = lane.iter().map(|v| v * v).sum::<f32>().sqrt();
                if norm > 0.0 {
                    lane.mapv_inplace(|v| v / norm);
                }
            }),
            TensorOp::Argmax => {
                let indices: Vec<f32> = array
                    .lanes(axis)
                    .into_iter()
                    .map(|lane| argmax(lane.iter().copied()) as f32)
                    .collect();
                let shape = tensor.shape[..tensor.shape.len() - 1].to_vec();
                return Tensor::new(shape, indices).map_err(|e| e.to_string());
            }
        }

        Tensor::new(tensor.shape.clone(), array.iter().copied().collect()).map_err(|e| e.to_string())
    }
}

fn softmax_lane<D: Dimension>(mut lane: ArrayViewMut<'_, f32, D>) {
    let max = lane.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
    lane.mapv_inplace(|v| (v - max).exp());
    let sum = lane.sum();
    if sum > 0.0 {
        lane.mapv_inplace(|v| v / sum);
    }
}

/// Numerically stable softmax over a slice
pub(crate) fn softmax(values: &mut [f32]) {
    softmax_lane(ArrayViewMut1::from(values));
}

pub(crate) fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

fn argmax(values: impl Iterator<Item = f32>) -> usize {
    let mut best = (0, f32::NEG_INFINITY);
    for (i, v) in values.enumerate() {
        if v > best.1 {
            best = (i, v);
        }
    }
    best.0
}

impl Pipeline for TensorsPipeline {
    fn pipeline_type(&self) -> &str {
        PipelineType::Tensors.as_str()
    }

    fn input_kind(&self) -> ValueKind {
        ValueKind::Tensor
    }

    fn output_kind(&self) -> ValueKind {
        ValueKind::Tensor
    }

    fn run_batch(&self, inputs: &[PipelineValue]) -> Result<Vec<PipelineValue>> {
        validate_inputs(ValueKind::Tensor, inputs)?;

        inputs
            .iter()
            .enumerate()
            .map(|(index, value)| match value {
                PipelineValue::Tensor(tensor) => self
                    .apply(tensor)
                    .map(PipelineValue::Tensor)
                    .map_err(|message| PipelineError::validation(index, message)),
                other => Err(PipelineError::validation(
                    index,
                    format!("expected tensor input, got {}", other.kind()),
                )),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: &[f32], b: &[f32]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-5)
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let t = Tensor::new(vec![2, 3], vec![1.0, 2.0, 3.0, 0.0, 0.0, 0.0]).unwrap();
        let out = TensorsPipeline::new(TensorOp::Softmax).apply(&t).unwrap();
        assert_eq!(out.shape, vec![2, 3]);
        assert!((out.data[..3].iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(close(&out.data[3..], &[1.0 / 3.0; 3]));
    }

    #[test]
    fn test_argmax_drops_last_axis() {
        let t = Tensor::new(vec![2, 3], vec![0.1, 0.7, 0.2, 0.9, 0.05, 0.05]).unwrap();
        let out = TensorsPipeline::new(TensorOp::Argmax).apply(&t).unwrap();
        assert_eq!(out.shape, vec![2]);
        assert_eq!(out.data, vec![1.0, 0.0]);
    }

    #[test]
    fn test_l2_normalize() {
        let t = Tensor::vector(vec![3.0, 4.0]);
        let out = TensorsPipeline::new(TensorOp::L2Normalize).apply(&t).unwrap();
        assert!(close(&out.data, &[0.6, 0.8]));
    }

    #[test]
    fn test_sigmoid_zero() {
        let out = TensorsPipeline::new(TensorOp::Sigmoid)
            .apply(&Tensor::vector(vec![0.0]))
            .unwrap();
        assert!(close(&out.data, &[0.5]));
    }

    #[test]
    fn test_op_required() {
        let err = TensorsPipeline::from_spec(&PipelineSpec::new("tensors"), &PipelineContext::new());
        assert!(matches!(err, Err(PipelineError::InvalidParameter { .. })));
    }

    #[test]
    fn test_wrong_kind_reports_index() {
        let pipeline = TensorsPipeline::new(TensorOp::Softmax);
        let err = pipeline
            .invoke_many(vec![Tensor::vector(vec![1.0]).into(), "text".into()])
            .unwrap_err();
        assert_eq!(err.index(), Some(1));
    }
}
