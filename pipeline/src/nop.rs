//! Identity pipeline

use modelflow_values::{PipelineValue, ValueKind};

use crate::base::Pipeline;
use crate::context::PipelineContext;
use crate::error::Result;
use crate::spec::PipelineSpec;
use crate::types::PipelineType;

/// Returns every input unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct NopPipeline;

impl NopPipeline {
    pub fn new() -> Self {
        Self
    }

    pub fn from_spec(_spec: &PipelineSpec, _context: &PipelineContext) -> Result<Self> {
        Ok(Self)
    }
}

impl Pipeline for NopPipeline {
    fn pipeline_type(&self) -> &str {
        PipelineType::Nop.as_str()
    }

    fn input_kind(&self) -> ValueKind {
        ValueKind::Any
    }

    fn output_kind(&self) -> ValueKind {
        ValueKind::Any
    }

    fn run_batch(&self, inputs: &[PipelineValue]) -> Result<Vec<PipelineValue>> {
        Ok(inputs.to_vec())
    }
}
