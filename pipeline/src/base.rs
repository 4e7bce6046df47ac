/// Base pipeline trait
///
/// Every processing unit, model-backed or not, implements [`Pipeline`]. Callers
/// only ever see `Arc<dyn Pipeline>` and drive it through [`Invocation`]s.
use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use modelflow_values::{PipelineValue, ValueKind};

use crate::error::{PipelineError, Result};

/// A single input or an ordered batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Invocation {
    One(PipelineValue),
    Many(Vec<PipelineValue>),
}

impl Invocation {
    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, Self::Many(_))
    }

    pub fn into_vec(self) -> Vec<PipelineValue> {
        match self {
            Self::One(value) => vec![value],
            Self::Many(values) => values,
        }
    }
}

impl From<PipelineValue> for Invocation {
    fn from(value: PipelineValue) -> Self {
        Self::One(value)
    }
}

impl From<Vec<PipelineValue>> for Invocation {
    fn from(values: Vec<PipelineValue>) -> Self {
        Self::Many(values)
    }
}

/// Base trait that all pipelines must implement
pub trait Pipeline: Send + Sync {
    /// Registry identifier of the variant
    fn pipeline_type(&self) -> &str;

    /// Kind of value accepted per input
    fn input_kind(&self) -> ValueKind;

    /// Kind of value produced per output
    fn output_kind(&self) -> ValueKind;

    /// Process a non-empty batch. Must return one output per input, in order.
    /// Implementations borrow their inputs and never mutate them.
    fn run_batch(&self, inputs: &[PipelineValue]) -> Result<Vec<PipelineValue>>;

    /// Apply the pipeline to one input or a batch.
    ///
    /// `One` yields `One`, `Many` yields `Many` of the same length and order.
    /// An empty batch returns immediately without running anything.
    fn invoke(&self, input: Invocation) -> Result<Invocation> {
        match input {
            Invocation::One(value) => {
                let mut outputs = run_aligned(self, std::slice::from_ref(&value))?;
                match outputs.pop() {
                    Some(output) => Ok(Invocation::One(output)),
                    None => Err(PipelineError::inference(0, "pipeline returned no output")),
                }
            }
            Invocation::Many(values) if values.is_empty() => Ok(Invocation::Many(Vec::new())),
            Invocation::Many(values) => run_aligned(self, &values).map(Invocation::Many),
        }
    }

    fn invoke_one(&self, input: PipelineValue) -> Result<PipelineValue> {
        match self.invoke(Invocation::One(input))? {
            Invocation::One(output) => Ok(output),
            Invocation::Many(_) => Err(PipelineError::inference(0, "expected a single output")),
        }
    }

    fn invoke_many(&self, inputs: Vec<PipelineValue>) -> Result<Vec<PipelineValue>> {
        Ok(self.invoke(Invocation::Many(inputs))?.into_vec())
    }

    /// Check if the backing model is loaded. Model-free pipelines are always loaded.
    fn is_loaded(&self) -> bool {
        true
    }

    /// Load the backing model now instead of on first use
    fn load(&self) -> Result<()> {
        Ok(())
    }

    /// Unload the backing model to free resources
    fn unload(&self) -> Result<()> {
        Ok(())
    }

    /// False once the instance has hit a terminal failure and must be rebuilt
    fn is_usable(&self) -> bool {
        true
    }
}

impl<'a> dyn Pipeline + 'a {
    /// Lazily process `inputs` in chunks of `chunk_size`, yielding outputs in
    /// input order. The stream ends after the first error.
    pub fn stream(&self, inputs: Vec<PipelineValue>, chunk_size: usize) -> PipelineStream<'_> {
        PipelineStream {
            pipeline: self,
            inputs,
            position: 0,
            chunk_size: chunk_size.max(1),
            ready: VecDeque::new(),
            failed: false,
        }
    }
}

/// Iterator returned by [`Pipeline::stream`](trait.Pipeline.html#method.stream)
pub struct PipelineStream<'a> {
    pipeline: &'a dyn Pipeline,
    inputs: Vec<PipelineValue>,
    position: usize,
    chunk_size: usize,
    ready: VecDeque<PipelineValue>,
    failed: bool,
}

impl<'a> Iterator for PipelineStream<'a> {
    type Item = Result<PipelineValue>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(output) = self.ready.pop_front() {
            return Some(Ok(output));
        }
        if self.failed || self.position >= self.inputs.len() {
            return None;
        }

        let start = self.position;
        let end = (start + self.chunk_size).min(self.inputs.len());
        self.position = end;

        match run_aligned(self.pipeline, &self.inputs[start..end]) {
            Ok(outputs) => {
                self.ready.extend(outputs);
                self.ready.pop_front().map(Ok)
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e.offset(start)))
            }
        }
    }
}

/// Run `inputs` and reject output counts that do not match
pub(crate) fn run_aligned<P: Pipeline + ?Sized>(
    pipeline: &P,
    inputs: &[PipelineValue],
) -> Result<Vec<PipelineValue>> {
    let outputs = pipeline.run_batch(inputs)?;
    if outputs.len() != inputs.len() {
        return Err(PipelineError::Inference {
            index: None,
            message: format!(
                "pipeline '{}' returned {} outputs for {} inputs",
                pipeline.pipeline_type(),
                outputs.len(),
                inputs.len()
            ),
        });
    }
    Ok(outputs)
}

/// Check every input against `kind` and its own structural invariants,
/// reporting the first failing batch index.
pub fn validate_inputs(kind: ValueKind, inputs: &[PipelineValue]) -> Result<()> {
    for (index, value) in inputs.iter().enumerate() {
        if !kind.accepts(value) {
            return Err(PipelineError::validation(
                index,
                format!("expected {} input, got {}", kind, value.kind()),
            ));
        }
        value
            .validate()
            .map_err(|e| PipelineError::validation(index, e.to_string()))?;
    }
    Ok(())
}

/// Borrow a non-blank text input
pub fn text_input(index: usize, value: &PipelineValue) -> Result<&str> {
    match value.as_text() {
        Some(text) if !text.trim().is_empty() => Ok(text),
        Some(_) => Err(PipelineError::validation(index, "text must not be empty")),
        None => Err(PipelineError::validation(
            index,
            format!("expected text input, got {}", value.kind()),
        )),
    }
}

/// Read a text output from a model, accepting `{"text": ...}` objects as well
pub fn text_output(index: usize, value: PipelineValue) -> Result<String> {
    match value {
        PipelineValue::Text(text) => Ok(text),
        PipelineValue::Json(json) => json
            .get("text")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| PipelineError::inference(index, "model output has no text field")),
        other => Err(PipelineError::inference(
            index,
            format!("expected text output from model, got {}", other.kind()),
        )),
    }
}
