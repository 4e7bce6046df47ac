//! Zero-shot text classification
//!
//! The model scores each text against the candidate `labels` and returns one
//! logit per label (as a tensor or a json array of numbers). Scores are
//! normalized with softmax, or with an independent sigmoid per label when
//! `multilabel` is set, and returned sorted from best to worst:
//!
//! ```json
//! [{"label": "positive", "score": 0.91}, {"label": "negative", "score": 0.09}]
//! ```

use std::collections::HashSet;

use serde_json::{json, Value};

use modelflow_values::{PipelineValue, ValueKind};

use crate::base::{text_input, validate_inputs, Pipeline};
use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::model::{model_lifecycle, ModelBackedPipeline, ModelSpec};
use crate::spec::PipelineSpec;
use crate::tensors::{sigmoid, softmax};
use crate::types::PipelineType;

pub struct LabelsPipeline {
    model: ModelBackedPipeline,
    labels: Vec<String>,
    multilabel: bool,
}

impl LabelsPipeline {
    pub fn from_spec(spec: &PipelineSpec, context: &PipelineContext) -> Result<Self> {
        let reader = spec.reader(PipelineType::Labels.as_str());
        let labels = reader
            .strings("labels")?
            .filter(|labels| !labels.is_empty())
            .ok_or_else(|| reader.error("labels", "at least one label is required"))?;

        let mut seen = HashSet::new();
        if let Some(duplicate) = labels.iter().find(|label| !seen.insert(label.as_str())) {
            return Err(reader.error("labels", format!("duplicate label '{}'", duplicate)));
        }

        Ok(Self {
            model: ModelBackedPipeline::construct(
                ModelSpec::from_params(&reader)?,
                PipelineType::Labels.to_hf_tag(),
                context,
            )?,
            labels,
            multilabel: reader.bool("multilabel")?.unwrap_or(false),
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    fn logits(&self, index: usize, output: PipelineValue) -> Result<Vec<f32>> {
        let logits: Vec<f32> = match output {
            PipelineValue::Tensor(tensor) => tensor.data,
            PipelineValue::Json(Value::Array(items)) => items
                .iter()
                .map(|item| item.as_f64().map(|v| v as f32))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| PipelineError::inference(index, "model returned non-numeric scores"))?,
            other => {
                return Err(PipelineError::inference(
                    index,
                    format!("expected label scores from model, got {}", other.kind()),
                ))
            }
        };

        if logits.len() != self.labels.len() {
            return Err(PipelineError::inference(
                index,
                format!("model returned {} scores for {} labels", logits.len(), self.labels.len()),
            ));
        }
        if logits.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::inference(index, "model returned non-finite scores"));
        }
        Ok(logits)
    }

    /// Normalize logits and pair them with labels, best first. Ties keep label order.
    pub fn rank(&self, mut logits: Vec<f32>) -> Vec<(String, f32)> {
        if self.multilabel {
            logits.iter_mut().for_each(|v| *v = sigmoid(*v));
        } else {
            softmax(&mut logits);
        }

        let mut ranked: Vec<(String, f32)> = self.labels.iter().cloned().zip(logits).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }
}

impl Pipeline for LabelsPipeline {
    fn pipeline_type(&self) -> &str {
        PipelineType::Labels.as_str()
    }

    fn input_kind(&self) -> ValueKind {
        ValueKind::Text
    }

    fn output_kind(&self) -> ValueKind {
        ValueKind::Json
    }

    fn run_batch(&self, inputs: &[PipelineValue]) -> Result<Vec<PipelineValue>> {
        validate_inputs(ValueKind::Text, inputs)?;

        let requests = inputs
            .iter()
            .enumerate()
            .map(|(index, value)| {
                Ok(PipelineValue::Json(json!({
                    "text": text_input(index, value)?,
                    "labels": self.labels,
                })))
            })
            .collect::<Result<Vec<_>>>()?;

        self.model
            .infer(&requests)?
            .into_iter()
            .enumerate()
            .map(|(index, output)| {
                let ranked = self.rank(self.logits(index, output)?);
                Ok(PipelineValue::Json(Value::Array(
                    ranked
                        .into_iter()
                        .map(|(label, score)| json!({ "label": label, "score": score }))
                        .collect(),
                )))
            })
            .collect()
    }

    model_lifecycle!(model);
}
