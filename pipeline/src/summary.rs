//! Abstractive summarization
//!
//! Collapses whitespace, then asks the model for a summary between
//! `minlength` and `maxlength` tokens.

use regex::Regex;
use serde_json::json;

use modelflow_values::{PipelineValue, ValueKind};

use crate::base::{text_input, text_output, validate_inputs, Pipeline};
use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::model::{model_lifecycle, ModelBackedPipeline, ModelSpec};
use crate::spec::PipelineSpec;
use crate::types::PipelineType;

pub struct SummaryPipeline {
    model: ModelBackedPipeline,
    minlength: Option<usize>,
    maxlength: Option<usize>,
    whitespace: Regex,
}

impl SummaryPipeline {
    pub fn from_spec(spec: &PipelineSpec, context: &PipelineContext) -> Result<Self> {
        let reader = spec.reader(PipelineType::Summary.as_str());
        let minlength = reader.usize("minlength")?;
        let maxlength = reader.positive("maxlength")?;
        if let (Some(min), Some(max)) = (minlength, maxlength) {
            if min > max {
                return Err(reader.error(
                    "minlength",
                    format!("{} is greater than maxlength {}", min, max),
                ));
            }
        }

        Ok(Self {
            model: ModelBackedPipeline::construct(
                ModelSpec::from_params(&reader)?,
                PipelineType::Summary.to_hf_tag(),
                context,
            )?,
            minlength,
            maxlength,
            whitespace: Regex::new(r"\s+").map_err(|e| PipelineError::InvalidConfiguration(e.to_string()))?,
        })
    }

    fn clean(&self, text: &str) -> String {
        self.whitespace.replace_all(text.trim(), " ").into_owned()
    }
}

impl Pipeline for SummaryPipeline {
    fn pipeline_type(&self) -> &str {
        PipelineType::Summary.as_str()
    }

    fn input_kind(&self) -> ValueKind {
        ValueKind::Text
    }

    fn output_kind(&self) -> ValueKind {
        ValueKind::Text
    }

    fn run_batch(&self, inputs: &[PipelineValue]) -> Result<Vec<PipelineValue>> {
        validate_inputs(ValueKind::Text, inputs)?;

        let requests = inputs
            .iter()
            .enumerate()
            .map(|(index, value)| {
                let text = self.clean(text_input(index, value)?);
                Ok(PipelineValue::Json(json!({
                    "text": text,
                    "min_length": self.minlength,
                    "max_length": self.maxlength,
                })))
            })
            .collect::<Result<Vec<_>>>()?;

        self.model
            .infer(&requests)?
            .into_iter()
            .enumerate()
            .map(|(index, output)| Ok(PipelineValue::Text(text_output(index, output)?.trim().to_string())))
            .collect()
    }

    model_lifecycle!(model);
}
