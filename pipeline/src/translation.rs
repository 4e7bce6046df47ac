//! Machine translation
//!
//! Translates text into `target` (default `en`). When `source` is given and
//! equals `target`, texts pass through without touching the model.

use regex::Regex;
use serde_json::json;

use modelflow_values::{PipelineValue, ValueKind};

use crate::base::{text_input, text_output, validate_inputs, Pipeline};
use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::model::{model_lifecycle, ModelBackedPipeline, ModelSpec};
use crate::spec::{ParamReader, PipelineSpec};
use crate::types::PipelineType;

pub const DEFAULT_TARGET: &str = "en";

pub struct TranslationPipeline {
    model: ModelBackedPipeline,
    target: String,
    source: Option<String>,
}

fn language(reader: &ParamReader<'_>, pattern: &Regex, key: &str) -> Result<Option<String>> {
    match reader.str(key)? {
        None => Ok(None),
        Some(code) if pattern.is_match(code.trim()) => Ok(Some(code.trim().to_lowercase())),
        Some(code) => Err(reader.error(key, format!("'{}' is not a language code", code))),
    }
}

impl TranslationPipeline {
    pub fn from_spec(spec: &PipelineSpec, context: &PipelineContext) -> Result<Self> {
        let reader = spec.reader(PipelineType::Translation.as_str());
        let pattern = Regex::new(r"^[A-Za-z]{2,3}(?:[-_][A-Za-z0-9]{2,8})*$")
            .map_err(|e| PipelineError::InvalidConfiguration(e.to_string()))?;

        let target = language(&reader, &pattern, "target")?.unwrap_or_else(|| DEFAULT_TARGET.to_string());
        let source = language(&reader, &pattern, "source")?;

        Ok(Self {
            model: ModelBackedPipeline::construct(
                ModelSpec::from_params(&reader)?,
                PipelineType::Translation.to_hf_tag(),
                context,
            )?,
            target,
            source,
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    fn is_passthrough(&self) -> bool {
        self.source.as_deref() == Some(self.target.as_str())
    }
}

impl Pipeline for TranslationPipeline {
    fn pipeline_type(&self) -> &str {
        PipelineType::Translation.as_str()
    }

    fn input_kind(&self) -> ValueKind {
        ValueKind::Text
    }

    fn output_kind(&self) -> ValueKind {
        ValueKind::Text
    }

    fn run_batch(&self, inputs: &[PipelineValue]) -> Result<Vec<PipelineValue>> {
        validate_inputs(ValueKind::Text, inputs)?;

        let texts = inputs
            .iter()
            .enumerate()
            .map(|(index, value)| text_input(index, value))
            .collect::<Result<Vec<_>>>()?;

        if self.is_passthrough() {
            log::debug!("Source language is already {}, skipping translation", self.target);
            return Ok(texts.into_iter().map(|t| PipelineValue::Text(t.to_string())).collect());
        }

        let requests: Vec<PipelineValue> = texts
            .into_iter()
            .map(|text| {
                PipelineValue::Json(json!({
                    "text": text,
                    "source": self.source,
                    "target": self.target,
                }))
            })
            .collect();

        self.model
            .infer(&requests)?
            .into_iter()
            .enumerate()
            .map(|(index, output)| Ok(PipelineValue::Text(text_output(index, output)?.trim().to_string())))
            .collect()
    }

    model_lifecycle!(model);
}
