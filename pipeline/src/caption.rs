/// Image Captioning Pipeline
///
/// Image-to-text over a vision-language model (Florence2, BLIP, ...).
///
/// Handles:
/// - Image buffer validation (size matches width × height × channels)
/// - Florence2-style task tokens (`<CAPTION>`, `<DETAILED_CAPTION>`, `<OCR>`)
use serde_json::Value;

use modelflow_values::{PipelineValue, ValueKind};

use crate::base::{text_output, validate_inputs, Pipeline};
use crate::context::PipelineContext;
use crate::error::Result;
use crate::model::{model_lifecycle, ModelBackedPipeline, ModelSpec};
use crate::spec::PipelineSpec;
use crate::types::PipelineType;

pub const CAPTION_TOKEN: &str = "<CAPTION>";

/// Normalize a caption prompt so it always starts with a task token.
/// Prompts without one default to `<CAPTION>`.
pub fn preprocess_prompt(prompt: &str) -> String {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        CAPTION_TOKEN.to_string()
    } else if prompt.starts_with('<') {
        prompt.to_string()
    } else {
        format!("{} {}", CAPTION_TOKEN, prompt)
    }
}

pub struct CaptionPipeline {
    model: ModelBackedPipeline,
    prompt: String,
}

impl CaptionPipeline {
    /// Parameters: the common model parameters plus `prompt` (task token or
    /// free text, default `<CAPTION>`)
    pub fn from_spec(spec: &PipelineSpec, context: &PipelineContext) -> Result<Self> {
        let reader = spec.reader(PipelineType::Caption.as_str());
        let prompt = preprocess_prompt(reader.str("prompt")?.unwrap_or(CAPTION_TOKEN));

        let mut model_spec = ModelSpec::from_params(&reader)?;
        model_spec
            .options
            .insert("prompt".to_string(), Value::from(prompt.clone()));

        Ok(Self {
            model: ModelBackedPipeline::construct(model_spec, PipelineType::Caption.to_hf_tag(), context)?,
            prompt,
        })
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }
}

impl Pipeline for CaptionPipeline {
    fn pipeline_type(&self) -> &str {
        PipelineType::Caption.as_str()
    }

    fn input_kind(&self) -> ValueKind {
        ValueKind::Image
    }

    fn output_kind(&self) -> ValueKind {
        ValueKind::Text
    }

    fn run_batch(&self, inputs: &[PipelineValue]) -> Result<Vec<PipelineValue>> {
        validate_inputs(ValueKind::Image, inputs)?;

        self.model
            .infer(inputs)?
            .into_iter()
            .enumerate()
            .map(|(index, output)| Ok(PipelineValue::Text(text_output(index, output)?.trim().to_string())))
            .collect()
    }

    model_lifecycle!(model);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_prompt() {
        assert_eq!(preprocess_prompt(""), "<CAPTION>");
        assert_eq!(preprocess_prompt("<OCR>"), "<OCR>");
        assert_eq!(preprocess_prompt("a dog"), "<CAPTION> a dog");
    }
}
