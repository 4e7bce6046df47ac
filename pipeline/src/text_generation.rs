/// Text Generation Pipeline
///
/// Prompt-to-text over an LLM (Llama, Mistral, Qwen, Phi, ...).
///
/// The model receives one json request per prompt:
/// `{"prompt": ..., "system": ..., "config": GenerationConfig}` and answers
/// with text (or `{"text": ...}`).
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use modelflow_values::{PipelineValue, ValueKind};

use crate::base::{text_output, Pipeline};
use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::model::{model_lifecycle, ModelBackedPipeline, ModelSpec};
use crate::spec::{ParamReader, PipelineSpec};
use crate::types::PipelineType;

/// Placeholder replaced by the input in a prompt template
pub const TEXT_PLACEHOLDER: &str = "{text}";

/// Sampling settings forwarded to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub max_new_tokens: usize,
    pub temperature: f32,
    pub top_k: usize,
    pub top_p: f32,
    pub do_sample: bool,
    pub repetition_penalty: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: 512,
            temperature: 1.0,
            top_k: 50,
            top_p: 0.9,
            do_sample: true,
            repetition_penalty: 1.1,
        }
    }
}

impl GenerationConfig {
    /// Read overrides, accepting both snake_case and camelCase keys
    pub fn from_params(reader: &ParamReader<'_>) -> Result<Self> {
        let defaults = Self::default();

        let first_usize = |keys: &[&str]| -> Result<Option<usize>> {
            for key in keys {
                if let Some(v) = reader.positive(key)? {
                    return Ok(Some(v));
                }
            }
            Ok(None)
        };
        let first_f64 = |keys: &[&str]| -> Result<Option<f64>> {
            for key in keys {
                if let Some(v) = reader.f64(key)? {
                    return Ok(Some(v));
                }
            }
            Ok(None)
        };
        let first_bool = |keys: &[&str]| -> Result<Option<bool>> {
            for key in keys {
                if let Some(v) = reader.bool(key)? {
                    return Ok(Some(v));
                }
            }
            Ok(None)
        };

        let config = Self {
            max_new_tokens: first_usize(&["max_new_tokens", "maxTokens", "max_tokens"])?
                .unwrap_or(defaults.max_new_tokens),
            temperature: first_f64(&["temperature"])?
                .map(|v| v as f32)
                .unwrap_or(defaults.temperature),
            top_k: first_usize(&["top_k", "topK"])?.unwrap_or(defaults.top_k),
            top_p: first_f64(&["top_p", "topP"])?
                .map(|v| v as f32)
                .unwrap_or(defaults.top_p),
            do_sample: first_bool(&["do_sample", "doSample"])?.unwrap_or(defaults.do_sample),
            repetition_penalty: first_f64(&["repetition_penalty", "repetitionPenalty"])?
                .map(|v| v as f32)
                .unwrap_or(defaults.repetition_penalty),
        };

        if config.temperature < 0.0 {
            return Err(reader.error("temperature", "must not be negative"));
        }
        if !(config.top_p > 0.0 && config.top_p <= 1.0) {
            return Err(reader.error("top_p", "must be in (0, 1]"));
        }
        if config.repetition_penalty <= 0.0 {
            return Err(reader.error("repetition_penalty", "must be positive"));
        }
        Ok(config)
    }
}

pub struct TextGenerationPipeline {
    model: ModelBackedPipeline,
    config: GenerationConfig,
    system: Option<String>,
    template: Option<String>,
}

impl TextGenerationPipeline {
    pub fn new(
        model: ModelBackedPipeline,
        config: GenerationConfig,
        system: Option<String>,
        template: Option<String>,
    ) -> Self {
        Self {
            model,
            config,
            system,
            template,
        }
    }

    /// Parameters: the common model parameters, the `GenerationConfig` keys,
    /// `system` (system prompt) and `template` (must contain `{text}`)
    pub fn from_spec(spec: &PipelineSpec, context: &PipelineContext) -> Result<Self> {
        let reader = spec.reader(PipelineType::TextGeneration.as_str());

        let template = reader.str("template")?.map(str::to_string);
        if let Some(template) = &template {
            if !template.contains(TEXT_PLACEHOLDER) {
                return Err(reader.error("template", format!("must contain {}", TEXT_PLACEHOLDER)));
            }
        }
        let config = GenerationConfig::from_params(&reader)?;
        let system = reader.str("system")?.map(str::to_string);

        let model = ModelBackedPipeline::construct(
            ModelSpec::from_params(&reader)?,
            PipelineType::TextGeneration.to_hf_tag(),
            context,
        )?;
        Ok(Self::new(model, config, system, template))
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn model(&self) -> &ModelBackedPipeline {
        &self.model
    }

    fn request(&self, prompt: &str) -> PipelineValue {
        let prompt = match &self.template {
            Some(template) => template.replace(TEXT_PLACEHOLDER, prompt),
            None => prompt.to_string(),
        };
        PipelineValue::Json(json!({
            "prompt": prompt,
            "system": self.system,
            "config": self.config,
        }))
    }

    /// Generate one completion per prompt, in order
    pub fn generate(&self, prompts: &[String]) -> Result<Vec<String>> {
        let requests: Vec<PipelineValue> = prompts.iter().map(|p| self.request(p)).collect();
        self.model
            .infer(&requests)?
            .into_iter()
            .enumerate()
            .map(|(index, output)| Ok(text_output(index, output)?.trim().to_string()))
            .collect()
    }
}

/// Prompt text from a text input or a json `{"prompt": ...}` object
fn prompt_of(index: usize, value: &PipelineValue) -> Result<String> {
    let prompt = match value {
        PipelineValue::Text(text) => Some(text.as_str()),
        PipelineValue::Json(Value::Object(map)) => map.get("prompt").and_then(Value::as_str),
        other => {
            return Err(PipelineError::validation(
                index,
                format!("expected text prompt, got {}", other.kind()),
            ))
        }
    };
    match prompt {
        Some(p) if !p.trim().is_empty() => Ok(p.to_string()),
        _ => Err(PipelineError::validation(index, "prompt must not be empty")),
    }
}

impl Pipeline for TextGenerationPipeline {
    fn pipeline_type(&self) -> &str {
        PipelineType::TextGeneration.as_str()
    }

    fn input_kind(&self) -> ValueKind {
        ValueKind::Text
    }

    fn output_kind(&self) -> ValueKind {
        ValueKind::Text
    }

    fn run_batch(&self, inputs: &[PipelineValue]) -> Result<Vec<PipelineValue>> {
        let prompts = inputs
            .iter()
            .enumerate()
            .map(|(index, value)| prompt_of(index, value))
            .collect::<Result<Vec<_>>>()?;

        Ok(self
            .generate(&prompts)?
            .into_iter()
            .map(PipelineValue::Text)
            .collect())
    }

    model_lifecycle!(model);
}
