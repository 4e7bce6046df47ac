/// Speech Transcription Pipeline
///
/// Audio-to-text over a speech recognition model (Whisper, Moonshine, ...).
///
/// Handles:
/// - Audio buffer validation (rate, channels, finite samples)
/// - Down-mixing to mono and resampling to the model rate (16kHz)
/// - Language and task hints for the backend
use serde_json::Value;

use modelflow_values::{PipelineValue, ValueKind};

use crate::base::{text_output, validate_inputs, Pipeline};
use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::model::{model_lifecycle, ModelBackedPipeline, ModelSpec};
use crate::spec::PipelineSpec;
use crate::types::PipelineType;

/// Whisper expects 16kHz audio
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

pub struct TranscriptionPipeline {
    model: ModelBackedPipeline,
    sample_rate: u32,
}

impl TranscriptionPipeline {
    /// Parameters: the common model parameters plus `rate` (target sample
    /// rate, default 16000) and `language` (forwarded to the backend)
    pub fn from_spec(spec: &PipelineSpec, context: &PipelineContext) -> Result<Self> {
        let reader = spec.reader(PipelineType::Transcription.as_str());
        let sample_rate = match reader.u64("rate")? {
            None => DEFAULT_SAMPLE_RATE,
            Some(0) => return Err(reader.error("rate", "must be greater than zero")),
            Some(rate) => u32::try_from(rate).map_err(|_| reader.error("rate", "value out of range"))?,
        };

        let mut model_spec = ModelSpec::from_params(&reader)?;
        model_spec
            .options
            .entry("task".to_string())
            .or_insert_with(|| Value::from("transcribe"));
        if let Some(language) = reader.str("language")? {
            model_spec.options.insert("language".to_string(), Value::from(language));
        }

        Ok(Self {
            model: ModelBackedPipeline::construct(
                model_spec,
                PipelineType::Transcription.to_hf_tag(),
                context,
            )?,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn model(&self) -> &ModelBackedPipeline {
        &self.model
    }
}

impl Pipeline for TranscriptionPipeline {
    fn pipeline_type(&self) -> &str {
        PipelineType::Transcription.as_str()
    }

    fn input_kind(&self) -> ValueKind {
        ValueKind::Audio
    }

    fn output_kind(&self) -> ValueKind {
        ValueKind::Text
    }

    fn run_batch(&self, inputs: &[PipelineValue]) -> Result<Vec<PipelineValue>> {
        validate_inputs(ValueKind::Audio, inputs)?;

        let prepared: Vec<PipelineValue> = inputs
            .iter()
            .enumerate()
            .map(|(index, value)| match value {
                PipelineValue::Audio(audio) => Ok(PipelineValue::Audio(audio.resample(self.sample_rate))),
                other => Err(PipelineError::validation(
                    index,
                    format!("expected audio input, got {}", other.kind()),
                )),
            })
            .collect::<Result<_>>()?;

        self.model
            .infer(&prepared)?
            .into_iter()
            .enumerate()
            .map(|(index, output)| Ok(PipelineValue::Text(text_output(index, output)?.trim().to_string())))
            .collect()
    }

    model_lifecycle!(model);
}
