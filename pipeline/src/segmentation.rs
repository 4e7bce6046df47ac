/// Text Segmentation Pipeline
///
/// Splits text into sentences, lines or paragraphs, normalizing whitespace and
/// dropping segments shorter than `minlength` characters.
///
/// Parameters:
/// - `mode`: `sentences`, `lines`, `paragraphs` or `none` (default, clean only)
/// - `minlength`: minimum segment length in characters
/// - `join`: join the kept segments back into one text with single spaces
use regex::Regex;
use serde_json::Value;

use modelflow_values::{PipelineValue, ValueKind};

use crate::base::{text_input, validate_inputs, Pipeline};
use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::spec::PipelineSpec;
use crate::types::PipelineType;

/// How text is split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SegmentationMode {
    /// No split, only whitespace cleanup
    #[default]
    None,
    Sentences,
    Lines,
    Paragraphs,
}

impl std::str::FromStr for SegmentationMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "sentences" | "sentence" => Ok(Self::Sentences),
            "lines" | "line" => Ok(Self::Lines),
            "paragraphs" | "paragraph" => Ok(Self::Paragraphs),
            other => Err(format!(
                "unknown mode '{}', expected sentences, lines, paragraphs or none",
                other
            )),
        }
    }
}

pub struct SegmentationPipeline {
    mode: SegmentationMode,
    minlength: usize,
    join: bool,
    whitespace: Regex,
    sentence_end: Regex,
    paragraph_break: Regex,
}

impl SegmentationPipeline {
    pub fn new(mode: SegmentationMode, minlength: usize, join: bool) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| PipelineError::InvalidConfiguration(e.to_string()))
        };

        Ok(Self {
            mode,
            minlength,
            join,
            whitespace: compile(r"\s+")?,
            // Terminal punctuation, optional closing quotes/brackets, then whitespace
            sentence_end: compile(r#"[.!?]+["')\]]*\s+"#)?,
            paragraph_break: compile(r"\n\s*\n")?,
        })
    }

    pub fn sentences() -> Result<Self> {
        Self::new(SegmentationMode::Sentences, 0, false)
    }

    pub fn from_spec(spec: &PipelineSpec, _context: &PipelineContext) -> Result<Self> {
        let reader = spec.reader(PipelineType::Segmentation.as_str());
        Self::new(
            reader.parse("mode")?.unwrap_or_default(),
            reader.usize("minlength")?.unwrap_or(0),
            reader.bool("join")?.unwrap_or(false),
        )
    }

    fn clean(&self, text: &str) -> String {
        self.whitespace.replace_all(text.trim(), " ").into_owned()
    }

    /// Split and clean one text
    pub fn segment(&self, text: &str) -> Vec<String> {
        let raw: Vec<&str> = match self.mode {
            SegmentationMode::None => vec![text],
            SegmentationMode::Lines => text.lines().collect(),
            SegmentationMode::Paragraphs => self.paragraph_break.split(text).collect(),
            SegmentationMode::Sentences => {
                let mut parts = Vec::new();
                let mut start = 0;
                for m in self.sentence_end.find_iter(text) {
                    parts.push(&text[start..m.end()]);
                    start = m.end();
                }
                parts.push(&text[start..]);
                parts
            }
        };

        raw.into_iter()
            .map(|segment| self.clean(segment))
            .filter(|segment| !segment.is_empty() && segment.chars().count() >= self.minlength)
            .collect()
    }
}

impl Pipeline for SegmentationPipeline {
    fn pipeline_type(&self) -> &str {
        PipelineType::Segmentation.as_str()
    }

    fn input_kind(&self) -> ValueKind {
        ValueKind::Text
    }

    fn output_kind(&self) -> ValueKind {
        if self.join {
            ValueKind::Text
        } else {
            ValueKind::Json
        }
    }

    fn run_batch(&self, inputs: &[PipelineValue]) -> Result<Vec<PipelineValue>> {
        validate_inputs(ValueKind::Text, inputs)?;

        inputs
            .iter()
            .enumerate()
            .map(|(index, value)| {
                let segments = self.segment(text_input(index, value)?);
                Ok(if self.join {
                    PipelineValue::Text(segments.join(" "))
                } else {
                    PipelineValue::Json(Value::from(segments))
                })
            })
            .collect()
    }
}
