//! Word tokenizer
//!
//! Lowercases text, splits it into word tokens and, by default, drops
//! stopwords and tokens without a letter. Output is a json array of strings.

use std::collections::HashSet;

use regex::Regex;
use serde_json::Value;

use modelflow_values::{PipelineValue, ValueKind};

use crate::base::{validate_inputs, Pipeline};
use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::spec::PipelineSpec;
use crate::types::PipelineType;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

pub struct TokenizerPipeline {
    lowercase: bool,
    alphanum: bool,
    stopwords: HashSet<String>,
    word: Regex,
}

impl TokenizerPipeline {
    pub fn new(lowercase: bool, alphanum: bool, stopwords: HashSet<String>) -> Result<Self> {
        Ok(Self {
            lowercase,
            alphanum,
            stopwords,
            word: Regex::new(r"\w+(?:['’]\w+)*")
                .map_err(|e| PipelineError::InvalidConfiguration(e.to_string()))?,
        })
    }

    /// Parameters: `lowercase` (default true), `alphanum` (default true),
    /// `stopwords` (true for the built-in English list, false for none, or an
    /// explicit list)
    pub fn from_spec(spec: &PipelineSpec, _context: &PipelineContext) -> Result<Self> {
        let reader = spec.reader(PipelineType::Tokenizer.as_str());

        let stopwords = match reader.get("stopwords") {
            None | Some(Value::Bool(true)) => default_stopwords(),
            Some(Value::Bool(false)) => HashSet::new(),
            Some(_) => reader
                .strings("stopwords")?
                .unwrap_or_default()
                .into_iter()
                .map(|w| w.to_lowercase())
                .collect(),
        };

        Self::new(
            reader.bool("lowercase")?.unwrap_or(true),
            reader.bool("alphanum")?.unwrap_or(true),
            stopwords,
        )
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        self.word
            .find_iter(text)
            .map(|m| {
                if self.lowercase {
                    m.as_str().to_lowercase()
                } else {
                    m.as_str().to_string()
                }
            })
            .filter(|token| !self.alphanum || token.chars().any(char::is_alphabetic))
            .filter(|token| !self.stopwords.contains(&token.to_lowercase()))
            .collect()
    }
}

fn default_stopwords() -> HashSet<String> {
    STOPWORDS.iter().map(|w| w.to_string()).collect()
}

impl Pipeline for TokenizerPipeline {
    fn pipeline_type(&self) -> &str {
        PipelineType::Tokenizer.as_str()
    }

    fn input_kind(&self) -> ValueKind {
        ValueKind::Text
    }

    fn output_kind(&self) -> ValueKind {
        ValueKind::Json
    }

    fn run_batch(&self, inputs: &[PipelineValue]) -> Result<Vec<PipelineValue>> {
        validate_inputs(ValueKind::Text, inputs)?;
        Ok(inputs
            .iter()
            .map(|value| Value::from(self.tokenize(value.as_text().unwrap_or_default())).into())
            .collect())
    }
}
