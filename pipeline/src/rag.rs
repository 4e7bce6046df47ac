//! Retrieval-augmented generation
//!
//! For each question: search the retriever, keep hits scoring at least
//! `minscore` in the retriever's order, place the first `context` of them in
//! the prompt template and generate an answer. Output per question:
//!
//! ```json
//! {"answer": "...", "citations": ["doc-3", "doc-7"]}
//! ```
//!
//! `citations` lists exactly the passages that were placed in the prompt, in
//! prompt order. A question with no usable hits is still answered, with an
//! empty context.

use std::sync::Arc;

use regex::{Captures, Regex};
use serde_json::{json, Value};

use modelflow_values::{PipelineValue, ValueKind};

use crate::backend::{Passage, Retriever};
use crate::base::Pipeline;
use crate::context::{PipelineContext, DEFAULT_RETRIEVER};
use crate::error::{PipelineError, Result};
use crate::model::{model_lifecycle, ModelBackedPipeline, ModelSpec};
use crate::spec::PipelineSpec;
use crate::text_generation::{GenerationConfig, TextGenerationPipeline};
use crate::types::PipelineType;

pub const DEFAULT_TEMPLATE: &str = "Answer the following question using only the context below. \
Say you don't know if the context does not contain the answer.\n\n\
Question:\n{question}\n\nContext:\n{context}";

pub const DEFAULT_TOP_K: usize = 3;

pub struct RagPipeline {
    generator: TextGenerationPipeline,
    retriever: Arc<dyn Retriever>,
    template: String,
    placeholder: Regex,
    top_k: usize,
    minscore: f32,
    context_limit: usize,
    separator: String,
}

impl RagPipeline {
    /// Parameters: the common model and generation parameters plus
    /// `retriever` (context retriever name), `template`, `top_k`, `minscore`,
    /// `context` (max passages in the prompt, default `top_k`), `separator`
    pub fn from_spec(spec: &PipelineSpec, context: &PipelineContext) -> Result<Self> {
        let reader = spec.reader(PipelineType::Rag.as_str());

        let retriever_name = reader.str("retriever")?.unwrap_or(DEFAULT_RETRIEVER);
        let retriever = context.retriever(retriever_name).cloned().ok_or_else(|| {
            PipelineError::InvalidConfiguration(format!(
                "rag pipeline needs a retriever named '{}'",
                retriever_name
            ))
        })?;

        let template = reader.str("template")?.unwrap_or(DEFAULT_TEMPLATE).to_string();
        for placeholder in ["{question}", "{context}"] {
            if !template.contains(placeholder) {
                return Err(reader.error("template", format!("must contain {}", placeholder)));
            }
        }

        let top_k = reader.positive("top_k")?.unwrap_or(DEFAULT_TOP_K);
        let minscore = reader.f64("minscore")?.unwrap_or(0.0) as f32;
        let context_limit = reader.positive("context")?.unwrap_or(top_k);
        let separator = reader.str("separator")?.unwrap_or("\n").to_string();

        let generator = TextGenerationPipeline::new(
            ModelBackedPipeline::construct(
                ModelSpec::from_params(&reader)?,
                PipelineType::Rag.to_hf_tag(),
                context,
            )?,
            GenerationConfig::from_params(&reader)?,
            reader.str("system")?.map(str::to_string),
            None,
        );

        Ok(Self {
            generator,
            retriever,
            template,
            placeholder: Regex::new(r"\{(question|context)\}")
                .map_err(|e| PipelineError::InvalidConfiguration(e.to_string()))?,
            top_k,
            minscore,
            context_limit,
            separator,
        })
    }

    /// Fill the template in one pass so placeholders inside the question or
    /// passages are left alone
    pub fn render(&self, question: &str, context: &str) -> String {
        self.placeholder
            .replace_all(&self.template, |caps: &Captures| match &caps[1] {
                "question" => question.to_string(),
                _ => context.to_string(),
            })
            .into_owned()
    }

    /// Passages that go into the prompt for `question`
    pub fn select(&self, question: &str) -> std::result::Result<Vec<Passage>, String> {
        let hits = self
            .retriever
            .search(question, self.top_k)
            .map_err(|e| e.to_string())?;
        Ok(hits
            .into_iter()
            .filter(|p| p.score >= self.minscore)
            .take(self.context_limit)
            .collect())
    }
}

fn question_of(index: usize, value: &PipelineValue) -> Result<&str> {
    let question = match value {
        PipelineValue::Text(text) => Some(text.as_str()),
        PipelineValue::Json(Value::Object(map)) => map
            .get("query")
            .or_else(|| map.get("question"))
            .and_then(Value::as_str),
        other => {
            return Err(PipelineError::validation(
                index,
                format!("expected text question, got {}", other.kind()),
            ))
        }
    };
    match question {
        Some(q) if !q.trim().is_empty() => Ok(q),
        _ => Err(PipelineError::validation(index, "question must not be empty")),
    }
}

impl Pipeline for RagPipeline {
    fn pipeline_type(&self) -> &str {
        PipelineType::Rag.as_str()
    }

    fn input_kind(&self) -> ValueKind {
        ValueKind::Text
    }

    fn output_kind(&self) -> ValueKind {
        ValueKind::Json
    }

    fn run_batch(&self, inputs: &[PipelineValue]) -> Result<Vec<PipelineValue>> {
        let mut prompts = Vec::with_capacity(inputs.len());
        let mut citations = Vec::with_capacity(inputs.len());

        for (index, value) in inputs.iter().enumerate() {
            let question = question_of(index, value)?;
            let passages = self
                .select(question)
                .map_err(|message| PipelineError::inference(index, format!("retrieval failed: {}", message)))?;

            let context = passages
                .iter()
                .map(|p| p.text.as_str())
                .collect::<Vec<_>>()
                .join(&self.separator);
            log::debug!("Question {} uses {} passage(s)", index, passages.len());

            prompts.push(self.render(question, &context));
            citations.push(passages.into_iter().map(|p| p.id).collect::<Vec<_>>());
        }

        let answers = self.generator.generate(&prompts)?;
        Ok(answers
            .into_iter()
            .zip(citations)
            .map(|(answer, ids)| PipelineValue::Json(json!({ "answer": answer, "citations": ids })))
            .collect())
    }

    model_lifecycle!(generator);
}
