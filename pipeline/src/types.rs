/// Built-in pipeline types
///
/// Every variant shipped with the crate, its registry identifier, the aliases it
/// is also registered under and the HuggingFace task tag it corresponds to.
/// Custom pipelines registered at runtime are addressed by plain string
/// identifiers and never appear here.
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineType {
    /// Identity pipeline
    #[serde(rename = "nop")]
    Nop,

    /// Sentence/line/paragraph splitting
    #[serde(rename = "segmentation")]
    Segmentation,

    /// Word tokenization
    #[serde(rename = "tokenizer")]
    Tokenizer,

    /// Tensor post-processing (softmax, sigmoid, normalize, argmax)
    #[serde(rename = "tensors")]
    Tensors,

    /// Speech to text (Whisper and friends)
    #[serde(rename = "transcription")]
    Transcription,

    /// Text generation (LLMs)
    #[serde(rename = "llm")]
    TextGeneration,

    /// Retrieval-augmented generation
    #[serde(rename = "rag")]
    Rag,

    /// Image captioning (Florence2, BLIP)
    #[serde(rename = "caption")]
    Caption,

    /// Abstractive summarization
    #[serde(rename = "summary")]
    Summary,

    /// Machine translation
    #[serde(rename = "translation")]
    Translation,

    /// Zero-shot text classification
    #[serde(rename = "labels")]
    Labels,

    /// Model fine-tuning
    #[serde(rename = "trainer")]
    Trainer,
}

impl PipelineType {
    pub const ALL: [PipelineType; 12] = [
        Self::Nop,
        Self::Segmentation,
        Self::Tokenizer,
        Self::Tensors,
        Self::Transcription,
        Self::TextGeneration,
        Self::Rag,
        Self::Caption,
        Self::Summary,
        Self::Translation,
        Self::Labels,
        Self::Trainer,
    ];

    /// Registry identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nop => "nop",
            Self::Segmentation => "segmentation",
            Self::Tokenizer => "tokenizer",
            Self::Tensors => "tensors",
            Self::Transcription => "transcription",
            Self::TextGeneration => "llm",
            Self::Rag => "rag",
            Self::Caption => "caption",
            Self::Summary => "summary",
            Self::Translation => "translation",
            Self::Labels => "labels",
            Self::Trainer => "trainer",
        }
    }

    /// Additional identifiers the type is registered under
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::Transcription => &["automatic-speech-recognition"],
            Self::TextGeneration => &["text-generation", "generator"],
            Self::Rag => &["extractor"],
            Self::Caption => &["image-to-text"],
            Self::Summary => &["summarization"],
            Self::Labels => &["zero-shot-classification"],
            _ => &[],
        }
    }

    /// Convert to HuggingFace pipeline_tag string, passed to model backends
    /// as the task hint
    pub fn to_hf_tag(&self) -> Option<&'static str> {
        match self {
            Self::Transcription => Some("automatic-speech-recognition"),
            Self::TextGeneration | Self::Rag => Some("text-generation"),
            Self::Caption => Some("image-to-text"),
            Self::Summary => Some("summarization"),
            Self::Translation => Some("translation"),
            Self::Labels => Some("zero-shot-classification"),
            Self::Trainer => Some("fine-tuning"),
            Self::Nop | Self::Segmentation | Self::Tokenizer | Self::Tensors => None,
        }
    }

    /// Parse an identifier or alias
    pub fn from_identifier(identifier: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == identifier || t.aliases().contains(&identifier))
    }

    /// Returns true if constructing this type needs a model or training backend
    pub fn requires_model(&self) -> bool {
        !matches!(
            self,
            Self::Nop | Self::Segmentation | Self::Tokenizer | Self::Tensors
        )
    }
}

impl fmt::Display for PipelineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
