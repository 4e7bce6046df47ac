//! # ModelFlow Values
//!
//! Value system shared by every pipeline variant.
//!
//! A pipeline documents one input kind and one output kind. Inputs and outputs
//! travel as [`PipelineValue`], a closed set of payloads:
//!
//! ```text
//! PipelineValue
//!    ├── Text    (prompts, transcripts, captions)
//!    ├── Audio   (interleaved f32 samples + sample rate)
//!    ├── Image   (packed u8 pixels, HWC layout)
//!    ├── Tensor  (f32 data + shape)
//!    └── Json    (structured results: labels, citations, reports)
//! ```
//!
//! ## Usage Example
//!
//! ```rust
//! use modelflow_values::{PipelineValue, ValueKind};
//!
//! let value = PipelineValue::from("Hello!");
//! assert_eq!(value.kind(), ValueKind::Text);
//! assert_eq!(value.as_text(), Some("Hello!"));
//! ```

pub mod error;
pub mod media;
pub mod tensor;
pub mod types;

pub use error::{ValueError, ValueResult};
pub use media::{AudioBuffer, ImageBuffer};
pub use tensor::Tensor;
pub use types::ValueKind;

use serde::{Deserialize, Serialize};

/// A single pipeline input or output item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PipelineValue {
    Text(String),
    Audio(AudioBuffer),
    Image(ImageBuffer),
    Tensor(Tensor),
    Json(serde_json::Value),
}

impl PipelineValue {
    /// Runtime kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Text(_) => ValueKind::Text,
            Self::Audio(_) => ValueKind::Audio,
            Self::Image(_) => ValueKind::Image,
            Self::Tensor(_) => ValueKind::Tensor,
            Self::Json(_) => ValueKind::Json,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_audio(&self) -> Option<&AudioBuffer> {
        match self {
            Self::Audio(audio) => Some(audio),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&ImageBuffer> {
        match self {
            Self::Image(image) => Some(image),
            _ => None,
        }
    }

    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Self::Tensor(tensor) => Some(tensor),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(json) => Some(json),
            _ => None,
        }
    }

    /// Consume the value as text, failing with a type mismatch otherwise.
    pub fn into_text(self) -> ValueResult<String> {
        match self {
            Self::Text(text) => Ok(text),
            other => Err(ValueError::TypeMismatch {
                expected: ValueKind::Text,
                actual: other.kind(),
            }),
        }
    }

    /// Consume the value as a tensor, failing with a type mismatch otherwise.
    pub fn into_tensor(self) -> ValueResult<Tensor> {
        match self {
            Self::Tensor(tensor) => Ok(tensor),
            other => Err(ValueError::TypeMismatch {
                expected: ValueKind::Tensor,
                actual: other.kind(),
            }),
        }
    }

    /// Consume the value as JSON, failing with a type mismatch otherwise.
    pub fn into_json(self) -> ValueResult<serde_json::Value> {
        match self {
            Self::Json(json) => Ok(json),
            other => Err(ValueError::TypeMismatch {
                expected: ValueKind::Json,
                actual: other.kind(),
            }),
        }
    }

    /// Check structural invariants of the payload (buffer sizes, tensor shape).
    pub fn validate(&self) -> ValueResult<()> {
        match self {
            Self::Audio(audio) => audio.validate(),
            Self::Image(image) => image.validate(),
            Self::Tensor(tensor) => tensor.validate(),
            Self::Text(_) | Self::Json(_) => Ok(()),
        }
    }
}

impl From<String> for PipelineValue {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for PipelineValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<AudioBuffer> for PipelineValue {
    fn from(audio: AudioBuffer) -> Self {
        Self::Audio(audio)
    }
}

impl From<ImageBuffer> for PipelineValue {
    fn from(image: ImageBuffer) -> Self {
        Self::Image(image)
    }
}

impl From<Tensor> for PipelineValue {
    fn from(tensor: Tensor) -> Self {
        Self::Tensor(tensor)
    }
}

impl From<serde_json::Value> for PipelineValue {
    fn from(json: serde_json::Value) -> Self {
        Self::Json(json)
    }
}
