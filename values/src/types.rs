//! Runtime type information for values.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::PipelineValue;

/// Kind of payload a pipeline accepts or produces.
///
/// `Any` is only used in pipeline signatures (e.g. the no-op pipeline); a
/// concrete [`PipelineValue`] always reports one of the other kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Any,
    Text,
    Audio,
    Image,
    Tensor,
    Json,
}

impl ValueKind {
    /// Returns true if `value` conforms to this kind.
    pub fn accepts(&self, value: &PipelineValue) -> bool {
        *self == Self::Any || *self == value.kind()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Text => "text",
            Self::Audio => "audio",
            Self::Image => "image",
            Self::Tensor => "tensor",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
