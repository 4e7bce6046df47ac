/// Pipeline errors
///
/// Represents all possible failure modes for pipeline construction and invocation.
/// Batch failures are all-or-nothing: the first failing element aborts the call and
/// its position is reported in `index`.
use thiserror::Error;

use crate::backend::BackendError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Pipeline type not registered: {0}")]
    UnknownType(String),

    #[error("Pipeline type already registered: {0}")]
    DuplicateRegistration(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid parameter '{parameter}' for pipeline '{pipeline}': {message}")]
    InvalidParameter {
        pipeline: String,
        parameter: String,
        message: String,
    },

    #[error("Invalid input{}: {message}", at(.index))]
    Validation {
        index: Option<usize>,
        message: String,
    },

    #[error("Failed to load model '{model_id}': {message}")]
    Load { model_id: String, message: String },

    #[error("Model '{model_id}' unavailable: {reason}")]
    ModelUnavailable { model_id: String, reason: String },

    #[error("Inference failed{}: {message}", at(.index))]
    Inference {
        index: Option<usize>,
        message: String,
    },

    #[error("Training failed at step {step}: {message}")]
    Training {
        step: u64,
        last_checkpoint: Option<String>,
        message: String,
    },

    #[error("Timed out after {elapsed_ms} ms with {completed} inputs completed")]
    Timeout { elapsed_ms: u64, completed: usize },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigError(#[from] toml::de::Error),
}

fn at(index: &Option<usize>) -> String {
    match index {
        Some(i) => format!(" at batch index {}", i),
        None => String::new(),
    }
}

impl PipelineError {
    pub fn validation(index: usize, message: impl Into<String>) -> Self {
        Self::Validation {
            index: Some(index),
            message: message.into(),
        }
    }

    pub fn inference(index: usize, message: impl Into<String>) -> Self {
        Self::Inference {
            index: Some(index),
            message: message.into(),
        }
    }

    pub fn invalid_parameter(
        pipeline: impl Into<String>,
        parameter: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            pipeline: pipeline.into(),
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Shift a batch index by `offset`, used when a sub-batch error is reported
    /// against the caller's full batch.
    pub fn offset(self, offset: usize) -> Self {
        match self {
            Self::Validation { index, message } => Self::Validation {
                index: Some(index.unwrap_or(0) + offset),
                message,
            },
            Self::Inference { index, message } => Self::Inference {
                index: Some(index.unwrap_or(0) + offset),
                message,
            },
            Self::Timeout {
                elapsed_ms,
                completed,
            } => Self::Timeout {
                elapsed_ms,
                completed: completed + offset,
            },
            other => other,
        }
    }

    /// Batch position this error refers to, if any.
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::Validation { index, .. } | Self::Inference { index, .. } => *index,
            _ => None,
        }
    }

    /// True when the pipeline instance that raised this error cannot serve
    /// further calls and must be reconstructed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ModelUnavailable { .. })
    }
}

impl From<modelflow_values::ValueError> for PipelineError {
    fn from(err: modelflow_values::ValueError) -> Self {
        Self::Validation {
            index: None,
            message: err.to_string(),
        }
    }
}

impl From<modelflow_hardware::HardwareError> for PipelineError {
    fn from(err: modelflow_hardware::HardwareError) -> Self {
        Self::InvalidConfiguration(err.to_string())
    }
}

impl From<BackendError> for PipelineError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::InvalidInput(message) => Self::Validation {
                index: None,
                message,
            },
            other => Self::Inference {
                index: None,
                message: other.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
