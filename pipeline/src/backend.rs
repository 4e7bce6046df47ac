//! Collaborator boundaries
//!
//! Pipelines never run model numerics, training math or vector search
//! themselves. They reach those through the narrow traits below, so any
//! runtime (ONNX, GGUF, a Python bridge, a test double) can be plugged in.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use modelflow_hardware::{Device, Precision};
use modelflow_values::PipelineValue;

use crate::spec::Params;

/// Errors reported by model, training and retrieval backends
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Model not found: {0}")]
    NotFound(String),

    #[error("Load failed: {0}")]
    LoadFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    /// The handle is gone (device reset, process crash). Owners must stop
    /// using it and reload.
    #[error("Model handle lost: {0}")]
    HandleLost(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Everything a backend needs to resolve and place a checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadRequest {
    pub model_id: String,
    pub revision: Option<String>,
    pub device: Device,
    pub precision: Precision,

    /// HuggingFace task tag of the requesting pipeline
    pub task: Option<String>,

    /// Backend-specific options passed through from the pipeline's `options` table
    #[serde(default)]
    pub options: Params,
}

/// A loaded model ready for inference
pub trait ModelHandle: Send + Sync {
    fn model_id(&self) -> &str;

    /// Run one batch. Must return exactly one output per input, in order.
    fn infer(&self, batch: &[PipelineValue]) -> BackendResult<Vec<PipelineValue>>;

    /// Whether `infer` may be called from several threads at once.
    /// Handles that say no are serialized by their owner.
    fn supports_concurrent_inference(&self) -> bool {
        false
    }
}

/// Resolves checkpoints into handles
pub trait ModelBackend: Send + Sync {
    fn name(&self) -> &str;

    fn load(&self, request: &LoadRequest) -> BackendResult<Arc<dyn ModelHandle>>;
}

/// A model opened for training. Owned exclusively by one trainer.
pub trait TrainableModel: Send {
    /// Run one optimization step and return its loss.
    fn train_step(&mut self, batch: &[PipelineValue]) -> BackendResult<f64>;

    /// Persist the current weights, returning a checkpoint identifier.
    fn save_checkpoint(&mut self, step: u64) -> BackendResult<String>;
}

pub trait TrainingBackend: Send + Sync {
    fn prepare(&self, request: &LoadRequest) -> BackendResult<Box<dyn TrainableModel>>;
}

/// A retrieved passage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub id: String,
    pub text: String,
    pub score: f32,
}

/// Search index consumed by the RAG pipeline
pub trait Retriever: Send + Sync {
    /// Top `top_k` passages for `query`, most relevant first.
    fn search(&self, query: &str, top_k: usize) -> BackendResult<Vec<Passage>>;
}
