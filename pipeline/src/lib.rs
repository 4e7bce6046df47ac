//! ModelFlow Pipeline Crate
//!
//! **One contract for many processing units, built by name.**
//!
//! # Architecture
//!
//! - **[`Pipeline`]**: the contract every variant implements. Single inputs
//!   and batches go through the same `invoke`, batch output order always
//!   matches input order.
//! - **[`ModelBackedPipeline`]**: the part a variant composes when it needs a
//!   pretrained checkpoint. Resolves device and precision, loads eagerly or
//!   lazily, splits batches and tracks handle health.
//! - **[`PipelineFactory`]**: registry of constructors keyed by type
//!   identifier, with aliases and an optional instance cache.
//! - **Backends** ([`ModelBackend`], [`TrainingBackend`], [`Retriever`]):
//!   the numerics live behind these traits, never in this crate.
//!
//! # Example
//!
//! ```no_run
//! use modelflow_pipeline::{FactoryConfig, PipelineContext, PipelineFactory, PipelineSpec};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let factory = PipelineFactory::with_builtins(PipelineContext::new(), &FactoryConfig::default())?;
//!
//! let segmentation = factory.create(&PipelineSpec::new("segmentation").with_param("mode", "sentences"))?;
//! let sentences = segmentation.invoke_one("First one. Second one.".into())?;
//! println!("{:?}", sentences);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod base;
pub mod builtins;
pub mod config;
pub mod context;
pub mod error;
pub mod factory;
pub mod handles;
pub mod model;
pub mod spec;
pub mod types;

// Variants
pub mod caption;
pub mod labels;
pub mod nop;
pub mod rag;
pub mod segmentation;
pub mod summary;
pub mod tensors;
pub mod text_generation;
pub mod tokenizer;
pub mod trainer;
pub mod transcription;
pub mod translation;

pub use backend::{
    BackendError, BackendResult, LoadRequest, ModelBackend, ModelHandle, Passage, Retriever,
    TrainableModel, TrainingBackend,
};
pub use base::{Invocation, Pipeline, PipelineStream};
pub use config::{FactoryConfig, RuntimeDefaults, DEFAULT_MAX_BATCH_SIZE};
pub use context::PipelineContext;
pub use error::{PipelineError, Result};
pub use factory::{constructor, Constructor, PipelineFactory};
pub use handles::{CheckpointKey, HandlePool, LoadedModel};
pub use model::{LoadPolicy, ModelBackedPipeline, ModelSpec};
pub use spec::{ParamReader, Params, PipelineSpec};
pub use types::PipelineType;

pub use caption::CaptionPipeline;
pub use labels::LabelsPipeline;
pub use nop::NopPipeline;
pub use rag::RagPipeline;
pub use segmentation::{SegmentationMode, SegmentationPipeline};
pub use summary::SummaryPipeline;
pub use tensors::{TensorOp, TensorsPipeline};
pub use text_generation::{GenerationConfig, TextGenerationPipeline};
pub use tokenizer::TokenizerPipeline;
pub use trainer::{
    EarlyStopping, StepReport, Trainer, TrainerPipeline, TrainingConfig, TrainingOutcome,
    TrainingReport,
};
pub use transcription::TranscriptionPipeline;
pub use translation::TranslationPipeline;

// Value and hardware types that appear in the public API
pub use modelflow_hardware::{Device, Precision};
pub use modelflow_values::{AudioBuffer, ImageBuffer, PipelineValue, Tensor, ValueKind};
