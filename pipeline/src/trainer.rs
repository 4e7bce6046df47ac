//! Training loop
//!
//! Unlike the other variants the trainer does not map inputs to outputs. It
//! runs an optimization loop over a dataset through a [`TrainableModel`]
//! that it owns exclusively for the duration of the run, and reports how the
//! run ended.
//!
//! Cancellation, budget exhaustion and early stopping are normal endings and
//! come back as `Ok(TrainingReport)`. Only a failing step (or checkpoint
//! save) is an error, and it carries the step and the last checkpoint.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use modelflow_values::{PipelineValue, ValueKind};

use crate::backend::{LoadRequest, TrainableModel, TrainingBackend};
use crate::base::Pipeline;
use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::model::ModelSpec;
use crate::spec::{ParamReader, PipelineSpec};
use crate::types::PipelineType;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EarlyStopping {
    /// Epochs without improvement before stopping
    pub patience: usize,
    /// Smallest decrease of the mean epoch loss that counts as improvement
    pub min_delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub max_steps: Option<u64>,
    pub batch_size: usize,
    pub log_every: u64,
    pub checkpoint_every: Option<u64>,
    pub early_stopping: Option<EarlyStopping>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 3,
            max_steps: None,
            batch_size: 8,
            log_every: 10,
            checkpoint_every: None,
            early_stopping: None,
        }
    }
}

impl TrainingConfig {
    /// Read `epochs`, `max_steps`, `batch_size`, `log_every`,
    /// `checkpoint_every`, `patience` and `min_delta`
    pub fn from_params(reader: &ParamReader<'_>) -> Result<Self> {
        let defaults = Self::default();

        let min_delta = reader.f64("min_delta")?.unwrap_or(0.0);
        if min_delta < 0.0 {
            return Err(reader.error("min_delta", "must not be negative"));
        }
        let early_stopping = reader
            .positive("patience")?
            .map(|patience| EarlyStopping { patience, min_delta });

        Ok(Self {
            epochs: reader.positive("epochs")?.unwrap_or(defaults.epochs),
            max_steps: reader.positive("max_steps")?.map(|v| v as u64),
            batch_size: reader.positive("batch_size")?.unwrap_or(defaults.batch_size),
            log_every: reader
                .positive("log_every")?
                .map(|v| v as u64)
                .unwrap_or(defaults.log_every),
            checkpoint_every: reader.positive("checkpoint_every")?.map(|v| v as u64),
            early_stopping,
        })
    }
}

/// Progress of one completed step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub step: u64,
    pub epoch: usize,
    pub loss: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingOutcome {
    Completed,
    BudgetExhausted,
    EarlyStopped,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub outcome: TrainingOutcome,
    /// Last completed step, 0 if none ran
    pub last_step: u64,
    pub epochs_completed: usize,
    pub last_checkpoint: Option<String>,
    pub loss_history: Vec<f64>,
}

pub struct Trainer {
    request: LoadRequest,
    backend: Arc<dyn TrainingBackend>,
    config: TrainingConfig,
}

/// Mutable state of one run
struct Run {
    step: u64,
    last_checkpoint: Option<String>,
    checkpoint_step: Option<u64>,
    losses: Vec<f64>,
}

impl Run {
    fn failure(&self, step: u64, message: impl Into<String>) -> PipelineError {
        PipelineError::Training {
            step,
            last_checkpoint: self.last_checkpoint.clone(),
            message: message.into(),
        }
    }

    fn checkpoint(&mut self, model: &mut dyn TrainableModel) -> Result<()> {
        let id = model
            .save_checkpoint(self.step)
            .map_err(|e| self.failure(self.step, format!("checkpoint save failed: {}", e)))?;
        log::info!("Saved checkpoint {} at step {}", id, self.step);
        self.last_checkpoint = Some(id);
        self.checkpoint_step = Some(self.step);
        Ok(())
    }
}

impl Trainer {
    pub fn new(request: LoadRequest, backend: Arc<dyn TrainingBackend>, config: TrainingConfig) -> Self {
        Self {
            request,
            backend,
            config,
        }
    }

    pub fn from_spec(spec: &PipelineSpec, context: &PipelineContext) -> Result<Self> {
        let reader = spec.reader(PipelineType::Trainer.as_str());
        let model = ModelSpec::from_params(&reader)?;

        let backend = context.training_backend().cloned().ok_or_else(|| PipelineError::Load {
            model_id: model.model_id.clone(),
            message: "no training backend configured".to_string(),
        })?;

        Ok(Self::new(
            model.to_request(PipelineType::Trainer.to_hf_tag(), context),
            backend,
            TrainingConfig::from_params(&reader)?,
        ))
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Run the loop over `dataset` until the epochs run out, the step budget
    /// is spent, early stopping triggers or `cancel` fires.
    ///
    /// The token and the step budget are checked before every step, so a
    /// cancelled run reports the last step that actually completed.
    pub fn train<F>(&self, dataset: &[PipelineValue], cancel: &CancellationToken, mut progress: F) -> Result<TrainingReport>
    where
        F: FnMut(&StepReport),
    {
        if dataset.is_empty() {
            return Err(PipelineError::Validation {
                index: None,
                message: "training dataset is empty".to_string(),
            });
        }

        let mut model = self.backend.prepare(&self.request).map_err(|e| PipelineError::Load {
            model_id: self.request.model_id.clone(),
            message: e.to_string(),
        })?;
        log::info!(
            "Training {} on {} example(s): {} epoch(s), batch size {}",
            self.request.model_id,
            dataset.len(),
            self.config.epochs,
            self.config.batch_size
        );

        let mut run = Run {
            step: 0,
            last_checkpoint: None,
            checkpoint_step: None,
            losses: Vec::new(),
        };
        let mut epochs_completed = 0;
        let mut best = f64::INFINITY;
        let mut stale = 0;

        let outcome = 'epochs: {
            for epoch in 0..self.config.epochs {
                let mut epoch_loss = 0.0;
                let mut epoch_steps = 0;

                for batch in dataset.chunks(self.config.batch_size) {
                    if self.config.max_steps.is_some_and(|max| run.step >= max) {
                        break 'epochs TrainingOutcome::BudgetExhausted;
                    }
                    if cancel.is_cancelled() {
                        log::info!("Training cancelled after step {}", run.step);
                        break 'epochs TrainingOutcome::Cancelled;
                    }

                    let step = run.step + 1;
                    let loss = model
                        .train_step(batch)
                        .map_err(|e| run.failure(step, e.to_string()))?;
                    if !loss.is_finite() {
                        return Err(run.failure(step, format!("loss is {}", loss)));
                    }

                    run.step = step;
                    run.losses.push(loss);
                    epoch_loss += loss;
                    epoch_steps += 1;
                    progress(&StepReport { step, epoch, loss });

                    if step % self.config.log_every == 0 {
                        log::info!("Step {} (epoch {}): loss {:.4}", step, epoch + 1, loss);
                    }
                    if self.config.checkpoint_every.is_some_and(|every| step % every == 0) {
                        run.checkpoint(model.as_mut())?;
                    }
                }

                epochs_completed += 1;

                if let Some(early) = self.config.early_stopping {
                    let mean = epoch_loss / epoch_steps.max(1) as f64;
                    if mean < best - early.min_delta {
                        best = mean;
                        stale = 0;
                    } else {
                        stale += 1;
                    }
                    if stale >= early.patience && epoch + 1 < self.config.epochs {
                        log::info!("No improvement for {} epoch(s), stopping early", stale);
                        break 'epochs TrainingOutcome::EarlyStopped;
                    }
                }
            }
            TrainingOutcome::Completed
        };

        if run.step > 0 && run.checkpoint_step != Some(run.step) {
            run.checkpoint(model.as_mut())?;
        }

        log::info!("Training finished: {:?} at step {}", outcome, run.step);
        Ok(TrainingReport {
            outcome,
            last_step: run.step,
            epochs_completed,
            last_checkpoint: run.last_checkpoint,
            loss_history: run.losses,
        })
    }
}

/// Trainer exposed through the common contract.
///
/// Each input is one dataset, a json array of examples or `{"data": [...]}`,
/// and produces one json [`TrainingReport`].
///
/// [`TrainerPipeline::cancel`] stops every active call at its next step
/// boundary, and every dataset left in those calls reports `cancelled`
/// without training. A cancel issued while idle applies to the next call.
/// The signal is cleared once no call is running.
pub struct TrainerPipeline {
    trainer: Trainer,
    runs: Mutex<Runs>,
}

struct Runs {
    token: CancellationToken,
    active: usize,
}

/// Ends one call on drop, so errors clear the signal too
struct ActiveRun<'a> {
    runs: &'a Mutex<Runs>,
    token: CancellationToken,
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        let mut runs = self.runs.lock();
        runs.active = runs.active.saturating_sub(1);
        if runs.active == 0 && runs.token.is_cancelled() {
            runs.token = CancellationToken::new();
        }
    }
}

impl TrainerPipeline {
    pub fn new(trainer: Trainer) -> Self {
        Self {
            trainer,
            runs: Mutex::new(Runs {
                token: CancellationToken::new(),
                active: 0,
            }),
        }
    }

    pub fn from_spec(spec: &PipelineSpec, context: &PipelineContext) -> Result<Self> {
        Ok(Self::new(Trainer::from_spec(spec, context)?))
    }

    pub fn trainer(&self) -> &Trainer {
        &self.trainer
    }

    pub fn cancel(&self) {
        log::info!("Cancelling training on {}", self.trainer.request.model_id);
        self.runs.lock().token.cancel();
    }

    /// Token shared by the running calls, or by the next one when idle
    pub fn cancellation_token(&self) -> CancellationToken {
        self.runs.lock().token.clone()
    }

    fn begin_run(&self) -> ActiveRun<'_> {
        let mut runs = self.runs.lock();
        runs.active += 1;
        ActiveRun {
            runs: &self.runs,
            token: runs.token.clone(),
        }
    }
}

fn dataset_of(index: usize, value: &PipelineValue) -> Result<Vec<PipelineValue>> {
    let items = match value {
        PipelineValue::Json(Value::Array(items)) => items,
        PipelineValue::Json(Value::Object(map)) => match map.get("data") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(PipelineError::validation(
                    index,
                    "dataset object needs a \"data\" array",
                ))
            }
        },
        other => {
            return Err(PipelineError::validation(
                index,
                format!("expected json dataset, got {}", other.kind()),
            ))
        }
    };

    Ok(items
        .iter()
        .map(|item| match item {
            Value::String(text) => PipelineValue::Text(text.clone()),
            other => PipelineValue::Json(other.clone()),
        })
        .collect())
}

impl Pipeline for TrainerPipeline {
    fn pipeline_type(&self) -> &str {
        PipelineType::Trainer.as_str()
    }

    fn input_kind(&self) -> ValueKind {
        ValueKind::Json
    }

    fn output_kind(&self) -> ValueKind {
        ValueKind::Json
    }

    fn run_batch(&self, inputs: &[PipelineValue]) -> Result<Vec<PipelineValue>> {
        let run = self.begin_run();
        let mut reports = Vec::with_capacity(inputs.len());
        for (index, value) in inputs.iter().enumerate() {
            let dataset = dataset_of(index, value)?;
            let report = self
                .trainer
                .train(&dataset, &run.token, |_| {})
                .map_err(|e| match e {
                    PipelineError::Validation { message, .. } => PipelineError::validation(index, message),
                    other => other,
                })?;
            reports.push(PipelineValue::Json(serde_json::to_value(report)?));
        }
        Ok(reports)
    }
}
