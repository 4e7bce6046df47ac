//! Common test utilities for the pipeline integration tests.
//!
//! In-process backends that behave like the real runtimes at the trait
//! boundary: they load by model id, answer one output per input and fail the
//! way real handles fail.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};

use modelflow_pipeline::{
    BackendError, BackendResult, Device, FactoryConfig, LoadRequest, ModelBackend, ModelHandle,
    Passage, PipelineContext, PipelineFactory, PipelineValue, Retriever, RuntimeDefaults,
    TrainableModel, TrainingBackend,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Model id that the backend refuses to load
pub const MISSING_MODEL: &str = "missing/model";
/// Model whose handle reports itself lost on first use
pub const FLAKY_MODEL: &str = "flaky/model";
/// Model whose first loaded handle is lost on use; later loads are healthy
pub const FLAKY_ONCE_MODEL: &str = "flaky-once/model";
/// Model that fails on any text containing "boom"
pub const BROKEN_MODEL: &str = "broken/model";
/// Model that sleeps on every batch
pub const SLOW_MODEL: &str = "slow/model";

/// Deterministic stand-in for a real model.
///
/// - text: echoed
/// - audio: `"<frames> frames @ <rate> Hz"`
/// - image: `"image <w>x<h>"`
/// - `{"prompt": p}`: `p`
/// - `{"text": t, "labels": [..]}`: one logit per label, 4.0 if `t`
///   mentions the label else 0.0
/// - `{"text": t, "target": l}`: `"[l] t"`
/// - `{"text": t}`: `t`
pub fn respond(value: &PipelineValue) -> BackendResult<PipelineValue> {
    let answer = match value {
        PipelineValue::Text(text) => PipelineValue::Text(text.clone()),
        PipelineValue::Audio(audio) => PipelineValue::Text(format!(
            "{} frames @ {} Hz",
            audio.frames(),
            audio.sample_rate
        )),
        PipelineValue::Image(image) => {
            PipelineValue::Text(format!("image {}x{}", image.width, image.height))
        }
        PipelineValue::Json(request) => {
            let text = request.get("text").and_then(Value::as_str).unwrap_or_default();
            if let Some(prompt) = request.get("prompt").and_then(Value::as_str) {
                PipelineValue::Text(prompt.to_string())
            } else if let Some(labels) = request.get("labels").and_then(Value::as_array) {
                let lowered = text.to_lowercase();
                PipelineValue::Json(Value::Array(
                    labels
                        .iter()
                        .map(|label| {
                            let label = label.as_str().unwrap_or_default().to_lowercase();
                            json!(if lowered.contains(&label) { 4.0 } else { 0.0 })
                        })
                        .collect(),
                ))
            } else if let Some(target) = request.get("target").and_then(Value::as_str) {
                PipelineValue::Text(format!("[{}] {}", target, text))
            } else {
                PipelineValue::Text(text.to_string())
            }
        }
        other => other.clone(),
    };
    Ok(answer)
}

fn mentions_boom(value: &PipelineValue) -> bool {
    match value {
        PipelineValue::Text(text) => text.contains("boom"),
        PipelineValue::Json(json) => json.to_string().contains("boom"),
        _ => false,
    }
}

pub struct EchoHandle {
    model_id: String,
    batch_sizes: Arc<Mutex<Vec<usize>>>,
    lost: bool,
    delay: Option<Duration>,
}

impl ModelHandle for EchoHandle {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn infer(&self, batch: &[PipelineValue]) -> BackendResult<Vec<PipelineValue>> {
        self.batch_sizes.lock().push(batch.len());
        if self.lost {
            return Err(BackendError::HandleLost("device reset".to_string()));
        }
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        if self.model_id == BROKEN_MODEL {
            if let Some(position) = batch.iter().position(mentions_boom) {
                return Err(BackendError::InferenceFailed(format!(
                    "kernel failed on item {}",
                    position
                )));
            }
        }
        batch.iter().map(respond).collect()
    }
}

/// Model backend over [`EchoHandle`]s that records what it was asked to do
#[derive(Default)]
pub struct EchoBackend {
    loads: AtomicUsize,
    requests: Mutex<Vec<LoadRequest>>,
    batch_sizes: Arc<Mutex<Vec<usize>>>,
    flaky_once_served: AtomicBool,
}

impl EchoBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<LoadRequest> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<LoadRequest> {
        self.requests.lock().last().cloned()
    }

    /// Sizes of every batch any handle has seen, in call order
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().clone()
    }

    pub fn infer_calls(&self) -> usize {
        self.batch_sizes.lock().len()
    }
}

impl ModelBackend for EchoBackend {
    fn name(&self) -> &str {
        "echo"
    }

    fn load(&self, request: &LoadRequest) -> BackendResult<Arc<dyn ModelHandle>> {
        self.requests.lock().push(request.clone());
        if request.model_id == MISSING_MODEL {
            return Err(BackendError::NotFound(request.model_id.clone()));
        }
        self.loads.fetch_add(1, Ordering::SeqCst);

        Ok(Arc::new(EchoHandle {
            model_id: request.model_id.clone(),
            batch_sizes: Arc::clone(&self.batch_sizes),
            lost: request.model_id == FLAKY_MODEL
                || (request.model_id == FLAKY_ONCE_MODEL
                    && !self.flaky_once_served.swap(true, Ordering::SeqCst)),
            delay: (request.model_id == SLOW_MODEL).then(|| Duration::from_millis(40)),
        }))
    }
}

/// Retriever over a fixed passage list, ranked by score
pub struct StaticRetriever {
    passages: Vec<Passage>,
    queries: Mutex<Vec<String>>,
}

impl StaticRetriever {
    pub fn new(passages: &[(&str, &str, f32)]) -> Arc<Self> {
        let mut passages: Vec<Passage> = passages
            .iter()
            .map(|(id, text, score)| Passage {
                id: id.to_string(),
                text: text.to_string(),
                score: *score,
            })
            .collect();
        passages.sort_by(|a, b| b.score.total_cmp(&a.score));
        Arc::new(Self {
            passages,
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

impl Retriever for StaticRetriever {
    fn search(&self, query: &str, top_k: usize) -> BackendResult<Vec<Passage>> {
        self.queries.lock().push(query.to_string());
        Ok(self.passages.iter().take(top_k).cloned().collect())
    }
}

/// Training backend whose models replay a loss schedule
pub type StepHook = Arc<dyn Fn(u64) + Send + Sync>;

pub struct ScriptedTraining {
    pub losses: Vec<f64>,
    pub fail_at: Option<u64>,
    pub prepared: AtomicUsize,
    on_step: Option<StepHook>,
}

impl ScriptedTraining {
    pub fn new(losses: Vec<f64>) -> Arc<Self> {
        Arc::new(Self {
            losses,
            fail_at: None,
            prepared: AtomicUsize::new(0),
            on_step: None,
        })
    }

    /// Calls `hook` with the step number after every completed step
    pub fn with_step_hook(losses: Vec<f64>, hook: StepHook) -> Arc<Self> {
        Arc::new(Self {
            losses,
            fail_at: None,
            prepared: AtomicUsize::new(0),
            on_step: Some(hook),
        })
    }

    pub fn failing_at(losses: Vec<f64>, step: u64) -> Arc<Self> {
        Arc::new(Self {
            losses,
            fail_at: Some(step),
            prepared: AtomicUsize::new(0),
            on_step: None,
        })
    }
}

struct ScriptedModel {
    losses: Vec<f64>,
    fail_at: Option<u64>,
    step: u64,
    on_step: Option<StepHook>,
}

impl TrainableModel for ScriptedModel {
    fn train_step(&mut self, batch: &[PipelineValue]) -> BackendResult<f64> {
        self.step += 1;
        if batch.is_empty() {
            return Err(BackendError::InvalidInput("empty batch".to_string()));
        }
        if self.fail_at == Some(self.step) {
            return Err(BackendError::InferenceFailed("gradient overflow".to_string()));
        }
        let i = (self.step as usize - 1).min(self.losses.len().saturating_sub(1));
        if let Some(hook) = &self.on_step {
            hook(self.step);
        }
        Ok(self.losses.get(i).copied().unwrap_or(0.0))
    }

    fn save_checkpoint(&mut self, step: u64) -> BackendResult<String> {
        Ok(format!("checkpoint-{:04}", step))
    }
}

impl TrainingBackend for ScriptedTraining {
    fn prepare(&self, _request: &LoadRequest) -> BackendResult<Box<dyn TrainableModel>> {
        self.prepared.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedModel {
            losses: self.losses.clone(),
            fail_at: self.fail_at,
            step: 0,
            on_step: self.on_step.clone(),
        }))
    }
}

/// Context with the echo backend, pinned to CPU so no hardware detection runs
pub fn context(backend: &Arc<EchoBackend>) -> PipelineContext {
    PipelineContext::new()
        .with_backend(backend.clone())
        .with_defaults(RuntimeDefaults {
            device: Some(Device::Cpu),
            ..RuntimeDefaults::default()
        })
}

/// Factory with every built-in registered over `context`
pub fn factory(context: PipelineContext, cache: bool) -> PipelineFactory {
    let config = FactoryConfig {
        cache,
        defaults: context.defaults().clone(),
        ..FactoryConfig::default()
    };
    PipelineFactory::with_builtins(context, &config).expect("built-in registration failed")
}

pub fn texts(items: &[&str]) -> Vec<PipelineValue> {
    items.iter().map(|s| PipelineValue::Text(s.to_string())).collect()
}

pub fn text_of(value: &PipelineValue) -> &str {
    value.as_text().expect("expected text output")
}
