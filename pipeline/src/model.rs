//! Model-backed pipelines
//!
//! [`ModelBackedPipeline`] owns the link between a variant and a pretrained
//! checkpoint: it resolves device and precision, loads the handle eagerly or on
//! first use, splits batches into sub-batches, and tracks whether the handle is
//! still usable.
//!
//! Handle lifecycle:
//!
//! ```text
//! Unloaded --load ok--> Ready --HandleLost--> Invalidated
//!     |                   |
//!     +--load failed--> Failed          (unload) --> Unloaded
//! ```
//!
//! `Failed` and `Invalidated` are terminal for normal calls, which report
//! `ModelUnavailable` until [`ModelBackedPipeline::reload`] is called.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use modelflow_hardware::{default_precision, Device, Precision};
use modelflow_values::PipelineValue;

use crate::backend::{BackendError, LoadRequest, ModelBackend};
use crate::config::DEFAULT_MAX_BATCH_SIZE;
use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::handles::{CheckpointKey, HandlePool, LoadedModel};
use crate::spec::{Params, ParamReader};

/// When the checkpoint is loaded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LoadPolicy {
    /// At construction; a failure fails construction
    #[default]
    Eager,
    /// On first invocation
    Lazy,
}

impl std::str::FromStr for LoadPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "eager" => Ok(Self::Eager),
            "lazy" => Ok(Self::Lazy),
            other => Err(format!("unknown load policy '{}', expected eager or lazy", other)),
        }
    }
}

impl std::fmt::Display for LoadPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Eager => write!(f, "eager"),
            Self::Lazy => write!(f, "lazy"),
        }
    }
}

impl TryFrom<String> for LoadPolicy {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LoadPolicy> for String {
    fn from(policy: LoadPolicy) -> Self {
        policy.to_string()
    }
}

/// Checkpoint and runtime settings of a model-backed pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub model_id: String,
    pub revision: Option<String>,
    pub device: Option<Device>,
    pub precision: Option<Precision>,
    pub load: Option<LoadPolicy>,
    pub max_batch_size: Option<usize>,
    pub timeout_ms: Option<u64>,

    /// Share the handle through the context's pool
    #[serde(default)]
    pub share: bool,

    /// Backend-specific options
    #[serde(default)]
    pub options: Params,
}

impl ModelSpec {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            ..Self::default()
        }
    }

    /// Read the common model parameters (`model`/`path`, `revision`, `device`,
    /// `precision`, `load`, `batch`, `timeout_ms`, `share`, `options`)
    pub fn from_params(reader: &ParamReader<'_>) -> Result<Self> {
        let model_id = reader
            .first_str(&["model", "path"])?
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| reader.error("model", "is required"))?;

        Ok(Self {
            model_id: model_id.to_string(),
            revision: reader.str("revision")?.map(str::to_string),
            device: reader.parse("device")?,
            precision: reader.parse("precision")?,
            load: reader.parse("load")?,
            max_batch_size: reader.positive("batch")?,
            timeout_ms: reader.u64("timeout_ms")?,
            share: reader.bool("share")?.unwrap_or(false),
            options: reader.table("options")?,
        })
    }

    /// Resolve device and precision into a backend request.
    ///
    /// Explicit settings win over the context's runtime defaults, which win
    /// over the hardware-derived default device.
    pub fn to_request(&self, task: Option<&str>, context: &PipelineContext) -> LoadRequest {
        let defaults = context.defaults();
        let device = match self.device.or(defaults.device) {
            Some(device) => device,
            None => context.recommended_device().device,
        };
        let precision = self
            .precision
            .or(defaults.precision)
            .unwrap_or_else(|| default_precision(device));

        LoadRequest {
            model_id: self.model_id.clone(),
            revision: self.revision.clone(),
            device,
            precision,
            task: task.map(str::to_string),
            options: self.options.clone(),
        }
    }
}

/// Forward the `Pipeline` lifecycle hooks to a `ModelBackedPipeline` field
macro_rules! model_lifecycle {
    ($field:ident) => {
        fn is_loaded(&self) -> bool {
            self.$field.is_loaded()
        }

        fn load(&self) -> $crate::error::Result<()> {
            self.$field.load()
        }

        fn unload(&self) -> $crate::error::Result<()> {
            self.$field.unload()
        }

        fn is_usable(&self) -> bool {
            self.$field.is_usable()
        }
    };
}
pub(crate) use model_lifecycle;

enum HandleState {
    Unloaded,
    Ready(Arc<LoadedModel>),
    Failed(String),
    Invalidated(String),
}

pub struct ModelBackedPipeline {
    request: LoadRequest,
    key: CheckpointKey,
    load_policy: LoadPolicy,
    max_batch_size: usize,
    timeout: Option<Duration>,
    backend: Arc<dyn ModelBackend>,
    pool: Option<Arc<HandlePool>>,
    state: Mutex<HandleState>,
}

impl ModelBackedPipeline {
    /// Resolve `spec` against the context and load the checkpoint unless the
    /// load policy is lazy.
    pub fn construct(spec: ModelSpec, task: Option<&str>, context: &PipelineContext) -> Result<Self> {
        if spec.model_id.trim().is_empty() {
            return Err(PipelineError::InvalidConfiguration(
                "model id must not be empty".to_string(),
            ));
        }

        let backend = context.backend().cloned().ok_or_else(|| PipelineError::Load {
            model_id: spec.model_id.clone(),
            message: "no model backend configured".to_string(),
        })?;

        let defaults = context.defaults();
        let max_batch_size = spec
            .max_batch_size
            .or(defaults.max_batch_size)
            .unwrap_or(DEFAULT_MAX_BATCH_SIZE);
        if max_batch_size == 0 {
            return Err(PipelineError::InvalidConfiguration(
                "max batch size must be greater than zero".to_string(),
            ));
        }

        let request = spec.to_request(task, context);
        let key = CheckpointKey::from(&request);

        let pipeline = Self {
            key,
            load_policy: spec.load.or(defaults.load).unwrap_or_default(),
            max_batch_size,
            timeout: spec
                .timeout_ms
                .or(defaults.timeout_ms)
                .map(Duration::from_millis),
            backend,
            pool: spec.share.then(|| Arc::clone(context.handles())),
            state: Mutex::new(HandleState::Unloaded),
            request,
        };

        if pipeline.load_policy == LoadPolicy::Eager {
            pipeline.load()?;
        }
        Ok(pipeline)
    }

    pub fn model_id(&self) -> &str {
        &self.request.model_id
    }

    pub fn device(&self) -> Device {
        self.request.device
    }

    pub fn precision(&self) -> Precision {
        self.request.precision
    }

    pub fn load_policy(&self) -> LoadPolicy {
        self.load_policy
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    pub fn checkpoint(&self) -> &CheckpointKey {
        &self.key
    }

    pub fn is_loaded(&self) -> bool {
        matches!(*self.state.lock(), HandleState::Ready(_))
    }

    pub fn is_usable(&self) -> bool {
        !matches!(
            *self.state.lock(),
            HandleState::Failed(_) | HandleState::Invalidated(_)
        )
    }

    /// Load the handle if not already loaded
    pub fn load(&self) -> Result<()> {
        self.model().map(|_| ())
    }

    /// Drop the handle. A later call loads it again.
    pub fn unload(&self) -> Result<()> {
        let mut state = self.state.lock();
        if let HandleState::Ready(_) = &*state {
            *state = HandleState::Unloaded;
            if let Some(pool) = &self.pool {
                pool.release_unused();
            }
            log::info!("Model {} unloaded", self.request.model_id);
        }
        Ok(())
    }

    /// Leave a terminal state and load the checkpoint again
    pub fn reload(&self) -> Result<()> {
        *self.state.lock() = HandleState::Unloaded;
        log::info!("Reloading model {}", self.request.model_id);
        self.load()
    }

    /// Run the handle over `inputs` in sub-batches of the configured size
    pub fn infer(&self, inputs: &[PipelineValue]) -> Result<Vec<PipelineValue>> {
        self.batch(inputs, self.max_batch_size)
    }

    /// Run the handle over `inputs` in sub-batches of at most `max_batch_size`.
    ///
    /// Outputs are concatenated in input order. Empty input returns empty
    /// output without loading anything.
    pub fn batch(&self, inputs: &[PipelineValue], max_batch_size: usize) -> Result<Vec<PipelineValue>> {
        if max_batch_size == 0 {
            return Err(PipelineError::InvalidConfiguration(
                "max batch size must be greater than zero".to_string(),
            ));
        }
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.model()?;
        let started = Instant::now();
        let mut outputs = Vec::with_capacity(inputs.len());

        for (chunk_index, chunk) in inputs.chunks(max_batch_size).enumerate() {
            let offset = chunk_index * max_batch_size;

            if let Some(timeout) = self.timeout {
                let elapsed = started.elapsed();
                if offset > 0 && elapsed > timeout {
                    log::warn!(
                        "Model {} timed out after {} of {} inputs",
                        self.request.model_id,
                        offset,
                        inputs.len()
                    );
                    return Err(PipelineError::Timeout {
                        elapsed_ms: elapsed.as_millis() as u64,
                        completed: offset,
                    });
                }
            }

            let results = model
                .infer(chunk)
                .map_err(|e| self.backend_failure(e, offset, &model))?;

            if results.len() != chunk.len() {
                return Err(PipelineError::inference(
                    offset,
                    format!(
                        "model returned {} outputs for {} inputs",
                        results.len(),
                        chunk.len()
                    ),
                ));
            }
            outputs.extend(results);
        }

        log::debug!(
            "Model {} processed {} inputs in {:?}",
            self.request.model_id,
            inputs.len(),
            started.elapsed()
        );
        Ok(outputs)
    }

    fn model(&self) -> Result<Arc<LoadedModel>> {
        let mut state = self.state.lock();
        match &*state {
            HandleState::Ready(model) => Ok(Arc::clone(model)),
            HandleState::Failed(reason) | HandleState::Invalidated(reason) => {
                Err(PipelineError::ModelUnavailable {
                    model_id: self.request.model_id.clone(),
                    reason: reason.clone(),
                })
            }
            HandleState::Unloaded => match self.open() {
                Ok(model) => {
                    *state = HandleState::Ready(Arc::clone(&model));
                    Ok(model)
                }
                Err(e) => {
                    log::warn!("{}", e);
                    *state = HandleState::Failed(e.to_string());
                    Err(e)
                }
            },
        }
    }

    fn open(&self) -> Result<Arc<LoadedModel>> {
        log::info!(
            "Loading model {} on {} ({})",
            self.request.model_id,
            self.request.device,
            self.request.precision
        );

        let load = || self.backend.load(&self.request);
        let result = match &self.pool {
            Some(pool) => pool.acquire(&self.key, load),
            None => load().map(|handle| Arc::new(LoadedModel::new(self.key.clone(), handle))),
        };

        result.map_err(|e| PipelineError::Load {
            model_id: self.request.model_id.clone(),
            message: e.to_string(),
        })
    }

    fn backend_failure(&self, err: BackendError, offset: usize, model: &Arc<LoadedModel>) -> PipelineError {
        match err {
            BackendError::HandleLost(reason) => {
                log::warn!("Model {} handle lost: {}", self.request.model_id, reason);
                {
                    let mut state = self.state.lock();
                    if matches!(&*state, HandleState::Ready(current) if Arc::ptr_eq(current, model)) {
                        *state = HandleState::Invalidated(reason.clone());
                    }
                }
                // Only the dead handle leaves the pool
                if let Some(pool) = &self.pool {
                    pool.remove_if_same(&self.key, model);
                }
                PipelineError::ModelUnavailable {
                    model_id: self.request.model_id.clone(),
                    reason,
                }
            }
            other => PipelineError::from(other).offset(offset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendResult, ModelHandle};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Upper;

    impl ModelHandle for Upper {
        fn model_id(&self) -> &str {
            "upper"
        }
        fn infer(&self, batch: &[PipelineValue]) -> BackendResult<Vec<PipelineValue>> {
            Ok(batch
                .iter()
                .map(|v| v.as_text().unwrap_or_default().to_uppercase().into())
                .collect())
        }
    }

    #[derive(Default)]
    struct Backend {
        loads: AtomicUsize,
    }

    impl ModelBackend for Backend {
        fn name(&self) -> &str {
            "test"
        }
        fn load(&self, request: &LoadRequest) -> BackendResult<Arc<dyn ModelHandle>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if request.model_id == "missing" {
                return Err(BackendError::NotFound(request.model_id.clone()));
            }
            Ok(Arc::new(Upper))
        }
    }

    fn context(backend: Arc<Backend>) -> PipelineContext {
        PipelineContext::new()
            .with_backend(backend)
            .with_system_info(&modelflow_hardware::SystemInfo::cpu_only())
    }

    #[test]
    fn test_cpu_default_precision() {
        let backend = Arc::new(Backend::default());
        let pipeline = ModelBackedPipeline::construct(ModelSpec::new("m"), None, &context(backend)).unwrap();
        assert_eq!(pipeline.device(), Device::Cpu);
        assert_eq!(pipeline.precision(), Precision::F32);
        assert!(pipeline.is_loaded());
    }

    #[test]
    fn test_explicit_device_wins() {
        let backend = Arc::new(Backend::default());
        let mut spec = ModelSpec::new("m");
        spec.device = Some(Device::Cuda(0));
        let pipeline = ModelBackedPipeline::construct(spec, None, &context(backend)).unwrap();
        assert_eq!(pipeline.device(), Device::Cuda(0));
        assert_eq!(pipeline.precision(), Precision::F16);
    }

    #[test]
    fn test_lazy_load_defers_until_first_batch() {
        let backend = Arc::new(Backend::default());
        let mut spec = ModelSpec::new("m");
        spec.load = Some(LoadPolicy::Lazy);
        let pipeline = ModelBackedPipeline::construct(spec, None, &context(backend.clone())).unwrap();

        assert!(!pipeline.is_loaded());
        assert!(pipeline.batch(&[], 4).unwrap().is_empty());
        assert_eq!(backend.loads.load(Ordering::SeqCst), 0);

        pipeline.batch(&["a".into()], 4).unwrap();
        assert_eq!(backend.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lazy_failure_is_terminal() {
        let backend = Arc::new(Backend::default());
        let mut spec = ModelSpec::new("missing");
        spec.load = Some(LoadPolicy::Lazy);
        let pipeline = ModelBackedPipeline::construct(spec, None, &context(backend.clone())).unwrap();

        let first = pipeline.infer(&["a".into()]).unwrap_err();
        assert!(matches!(first, PipelineError::Load { .. }));

        let second = pipeline.infer(&["a".into()]).unwrap_err();
        assert!(matches!(second, PipelineError::ModelUnavailable { .. }));
        assert!(!pipeline.is_usable());
        assert_eq!(backend.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let backend = Arc::new(Backend::default());
        let pipeline = ModelBackedPipeline::construct(ModelSpec::new("m"), None, &context(backend)).unwrap();
        let err = pipeline.batch(&["a".into()], 0).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_from_params() {
        let spec = crate::spec::PipelineSpec::new("summary")
            .with_param("path", "org/model")
            .with_param("device", "cpu")
            .with_param("load", "lazy")
            .with_param("batch", 2)
            .with_param("share", true);
        let model = ModelSpec::from_params(&spec.reader("summary")).unwrap();
        assert_eq!(model.model_id, "org/model");
        assert_eq!(model.device, Some(Device::Cpu));
        assert_eq!(model.load, Some(LoadPolicy::Lazy));
        assert_eq!(model.max_batch_size, Some(2));
        assert!(model.share);
    }
}
