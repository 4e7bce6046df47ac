//! Shared construction context
//!
//! Everything a constructor may need besides its own parameters: backends,
//! retrievers, the handle pool, runtime defaults and the detected hardware.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use modelflow_hardware::{detect_system, DeviceRecommendation, SystemInfo};

use crate::backend::{ModelBackend, Retriever, TrainingBackend};
use crate::config::RuntimeDefaults;
use crate::handles::HandlePool;

/// Name a retriever is registered under when none is given
pub const DEFAULT_RETRIEVER: &str = "default";

#[derive(Clone, Default)]
pub struct PipelineContext {
    backend: Option<Arc<dyn ModelBackend>>,
    training: Option<Arc<dyn TrainingBackend>>,
    retrievers: HashMap<String, Arc<dyn Retriever>>,
    handles: Arc<HandlePool>,
    defaults: RuntimeDefaults,
    hardware: Arc<OnceLock<DeviceRecommendation>>,
}

impl PipelineContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: Arc<dyn ModelBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_training_backend(mut self, training: Arc<dyn TrainingBackend>) -> Self {
        self.training = Some(training);
        self
    }

    pub fn with_retriever(self, retriever: Arc<dyn Retriever>) -> Self {
        self.with_named_retriever(DEFAULT_RETRIEVER, retriever)
    }

    pub fn with_named_retriever(mut self, name: impl Into<String>, retriever: Arc<dyn Retriever>) -> Self {
        self.retrievers.insert(name.into(), retriever);
        self
    }

    pub fn with_handle_pool(mut self, handles: Arc<HandlePool>) -> Self {
        self.handles = handles;
        self
    }

    pub fn with_defaults(mut self, defaults: RuntimeDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Use `system` instead of probing the host for the default device
    pub fn with_system_info(self, system: &SystemInfo) -> Self {
        let hardware = OnceLock::new();
        let _ = hardware.set(system.recommended_device());
        Self {
            hardware: Arc::new(hardware),
            ..self
        }
    }

    pub fn backend(&self) -> Option<&Arc<dyn ModelBackend>> {
        self.backend.as_ref()
    }

    pub fn training_backend(&self) -> Option<&Arc<dyn TrainingBackend>> {
        self.training.as_ref()
    }

    pub fn retriever(&self, name: &str) -> Option<&Arc<dyn Retriever>> {
        self.retrievers.get(name)
    }

    pub fn handles(&self) -> &Arc<HandlePool> {
        &self.handles
    }

    pub fn defaults(&self) -> &RuntimeDefaults {
        &self.defaults
    }

    /// Hardware-derived device default. Detection runs at most once per
    /// context; failed detection falls back to CPU.
    pub fn recommended_device(&self) -> &DeviceRecommendation {
        self.hardware.get_or_init(|| match detect_system() {
            Ok(system) => {
                let rec = system.recommended_device();
                log::info!("Default device: {} ({}) - {}", rec.device, rec.precision, rec.reason);
                rec
            }
            Err(e) => {
                log::warn!("Hardware detection failed, defaulting to CPU: {}", e);
                SystemInfo::cpu_only().recommended_device()
            }
        })
    }
}
