//! Explicit model handle sharing
//!
//! Pipelines own their handles unless they opt into a [`HandlePool`], which
//! keeps one [`LoadedModel`] per checkpoint identity. Inference on a loaded
//! model is serialized unless the handle says it can run concurrently.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use modelflow_hardware::{Device, Precision};
use modelflow_values::PipelineValue;

use crate::backend::{BackendResult, LoadRequest, ModelHandle};

/// Identity of a loaded checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointKey {
    pub model_id: String,
    pub revision: Option<String>,
    pub device: Device,
    pub precision: Precision,
}

impl From<&LoadRequest> for CheckpointKey {
    fn from(request: &LoadRequest) -> Self {
        Self {
            model_id: request.model_id.clone(),
            revision: request.revision.clone(),
            device: request.device,
            precision: request.precision,
        }
    }
}

/// A handle together with the lock that serializes its inference
pub struct LoadedModel {
    key: CheckpointKey,
    handle: Arc<dyn ModelHandle>,
    gate: Mutex<()>,
}

impl LoadedModel {
    pub fn new(key: CheckpointKey, handle: Arc<dyn ModelHandle>) -> Self {
        Self {
            key,
            handle,
            gate: Mutex::new(()),
        }
    }

    pub fn key(&self) -> &CheckpointKey {
        &self.key
    }

    pub fn handle(&self) -> &Arc<dyn ModelHandle> {
        &self.handle
    }

    pub fn infer(&self, batch: &[PipelineValue]) -> BackendResult<Vec<PipelineValue>> {
        if self.handle.supports_concurrent_inference() {
            return self.handle.infer(batch);
        }
        let _guard = self.gate.lock();
        self.handle.infer(batch)
    }
}

/// Shared, read-only model handles keyed by checkpoint identity
#[derive(Default)]
pub struct HandlePool {
    models: DashMap<CheckpointKey, Arc<LoadedModel>>,
}

impl HandlePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the pooled model for `key`, calling `loader` only when none is
    /// pooled yet. Concurrent callers for the same key load once.
    pub fn acquire<F>(&self, key: &CheckpointKey, loader: F) -> BackendResult<Arc<LoadedModel>>
    where
        F: FnOnce() -> BackendResult<Arc<dyn ModelHandle>>,
    {
        match self.models.entry(key.clone()) {
            Entry::Occupied(entry) => {
                log::debug!("Reusing pooled model {} on {}", key.model_id, key.device);
                Ok(Arc::clone(entry.get()))
            }
            Entry::Vacant(entry) => {
                let model = Arc::new(LoadedModel::new(key.clone(), loader()?));
                entry.insert(Arc::clone(&model));
                log::info!("Pooled model {} on {} ({})", key.model_id, key.device, key.precision);
                Ok(model)
            }
        }
    }

    pub fn get(&self, key: &CheckpointKey) -> Option<Arc<LoadedModel>> {
        self.models.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Drop `key` from the pool. Pipelines already holding it keep their reference.
    pub fn remove(&self, key: &CheckpointKey) -> bool {
        self.models.remove(key).is_some()
    }

    /// Drop `key` only while it still maps to `model`
    pub fn remove_if_same(&self, key: &CheckpointKey, model: &Arc<LoadedModel>) -> bool {
        self.models
            .remove_if(key, |_, pooled| Arc::ptr_eq(pooled, model))
            .is_some()
    }

    /// Drop every model no pipeline references anymore, returning how many were dropped
    pub fn release_unused(&self) -> usize {
        let before = self.models.len();
        self.models.retain(|_, model| Arc::strong_count(model) > 1);
        let released = before.saturating_sub(self.models.len());
        if released > 0 {
            log::info!("Released {} unused model handle(s)", released);
        }
        released
    }

    pub fn contains(&self, key: &CheckpointKey) -> bool {
        self.models.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn clear(&self) {
        self.models.clear();
    }
}
