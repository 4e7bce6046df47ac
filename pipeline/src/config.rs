//! Factory configuration
//!
//! Loaded from TOML:
//!
//! ```toml
//! cache = true
//!
//! [defaults]
//! device = "cpu"
//! max_batch_size = 16
//!
//! [pipelines.summarize]
//! type = "summary"
//! params = { model = "sshleifer/distilbart-cnn-12-6", maxlength = 60 }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use modelflow_hardware::{Device, Precision};

use crate::error::{PipelineError, Result};
use crate::model::LoadPolicy;
use crate::spec::PipelineSpec;

/// Sub-batch size used when neither the pipeline nor the config sets one
pub const DEFAULT_MAX_BATCH_SIZE: usize = 32;

/// Values applied to model-backed pipelines that do not set their own
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeDefaults {
    pub device: Option<Device>,
    pub precision: Option<Precision>,
    pub max_batch_size: Option<usize>,
    pub load: Option<LoadPolicy>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactoryConfig {
    /// Reuse instances for structurally equal specs
    pub cache: bool,

    pub defaults: RuntimeDefaults,

    /// Named pipeline declarations
    pub pipelines: BTreeMap<String, PipelineSpec>,
}

impl FactoryConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("Loading factory config from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.defaults.max_batch_size == Some(0) {
            return Err(PipelineError::InvalidConfiguration(
                "defaults.max_batch_size must be greater than zero".to_string(),
            ));
        }
        for (name, spec) in &self.pipelines {
            if spec.pipeline_type.trim().is_empty() {
                return Err(PipelineError::InvalidConfiguration(format!(
                    "pipeline '{}' has an empty type",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn pipeline(&self, name: &str) -> Option<&PipelineSpec> {
        self.pipelines.get(name)
    }
}
