//! Declarative pipeline descriptions
//!
//! A [`PipelineSpec`] is a type identifier plus a parameter table. Parameters
//! live in a `BTreeMap`, so serializing them always produces the same JSON
//! for equal parameters; that string is the cache fingerprint.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PipelineError, Result};

pub type Params = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    #[serde(rename = "type")]
    pub pipeline_type: String,

    #[serde(default)]
    pub params: Params,
}

impl PipelineSpec {
    pub fn new(pipeline_type: impl Into<String>) -> Self {
        Self {
            pipeline_type: pipeline_type.into(),
            params: Params::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// Canonical JSON of the parameters
    pub fn fingerprint(&self) -> String {
        // Map<String, Value> serialization cannot fail
        serde_json::to_string(&self.params).unwrap_or_default()
    }

    /// Typed access to parameters, reporting errors against `pipeline`
    pub fn reader<'a>(&'a self, pipeline: &'a str) -> ParamReader<'a> {
        ParamReader {
            pipeline,
            params: &self.params,
        }
    }
}

/// Typed parameter lookups. Missing keys and explicit `null` read as `None`;
/// present values of the wrong shape are `InvalidParameter` errors.
#[derive(Debug, Clone, Copy)]
pub struct ParamReader<'a> {
    pipeline: &'a str,
    params: &'a Params,
}

impl<'a> ParamReader<'a> {
    pub fn pipeline(&self) -> &'a str {
        self.pipeline
    }

    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.params.get(key).filter(|v| !v.is_null())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn error(&self, key: &str, message: impl Into<String>) -> PipelineError {
        PipelineError::invalid_parameter(self.pipeline, key, message)
    }

    pub fn str(&self, key: &str) -> Result<Option<&'a str>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(self.error(key, format!("expected a string, got {}", other))),
        }
    }

    /// First present key among `keys`
    pub fn first_str(&self, keys: &[&str]) -> Result<Option<&'a str>> {
        for key in keys {
            if let Some(value) = self.str(key)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    pub fn required_str(&self, key: &str) -> Result<&'a str> {
        match self.str(key)? {
            Some(s) if !s.trim().is_empty() => Ok(s),
            Some(_) => Err(self.error(key, "must not be empty")),
            None => Err(self.error(key, "is required")),
        }
    }

    pub fn u64(&self, key: &str) -> Result<Option<u64>> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_u64()
                .map(Some)
                .ok_or_else(|| self.error(key, format!("expected a non-negative integer, got {}", value))),
        }
    }

    pub fn usize(&self, key: &str) -> Result<Option<usize>> {
        match self.u64(key)? {
            None => Ok(None),
            Some(n) => usize::try_from(n)
                .map(Some)
                .map_err(|_| self.error(key, "value out of range")),
        }
    }

    /// Like [`usize`](Self::usize) but rejects zero
    pub fn positive(&self, key: &str) -> Result<Option<usize>> {
        match self.usize(key)? {
            Some(0) => Err(self.error(key, "must be greater than zero")),
            other => Ok(other),
        }
    }

    pub fn f64(&self, key: &str) -> Result<Option<f64>> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => match value.as_f64() {
                Some(n) if n.is_finite() => Ok(Some(n)),
                _ => Err(self.error(key, format!("expected a number, got {}", value))),
            },
        }
    }

    pub fn bool(&self, key: &str) -> Result<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(self.error(key, format!("expected a boolean, got {}", other))),
        }
    }

    /// List of strings, given either as an array or a comma-separated string
    pub fn strings(&self, key: &str) -> Result<Option<Vec<String>>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(
                s.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            )),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| self.error(key, format!("expected strings, got {}", item)))
                })
                .collect::<Result<Vec<_>>>()
                .map(Some),
            Some(other) => Err(self.error(key, format!("expected a list of strings, got {}", other))),
        }
    }

    /// Parse a string parameter through `FromStr` (devices, precisions, modes)
    pub fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.str(key)? {
            None => Ok(None),
            Some(s) => s.parse::<T>().map(Some).map_err(|e| self.error(key, e.to_string())),
        }
    }

    /// Nested table, passed through as-is
    pub fn table(&self, key: &str) -> Result<Params> {
        match self.get(key) {
            None => Ok(Params::new()),
            Some(Value::Object(map)) => Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
            Some(other) => Err(self.error(key, format!("expected a table, got {}", other))),
        }
    }
}
