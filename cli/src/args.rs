//! Command-line arguments for the modelflow CLI.
//!
//! Supports:
//! - CLI arguments (highest priority)
//! - Environment variables
//! - TOML factory config file

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;

#[derive(Parser, Debug, Clone)]
#[command(name = "modelflow")]
#[command(about = "Build pipelines by name and run them over stdin")]
#[command(version)]
pub struct CliArgs {
    /// Factory config file (defaults, cache, named pipelines)
    #[arg(long, short = 'c', global = true, env = "MODELFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "modelflow=info,modelflow_pipeline=info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List registered pipeline types and aliases
    List,

    /// Build a pipeline and run it over stdin, one input per line
    Run {
        /// Pipeline type, alias, or the name of a pipeline declared in the config
        pipeline: String,

        /// Pipeline parameter as key=value (value parsed as JSON when possible)
        #[arg(long = "param", short = 'p', value_parser = parse_param)]
        params: Vec<(String, Value)>,

        /// How each stdin line is turned into an input
        #[arg(long, value_enum, default_value = "text")]
        input: InputFormat,

        /// Inputs per invocation
        #[arg(long, default_value = "16")]
        batch: usize,
    },

    /// Parse a config file and check every declared pipeline type
    Validate {
        /// Config file to check (defaults to --config)
        path: Option<PathBuf>,
    },

    /// Show the device and precision model pipelines default to
    Device,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InputFormat {
    /// Every line is a text input
    Text,
    /// Every line is a JSON value
    Json,
}

/// Parse `key=value`. Values that are valid JSON keep their type, anything
/// else is a string.
pub fn parse_param(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow!("parameter name must not be empty"));
    }

    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
