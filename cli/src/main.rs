//! ModelFlow CLI - build pipelines by name and run them over stdin
//!
//! No model runtime ships with the CLI, so model-backed pipelines report a
//! load error here; model-free pipelines (segmentation, tokenizer, tensors,
//! nop) run as-is.

use std::io::{self, BufRead, BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use modelflow_pipeline::{
    FactoryConfig, Pipeline, PipelineContext, PipelineFactory, PipelineSpec, PipelineType,
    PipelineValue,
};

mod args;

use crate::args::{CliArgs, Command, InputFormat};

fn main() -> Result<()> {
    let args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => FactoryConfig::default(),
    };

    match args.command {
        Command::List => list(&config),
        Command::Run {
            pipeline,
            params,
            input,
            batch,
        } => run(&config, &pipeline, params, input, batch),
        Command::Validate { path } => {
            let path = path
                .or(args.config)
                .context("no config file given (pass a path or --config)")?;
            validate(&path)
        }
        Command::Device => device(),
    }
}

fn load_config(path: &Path) -> Result<FactoryConfig> {
    FactoryConfig::from_file(path).with_context(|| format!("failed to load config {}", path.display()))
}

fn build_factory(config: &FactoryConfig) -> Result<PipelineFactory> {
    PipelineFactory::with_builtins(PipelineContext::new(), config).context("failed to register built-in pipelines")
}

fn list(config: &FactoryConfig) -> Result<()> {
    let factory = build_factory(config)?;
    for pipeline_type in PipelineType::ALL {
        let aliases = pipeline_type.aliases();
        let model = if pipeline_type.requires_model() { "model" } else { "-" };
        if aliases.is_empty() {
            println!("{:<14} {}", pipeline_type.as_str(), model);
        } else {
            println!("{:<14} {:<6} (aliases: {})", pipeline_type.as_str(), model, aliases.join(", "));
        }
    }

    let custom: Vec<String> = factory
        .registered_types()
        .into_iter()
        .filter(|id| PipelineType::from_identifier(id).is_none())
        .collect();
    if !custom.is_empty() {
        println!("other: {}", custom.join(", "));
    }

    for name in config.pipelines.keys() {
        println!("declared: {}", name);
    }
    Ok(())
}

/// Named declarations in the config win over type identifiers
fn resolve_spec(config: &FactoryConfig, pipeline: &str, params: Vec<(String, Value)>) -> PipelineSpec {
    let mut spec = match config.pipeline(pipeline) {
        Some(declared) => {
            info!("Using pipeline '{}' declared in config", pipeline);
            declared.clone()
        }
        None => PipelineSpec::new(pipeline),
    };
    spec.params.extend(params);
    spec
}

fn parse_input(format: InputFormat, line: &str, number: usize) -> Result<PipelineValue> {
    match format {
        InputFormat::Text => Ok(PipelineValue::Text(line.to_string())),
        InputFormat::Json => {
            let value: Value =
                serde_json::from_str(line).with_context(|| format!("line {} is not valid JSON", number))?;
            Ok(value.into())
        }
    }
}

fn render(value: PipelineValue) -> Result<String> {
    let json = match value {
        PipelineValue::Text(text) => Value::String(text),
        PipelineValue::Json(json) => json,
        other => serde_json::to_value(&other)?,
    };
    Ok(serde_json::to_string(&json)?)
}

fn run(
    config: &FactoryConfig,
    pipeline: &str,
    params: Vec<(String, Value)>,
    input: InputFormat,
    batch: usize,
) -> Result<()> {
    if batch == 0 {
        bail!("--batch must be greater than zero");
    }

    let factory = build_factory(config)?;
    let spec = resolve_spec(config, pipeline, params);
    let pipeline = factory
        .create(&spec)
        .with_context(|| format!("failed to build pipeline '{}'", spec.pipeline_type))?;
    info!(
        "Running '{}' ({} -> {})",
        pipeline.pipeline_type(),
        pipeline.input_kind(),
        pipeline.output_kind()
    );

    let stdin = io::stdin();
    let mut out = BufWriter::new(io::stdout().lock());
    let processed = process_lines(pipeline.as_ref(), input, batch, stdin.lock(), &mut out)?;
    out.flush()?;

    info!("Processed {} input(s)", processed);
    Ok(())
}

/// Feed non-blank lines of `reader` through `pipeline` in batches of `batch`,
/// writing one JSON line per output. Returns the number of inputs processed.
fn process_lines(
    pipeline: &dyn Pipeline,
    input: InputFormat,
    batch: usize,
    reader: impl BufRead,
    out: &mut impl Write,
) -> Result<usize> {
    let mut pending = Vec::with_capacity(batch);
    let mut processed = 0;

    for (index, line) in reader.lines().enumerate() {
        let line = line.context("failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let number = index + 1;
        pending.push((number, parse_input(input, &line, number)?));
        if pending.len() == batch {
            processed += flush(pipeline, &mut pending, out)?;
        }
    }
    if !pending.is_empty() {
        processed += flush(pipeline, &mut pending, out)?;
    }
    Ok(processed)
}

/// Run the pending inputs, tagged with their line numbers, as one batch
fn flush(
    pipeline: &dyn Pipeline,
    pending: &mut Vec<(usize, PipelineValue)>,
    out: &mut impl Write,
) -> Result<usize> {
    let (lines, inputs): (Vec<usize>, Vec<PipelineValue>) = std::mem::take(pending).into_iter().unzip();
    let outputs = pipeline.invoke_many(inputs).map_err(|e| match e.index().and_then(|i| lines.get(i)) {
        Some(line) => anyhow::Error::new(e).context(format!("line {} failed", line)),
        None => anyhow::Error::new(e),
    })?;

    for output in outputs {
        writeln!(out, "{}", render(output)?)?;
    }
    Ok(lines.len())
}

fn validate(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    let factory = build_factory(&config)?;

    let mut unknown = Vec::new();
    for (name, spec) in &config.pipelines {
        if factory.contains(&spec.pipeline_type) {
            println!("ok       {} ({})", name, spec.pipeline_type);
        } else {
            println!("unknown  {} ({})", name, spec.pipeline_type);
            unknown.push(name.as_str());
        }
    }

    if !unknown.is_empty() {
        bail!("{} declaration(s) with unknown type: {}", unknown.len(), unknown.join(", "));
    }
    println!(
        "{}: {} pipeline(s), cache {}",
        path.display(),
        config.pipelines.len(),
        if config.cache { "on" } else { "off" }
    );
    Ok(())
}

fn device() -> Result<()> {
    let recommendation = match modelflow_hardware::detect_system() {
        Ok(system) => system.recommended_device(),
        Err(e) => {
            warn!("Hardware detection failed, assuming CPU: {}", e);
            modelflow_hardware::SystemInfo::cpu_only().recommended_device()
        }
    };
    println!(
        "{} ({}) - {}",
        recommendation.device, recommendation.precision, recommendation.reason
    );
    Ok(())
}
