//! Factory integration tests: registration, resolution, caching and
//! config-driven construction

mod common;

use std::sync::Arc;

use common::{context, factory, init_logging, text_of, texts, EchoBackend, MISSING_MODEL};
use modelflow_pipeline::{
    constructor, FactoryConfig, NopPipeline, Pipeline, PipelineContext, PipelineError,
    PipelineFactory, PipelineSpec, PipelineType, PipelineValue, ValueKind,
};

/// Upper-cases text, the smallest possible custom pipeline
struct Shout;

impl Pipeline for Shout {
    fn pipeline_type(&self) -> &str {
        "shout"
    }

    fn input_kind(&self) -> ValueKind {
        ValueKind::Text
    }

    fn output_kind(&self) -> ValueKind {
        ValueKind::Text
    }

    fn run_batch(&self, inputs: &[PipelineValue]) -> modelflow_pipeline::Result<Vec<PipelineValue>> {
        Ok(inputs
            .iter()
            .map(|v| PipelineValue::Text(v.as_text().unwrap_or_default().to_uppercase()))
            .collect())
    }
}

fn shout(_: &PipelineSpec, _: &PipelineContext) -> modelflow_pipeline::Result<Shout> {
    Ok(Shout)
}

#[test]
fn test_builtins_registered() {
    println!("\n🧪 Testing built-in registrations...");
    init_logging();

    let factory = factory(PipelineContext::new(), false);
    for pipeline_type in PipelineType::ALL {
        assert!(factory.contains(pipeline_type.as_str()), "{} missing", pipeline_type);
        for alias in pipeline_type.aliases() {
            assert!(factory.contains(alias), "alias {} missing", alias);
        }
    }

    let types = factory.registered_types();
    let mut sorted = types.clone();
    sorted.sort();
    assert_eq!(types, sorted);
    println!("✅ {} identifiers registered", types.len());
}

#[test]
fn test_register_and_create_custom() {
    println!("\n🧪 Testing custom registration...");
    init_logging();

    let factory = PipelineFactory::new(PipelineContext::new());
    factory.register("echo", constructor(shout)).unwrap();

    let pipeline = factory.create(&PipelineSpec::new("echo")).unwrap();
    let out = pipeline.invoke_one("hello".into()).unwrap();
    assert_eq!(text_of(&out), "HELLO");

    let err = factory.register("echo", constructor(shout)).unwrap_err();
    assert!(matches!(err, PipelineError::DuplicateRegistration(id) if id == "echo"));
    println!("✅ Custom pipeline registered once and built");
}

#[test]
fn test_unknown_type() {
    let factory = factory(PipelineContext::new(), true);
    let err = factory.create(&PipelineSpec::new("ghost")).err().unwrap();
    assert!(matches!(err, PipelineError::UnknownType(ref t) if t == "ghost"));
    assert_eq!(factory.cached_len(), 0);
}

#[test]
fn test_alias_resolves_to_canonical() {
    let backend = EchoBackend::new();
    let factory = factory(context(&backend), true);

    let spec = |identifier: &str| PipelineSpec::new(identifier).with_param("model", "sshleifer/distilbart");
    let canonical = factory.create(&spec("summary")).unwrap();
    let aliased = factory.create(&spec("summarization")).unwrap();

    assert_eq!(aliased.pipeline_type(), "summary");
    assert!(Arc::ptr_eq(&canonical, &aliased));
    assert_eq!(backend.loads(), 1);
}

#[test]
fn test_cache_shares_equal_specs() {
    println!("\n🧪 Testing instance cache...");
    init_logging();

    let backend = EchoBackend::new();
    let factory = factory(context(&backend), true);

    let a = PipelineSpec::new("llm")
        .with_param("model", "Qwen/Qwen2-0.5B")
        .with_param("temperature", 0.2);
    // Same params, different insertion order
    let b = PipelineSpec::new("llm")
        .with_param("temperature", 0.2)
        .with_param("model", "Qwen/Qwen2-0.5B");
    let c = PipelineSpec::new("llm")
        .with_param("model", "Qwen/Qwen2-0.5B")
        .with_param("temperature", 0.7);

    let first = factory.create(&a).unwrap();
    let second = factory.create(&b).unwrap();
    let third = factory.create(&c).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(factory.cached_len(), 2);
    assert_eq!(backend.loads(), 2);

    assert!(factory.evict(&a));
    assert!(!factory.evict(&a));
    let rebuilt = factory.create(&a).unwrap();
    assert!(!Arc::ptr_eq(&first, &rebuilt));
    println!("✅ Cache keyed by resolved type and params");
}

#[test]
fn test_cache_disabled_builds_fresh() {
    let factory = factory(PipelineContext::new(), false);
    let spec = PipelineSpec::new("nop");
    let a = factory.create(&spec).unwrap();
    let b = factory.create(&spec).unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(factory.cached_len(), 0);
}

#[test]
fn test_failed_construction_is_not_cached() {
    let backend = EchoBackend::new();
    let factory = factory(context(&backend), true);

    let spec = PipelineSpec::new("summary").with_param("model", MISSING_MODEL);
    let err = factory.create(&spec).err().unwrap();
    assert!(matches!(err, PipelineError::Load { ref model_id, .. } if model_id == MISSING_MODEL));
    assert_eq!(factory.cached_len(), 0);

    // A parameter error names the pipeline and the parameter
    let bad = PipelineSpec::new("summary")
        .with_param("model", "m")
        .with_param("minlength", 50)
        .with_param("maxlength", 10);
    match factory.create(&bad).err().unwrap() {
        PipelineError::InvalidParameter { pipeline, parameter, .. } => {
            assert_eq!(pipeline, "summary");
            assert_eq!(parameter, "minlength");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_register_overwrite_evicts() {
    println!("\n🧪 Testing overwrite...");
    init_logging();

    let factory = factory(PipelineContext::new(), true);
    let spec = PipelineSpec::new("nop");
    let before = factory.create(&spec).unwrap();
    assert_eq!(before.invoke_one("quiet".into()).unwrap(), PipelineValue::from("quiet"));

    assert!(factory.register_overwrite("nop", constructor(shout)));
    let after = factory.create(&spec).unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(text_of(&after.invoke_one("quiet".into()).unwrap()), "QUIET");

    // The old instance keeps working for whoever holds it
    assert_eq!(text_of(&before.invoke_one("still".into()).unwrap()), "still");

    assert!(!factory.register_overwrite("brand-new", constructor(NopPipeline::from_spec)));
    println!("✅ Overwrite replaced constructor and dropped cached instance");
}

#[test]
fn test_create_all_from_toml() {
    println!("\n🧪 Testing config-driven construction...");
    init_logging();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pipelines.toml");
    std::fs::write(
        &path,
        r#"
cache = true

[defaults]
device = "cpu"
max_batch_size = 4

[pipelines.sentences]
type = "segmentation"
params = { mode = "sentences" }

[pipelines.words]
type = "tokenizer"
params = { stopwords = true }

[pipelines.digest]
type = "summarization"

[pipelines.digest.params]
model = "sshleifer/distilbart-cnn-12-6"
maxlength = 60
"#,
    )
    .unwrap();

    let config = FactoryConfig::from_file(&path).unwrap();
    let backend = EchoBackend::new();
    let factory = PipelineFactory::with_builtins(
        PipelineContext::new().with_backend(backend.clone()),
        &config,
    )
    .unwrap();

    let pipelines = factory.create_all(&config).unwrap();
    assert_eq!(pipelines.len(), 3);
    assert_eq!(pipelines["digest"].pipeline_type(), "summary");

    let request = backend.last_request().unwrap();
    assert_eq!(request.model_id, "sshleifer/distilbart-cnn-12-6");
    assert_eq!(request.device.to_string(), "cpu");
    assert_eq!(request.task.as_deref(), Some("summarization"));

    let out = pipelines["sentences"]
        .invoke_many(texts(&["One. Two."]))
        .unwrap();
    assert_eq!(out.len(), 1);
    println!("✅ Built {} pipelines from {}", pipelines.len(), path.display());
}

#[test]
fn test_create_all_names_bad_declaration() {
    let config = FactoryConfig::from_toml_str(
        r#"
[pipelines.good]
type = "nop"

[pipelines.bad]
type = "ghost"
"#,
    )
    .unwrap();

    let factory = factory(PipelineContext::new(), false);
    match factory.create_all(&config).err().unwrap() {
        PipelineError::InvalidConfiguration(message) => {
            assert!(message.contains("bad"));
            assert!(message.contains("ghost"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_model_pipeline_without_backend() {
    let factory = factory(PipelineContext::new(), false);
    let err = factory
        .create(&PipelineSpec::new("llm").with_param("model", "gpt2"))
        .err()
        .unwrap();
    assert!(matches!(err, PipelineError::Load { .. }));
}
