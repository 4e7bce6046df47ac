//! Model-backed pipeline integration tests: loading, sub-batching, handle
//! sharing and failure handling

mod common;

use std::sync::Arc;
use std::thread;

use common::{
    context, init_logging, text_of, texts, EchoBackend, BROKEN_MODEL, FLAKY_MODEL,
    FLAKY_ONCE_MODEL, MISSING_MODEL, SLOW_MODEL,
};
use modelflow_pipeline::{
    Device, HandlePool, LoadPolicy, ModelBackedPipeline, ModelSpec, Pipeline, PipelineContext,
    PipelineError, PipelineSpec, Precision, RuntimeDefaults, SummaryPipeline,
};

fn spec(model_id: &str) -> ModelSpec {
    ModelSpec::new(model_id)
}

#[test]
fn test_eager_load_at_construction() {
    println!("\n🧪 Testing eager load...");
    init_logging();

    let backend = EchoBackend::new();
    let model = ModelBackedPipeline::construct(spec("gpt2"), Some("text-generation"), &context(&backend)).unwrap();

    assert!(model.is_loaded());
    assert_eq!(backend.loads(), 1);
    assert_eq!(model.device(), Device::Cpu);
    assert_eq!(model.precision(), Precision::F32);
    println!("✅ Loaded {} on {}", model.model_id(), model.device());
}

#[test]
fn test_eager_failure_fails_construction() {
    let backend = EchoBackend::new();
    let err = ModelBackedPipeline::construct(spec(MISSING_MODEL), None, &context(&backend))
        .err()
        .unwrap();
    match err {
        PipelineError::Load { model_id, message } => {
            assert_eq!(model_id, MISSING_MODEL);
            assert!(message.contains("not found"), "{}", message);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_lazy_failure_is_terminal() {
    println!("\n🧪 Testing lazy load failure...");
    init_logging();

    let backend = EchoBackend::new();
    let model = ModelBackedPipeline::construct(
        ModelSpec {
            load: Some(LoadPolicy::Lazy),
            ..spec(MISSING_MODEL)
        },
        None,
        &context(&backend),
    )
    .unwrap();
    assert!(!model.is_loaded());
    assert!(model.is_usable());

    let first = model.infer(&texts(&["a"])).unwrap_err();
    assert!(matches!(first, PipelineError::Load { .. }));
    assert!(!model.is_usable());

    // No silent retry on later calls
    let second = model.infer(&texts(&["a"])).unwrap_err();
    assert!(second.is_terminal());
    assert_eq!(backend.requests().len(), 1);
    println!("✅ Failed load stays failed until reload");
}

#[test]
fn test_empty_batch_never_loads() {
    let backend = EchoBackend::new();
    let model = ModelBackedPipeline::construct(
        ModelSpec {
            load: Some(LoadPolicy::Lazy),
            ..spec("gpt2")
        },
        None,
        &context(&backend),
    )
    .unwrap();

    assert!(model.infer(&[]).unwrap().is_empty());
    assert_eq!(backend.loads(), 0);
    assert_eq!(backend.infer_calls(), 0);
}

#[test]
fn test_sub_batches_preserve_order() {
    println!("\n🧪 Testing sub-batching...");
    init_logging();

    let backend = EchoBackend::new();
    let model = ModelBackedPipeline::construct(
        ModelSpec {
            max_batch_size: Some(3),
            ..spec("gpt2")
        },
        None,
        &context(&backend),
    )
    .unwrap();

    let inputs: Vec<_> = (0..8).map(|i| format!("item-{}", i)).collect();
    let refs: Vec<&str> = inputs.iter().map(String::as_str).collect();
    let outputs = model.infer(&texts(&refs)).unwrap();

    let got: Vec<&str> = outputs.iter().map(text_of).collect();
    assert_eq!(got, refs);
    assert_eq!(backend.batch_sizes(), vec![3, 3, 2]);

    // Explicit size overrides the configured one
    let again = model.batch(&texts(&refs), 5).unwrap();
    assert_eq!(again, outputs);
    assert_eq!(&backend.batch_sizes()[3..], &[5, 3]);

    assert!(matches!(
        model.batch(&texts(&refs), 0),
        Err(PipelineError::InvalidConfiguration(_))
    ));
    println!("✅ 8 inputs in sub-batches, order kept");
}

#[test]
fn test_runtime_defaults_apply() {
    let backend = EchoBackend::new();
    let context = PipelineContext::new()
        .with_backend(backend.clone())
        .with_defaults(RuntimeDefaults {
            device: Some(Device::Cuda(1)),
            max_batch_size: Some(2),
            ..RuntimeDefaults::default()
        });

    let model = ModelBackedPipeline::construct(spec("gpt2"), None, &context).unwrap();
    assert_eq!(model.device(), Device::Cuda(1));
    assert_eq!(model.precision(), Precision::F16);
    assert_eq!(model.max_batch_size(), 2);

    // Explicit settings win
    let pinned = ModelBackedPipeline::construct(
        ModelSpec {
            device: Some(Device::Cpu),
            precision: Some(Precision::Bf16),
            ..spec("gpt2")
        },
        None,
        &context,
    )
    .unwrap();
    assert_eq!(pinned.device(), Device::Cpu);
    assert_eq!(pinned.precision(), Precision::Bf16);
}

#[test]
fn test_inference_error_carries_index_and_keeps_instance() {
    println!("\n🧪 Testing inference failure...");
    init_logging();

    let backend = EchoBackend::new();
    let model = ModelBackedPipeline::construct(
        ModelSpec {
            max_batch_size: Some(2),
            ..spec(BROKEN_MODEL)
        },
        None,
        &context(&backend),
    )
    .unwrap();

    let err = model
        .infer(&texts(&["fine", "fine", "fine", "boom"]))
        .unwrap_err();
    // Failing sub-batch starts at index 2
    assert!(matches!(err, PipelineError::Inference { .. }));
    assert_eq!(err.index(), Some(2));

    assert!(model.is_usable());
    assert_eq!(model.infer(&texts(&["still fine"])).unwrap().len(), 1);
    println!("✅ Failure reported at the failing sub-batch, instance reusable");
}

#[test]
fn test_handle_lost_invalidates() {
    println!("\n🧪 Testing lost handle...");
    init_logging();

    let backend = EchoBackend::new();
    let model = ModelBackedPipeline::construct(spec(FLAKY_MODEL), None, &context(&backend)).unwrap();

    let err = model.infer(&texts(&["a"])).unwrap_err();
    assert!(matches!(err, PipelineError::ModelUnavailable { .. }));
    assert!(!model.is_usable());
    assert!(!model.is_loaded());

    let calls = backend.infer_calls();
    assert!(model.infer(&texts(&["b"])).unwrap_err().is_terminal());
    assert_eq!(backend.infer_calls(), calls, "invalid handle must not be used again");

    model.reload().unwrap();
    assert!(model.is_usable());
    assert_eq!(backend.loads(), 2);
    println!("✅ Lost handle marked the instance unusable until reload");
}

#[test]
fn test_shared_pool_loads_once() {
    println!("\n🧪 Testing shared handles...");
    init_logging();

    let backend = EchoBackend::new();
    let pool = Arc::new(HandlePool::new());
    let context = context(&backend).with_handle_pool(Arc::clone(&pool));
    let shared = ModelSpec {
        share: true,
        ..spec("gpt2")
    };

    let a = ModelBackedPipeline::construct(shared.clone(), None, &context).unwrap();
    let b = ModelBackedPipeline::construct(shared, None, &context).unwrap();
    assert_eq!(backend.loads(), 1);
    assert_eq!(pool.len(), 1);
    assert!(pool.contains(a.checkpoint()));
    assert_eq!(a.checkpoint(), b.checkpoint());

    // Private handle is not pooled
    let private = ModelBackedPipeline::construct(spec("gpt2"), None, &context).unwrap();
    assert_eq!(backend.loads(), 2);
    assert_eq!(pool.len(), 1);
    drop(private);

    a.unload().unwrap();
    assert_eq!(pool.len(), 1, "b still holds the handle");
    b.unload().unwrap();
    assert_eq!(pool.len(), 0);
    println!("✅ One load served two pipelines");
}

#[test]
fn test_stale_sharer_keeps_healthy_pooled_handle() {
    println!("\n🧪 Testing a lost shared handle that was already replaced...");
    init_logging();

    let backend = EchoBackend::new();
    let pool = Arc::new(HandlePool::new());
    let context = context(&backend).with_handle_pool(Arc::clone(&pool));
    let shared = ModelSpec {
        share: true,
        ..spec(FLAKY_ONCE_MODEL)
    };

    // a and b share the first handle, which is dead
    let a = ModelBackedPipeline::construct(shared.clone(), None, &context).unwrap();
    let b = ModelBackedPipeline::construct(shared.clone(), None, &context).unwrap();
    assert_eq!(backend.loads(), 1);

    assert!(a.infer(&texts(&["x"])).unwrap_err().is_terminal());
    assert!(pool.is_empty(), "dead handle leaves the pool");

    // c pools a fresh, healthy handle
    let c = ModelBackedPipeline::construct(shared.clone(), None, &context).unwrap();
    assert_eq!(backend.loads(), 2);

    // b still holds the dead one; its failure must not evict c's handle
    assert!(b.infer(&texts(&["y"])).unwrap_err().is_terminal());
    assert!(pool.contains(c.checkpoint()));
    assert_eq!(pool.len(), 1);

    let d = ModelBackedPipeline::construct(shared, None, &context).unwrap();
    assert_eq!(backend.loads(), 2);
    assert_eq!(text_of(&d.infer(&texts(&["z"])).unwrap()[0]), "z");

    // Reload picks up the pooled healthy handle instead of loading again
    b.reload().unwrap();
    assert_eq!(backend.loads(), 2);
    assert_eq!(text_of(&b.infer(&texts(&["w"])).unwrap()[0]), "w");
    println!("✅ Healthy pooled handle survived the stale failure");
}

#[test]
fn test_concurrent_callers_on_shared_handle() {
    let backend = EchoBackend::new();
    let context = context(&backend);
    let model = Arc::new(
        ModelBackedPipeline::construct(
            ModelSpec {
                share: true,
                max_batch_size: Some(2),
                ..spec("gpt2")
            },
            None,
            &context,
        )
        .unwrap(),
    );

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let model = Arc::clone(&model);
            thread::spawn(move || {
                let inputs: Vec<String> = (0..5).map(|i| format!("w{}-{}", worker, i)).collect();
                let refs: Vec<&str> = inputs.iter().map(String::as_str).collect();
                let outputs = model.infer(&texts(&refs)).unwrap();
                let got: Vec<String> = outputs.iter().map(|o| text_of(o).to_string()).collect();
                assert_eq!(got, inputs);
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(backend.loads(), 1);
}

#[test]
fn test_timeout_between_sub_batches() {
    println!("\n🧪 Testing sub-batch timeout...");
    init_logging();

    let backend = EchoBackend::new();
    let model = ModelBackedPipeline::construct(
        ModelSpec {
            max_batch_size: Some(1),
            timeout_ms: Some(10),
            ..spec(SLOW_MODEL)
        },
        None,
        &context(&backend),
    )
    .unwrap();

    match model.infer(&texts(&["a", "b", "c"])).unwrap_err() {
        PipelineError::Timeout { completed, elapsed_ms } => {
            assert_eq!(completed, 1);
            assert!(elapsed_ms >= 10);
        }
        other => panic!("unexpected error: {other}"),
    }
    // A single sub-batch always runs to completion
    assert_eq!(model.infer(&texts(&["a"])).unwrap().len(), 1);
    println!("✅ Timeout checked at sub-batch boundaries");
}

#[test]
fn test_variant_reports_unusable_after_loss() {
    let backend = EchoBackend::new();
    let pipeline = SummaryPipeline::from_spec(
        &PipelineSpec::new("summary").with_param("model", FLAKY_MODEL),
        &context(&backend),
    )
    .unwrap();

    assert!(pipeline.is_loaded());
    let err = pipeline.invoke_one("Long text here.".into()).unwrap_err();
    assert!(err.is_terminal());
    assert!(!pipeline.is_usable());
}
