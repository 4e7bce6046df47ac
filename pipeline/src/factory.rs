/// Pipeline factory
///
/// Resolves a [`PipelineSpec`] (type identifier + parameters) into a live
/// pipeline through a runtime registry of constructors, and optionally caches
/// the result so structurally equal specs share one instance.
///
/// Constructors run outside the registry and cache locks. If two threads build
/// the same cached spec at once, the first instance inserted wins and the
/// other is dropped. An instance built by a constructor that was replaced
/// meanwhile is returned to its caller but never cached.
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::base::Pipeline;
use crate::builtins;
use crate::config::FactoryConfig;
use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::spec::PipelineSpec;

/// Builds a pipeline from its spec
pub type Constructor =
    Arc<dyn Fn(&PipelineSpec, &PipelineContext) -> Result<Arc<dyn Pipeline>> + Send + Sync>;

/// Alias chains longer than this are treated as misconfiguration
const MAX_ALIAS_DEPTH: usize = 8;

#[derive(Clone)]
enum Registration {
    Constructor(Constructor),
    Alias(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    pipeline_type: String,
    fingerprint: String,
}

/// Adapt a typed constructor into a registry [`Constructor`]
pub fn constructor<P, F>(build: F) -> Constructor
where
    P: Pipeline + 'static,
    F: Fn(&PipelineSpec, &PipelineContext) -> Result<P> + Send + Sync + 'static,
{
    Arc::new(move |spec: &PipelineSpec, context: &PipelineContext| -> Result<Arc<dyn Pipeline>> {
        let pipeline: Arc<dyn Pipeline> = Arc::new(build(spec, context)?);
        Ok(pipeline)
    })
}

pub struct PipelineFactory {
    registry: RwLock<HashMap<String, Registration>>,
    cache: RwLock<HashMap<CacheKey, Arc<dyn Pipeline>>>,
    context: PipelineContext,
    cache_enabled: bool,
}

impl PipelineFactory {
    /// Empty factory with caching disabled
    pub fn new(context: PipelineContext) -> Self {
        Self {
            registry: RwLock::new(HashMap::new()),
            cache: RwLock::new(HashMap::new()),
            context,
            cache_enabled: false,
        }
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Factory with every built-in pipeline registered, configured from `config`
    pub fn with_builtins(context: PipelineContext, config: &FactoryConfig) -> Result<Self> {
        let context = context.with_defaults(config.defaults.clone());
        let factory = Self::new(context).with_cache(config.cache);
        builtins::register_builtins(&factory)?;
        Ok(factory)
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache_enabled
    }

    /// Register a constructor under `identifier`
    pub fn register(&self, identifier: impl Into<String>, ctor: Constructor) -> Result<()> {
        let identifier = identifier.into();
        let mut registry = self.registry.write();
        if registry.contains_key(&identifier) {
            return Err(PipelineError::DuplicateRegistration(identifier));
        }
        log::debug!("Registered pipeline type '{}'", identifier);
        registry.insert(identifier, Registration::Constructor(ctor));
        Ok(())
    }

    /// Register or replace `identifier`. Cached instances built under it are
    /// evicted. Returns whether an existing entry was replaced.
    pub fn register_overwrite(&self, identifier: impl Into<String>, ctor: Constructor) -> bool {
        let identifier = identifier.into();
        let replaced = self
            .registry
            .write()
            .insert(identifier.clone(), Registration::Constructor(ctor))
            .is_some();

        let mut cache = self.cache.write();
        let before = cache.len();
        cache.retain(|key, _| key.pipeline_type != identifier);
        if replaced {
            log::info!(
                "Replaced pipeline type '{}', evicted {} cached instance(s)",
                identifier,
                before - cache.len()
            );
        }
        replaced
    }

    /// Make `alias` resolve to `target`, which must already be registered
    pub fn register_alias(&self, alias: impl Into<String>, target: impl Into<String>) -> Result<()> {
        let alias = alias.into();
        let target = target.into();
        let mut registry = self.registry.write();
        if registry.contains_key(&alias) {
            return Err(PipelineError::DuplicateRegistration(alias));
        }
        if !registry.contains_key(&target) {
            return Err(PipelineError::UnknownType(target));
        }
        log::debug!("Registered alias '{}' -> '{}'", alias, target);
        registry.insert(alias, Registration::Alias(target));
        Ok(())
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.registry.read().contains_key(identifier)
    }

    /// Every registered identifier and alias, sorted
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.registry.read().keys().cloned().collect();
        types.sort();
        types
    }

    /// Follow aliases to the canonical identifier and its constructor
    fn resolve(&self, identifier: &str) -> Result<(String, Constructor)> {
        let registry = self.registry.read();
        let mut current = identifier;
        for _ in 0..MAX_ALIAS_DEPTH {
            match registry.get(current) {
                Some(Registration::Constructor(ctor)) => {
                    return Ok((current.to_string(), Arc::clone(ctor)))
                }
                Some(Registration::Alias(target)) => current = target,
                None => return Err(PipelineError::UnknownType(identifier.to_string())),
            }
        }
        Err(PipelineError::InvalidConfiguration(format!(
            "alias chain for '{}' is too deep",
            identifier
        )))
    }

    fn cache_key(&self, spec: &PipelineSpec) -> Result<CacheKey> {
        let (pipeline_type, _) = self.resolve(&spec.pipeline_type)?;
        Ok(CacheKey {
            pipeline_type,
            fingerprint: spec.fingerprint(),
        })
    }

    /// Build the pipeline described by `spec`.
    ///
    /// With caching enabled, structurally equal specs (same resolved type and
    /// deeply equal parameters) return the same instance. Constructor errors
    /// are returned unchanged and nothing is cached.
    pub fn create(&self, spec: &PipelineSpec) -> Result<Arc<dyn Pipeline>> {
        let (pipeline_type, ctor) = self.resolve(&spec.pipeline_type)?;

        if !self.cache_enabled {
            log::debug!("Creating uncached '{}' pipeline", pipeline_type);
            return ctor(spec, &self.context);
        }

        let key = CacheKey {
            pipeline_type,
            fingerprint: spec.fingerprint(),
        };
        if let Some(hit) = self.cache.read().get(&key) {
            log::debug!("Cache hit for '{}' pipeline", key.pipeline_type);
            return Ok(Arc::clone(hit));
        }

        log::debug!("Cache miss for '{}' pipeline, constructing", key.pipeline_type);
        let built = ctor(spec, &self.context)?;

        // An overwrite during construction already evicted this type; an
        // instance from the replaced constructor must not be cached after it.
        let registry = self.registry.read();
        let current = matches!(
            registry.get(&key.pipeline_type),
            Some(Registration::Constructor(registered)) if Arc::ptr_eq(registered, &ctor)
        );
        if !current {
            log::debug!(
                "Pipeline type '{}' was replaced during construction, not caching",
                key.pipeline_type
            );
            return Ok(built);
        }
        let mut cache = self.cache.write();
        let entry = cache.entry(key).or_insert(built);
        Ok(Arc::clone(entry))
    }

    /// Build every pipeline declared in `config`, keyed by declaration name.
    /// Stops at the first failure, naming the declaration.
    pub fn create_all(&self, config: &FactoryConfig) -> Result<HashMap<String, Arc<dyn Pipeline>>> {
        let mut pipelines = HashMap::with_capacity(config.pipelines.len());
        for (name, spec) in &config.pipelines {
            let pipeline = self.create(spec).map_err(|e| match e {
                PipelineError::UnknownType(t) => PipelineError::InvalidConfiguration(format!(
                    "pipeline '{}' has unknown type '{}'",
                    name, t
                )),
                other => other,
            })?;
            log::info!("Created pipeline '{}' ({})", name, spec.pipeline_type);
            pipelines.insert(name.clone(), pipeline);
        }
        Ok(pipelines)
    }

    /// Remove the cached instance for `spec`. Callers holding it keep it.
    pub fn evict(&self, spec: &PipelineSpec) -> bool {
        match self.cache_key(spec) {
            Ok(key) => self.cache.write().remove(&key).is_some(),
            Err(_) => false,
        }
    }

    pub fn clear_cache(&self) {
        self.cache.write().clear();
    }

    pub fn cached_len(&self) -> usize {
        self.cache.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelflow_values::{PipelineValue, ValueKind};

    struct Tagged(String);

    impl Pipeline for Tagged {
        fn pipeline_type(&self) -> &str {
            "tagged"
        }
        fn input_kind(&self) -> ValueKind {
            ValueKind::Any
        }
        fn output_kind(&self) -> ValueKind {
            ValueKind::Text
        }
        fn run_batch(&self, inputs: &[PipelineValue]) -> Result<Vec<PipelineValue>> {
            Ok(inputs.iter().map(|_| self.0.clone().into()).collect())
        }
    }

    fn tagged(tag: &'static str) -> Constructor {
        constructor(move |_spec: &PipelineSpec, _ctx: &PipelineContext| Ok(Tagged(tag.to_string())))
    }

    #[test]
    fn test_duplicate_registration() {
        let factory = PipelineFactory::new(PipelineContext::new());
        factory.register("t", tagged("a")).unwrap();
        assert!(matches!(
            factory.register("t", tagged("b")),
            Err(PipelineError::DuplicateRegistration(id)) if id == "t"
        ));
    }

    #[test]
    fn test_overwrite_evicts_cache() {
        let factory = PipelineFactory::new(PipelineContext::new()).with_cache(true);
        factory.register("t", tagged("a")).unwrap();
        let spec = PipelineSpec::new("t");
        factory.create(&spec).unwrap();
        assert_eq!(factory.cached_len(), 1);

        assert!(factory.register_overwrite("t", tagged("b")));
        assert_eq!(factory.cached_len(), 0);

        let out = factory.create(&spec).unwrap().invoke_one("x".into()).unwrap();
        assert_eq!(out, PipelineValue::from("b"));
    }

    #[test]
    fn test_overwrite_during_construction_is_not_cached() {
        use std::sync::{OnceLock, Weak};

        let slot: Arc<OnceLock<Weak<PipelineFactory>>> = Arc::new(OnceLock::new());
        let replacing = {
            let slot = Arc::clone(&slot);
            constructor(move |_spec: &PipelineSpec, _ctx: &PipelineContext| {
                if let Some(factory) = slot.get().and_then(Weak::upgrade) {
                    factory.register_overwrite("t", tagged("b"));
                }
                Ok(Tagged("a".to_string()))
            })
        };
        let factory = Arc::new(PipelineFactory::new(PipelineContext::new()).with_cache(true));
        slot.set(Arc::downgrade(&factory)).unwrap();
        factory.register("t", replacing).unwrap();

        let spec = PipelineSpec::new("t");
        let stale = factory.create(&spec).unwrap();
        assert_eq!(stale.invoke_one("x".into()).unwrap(), PipelineValue::from("a"));
        assert_eq!(factory.cached_len(), 0);

        let fresh = factory.create(&spec).unwrap();
        assert_eq!(fresh.invoke_one("x".into()).unwrap(), PipelineValue::from("b"));
        assert_eq!(factory.cached_len(), 1);
        assert!(Arc::ptr_eq(&fresh, &factory.create(&spec).unwrap()));
    }

    #[test]
    fn test_alias_shares_cache_entry() {
        let factory = PipelineFactory::new(PipelineContext::new()).with_cache(true);
        factory.register("t", tagged("a")).unwrap();
        factory.register_alias("alias", "t").unwrap();

        let a = factory.create(&PipelineSpec::new("t")).unwrap();
        let b = factory.create(&PipelineSpec::new("alias")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_alias_requires_target() {
        let factory = PipelineFactory::new(PipelineContext::new());
        assert!(matches!(
            factory.register_alias("alias", "missing"),
            Err(PipelineError::UnknownType(_))
        ));
    }

    #[test]
    fn test_evict_unknown_is_false() {
        let factory = PipelineFactory::new(PipelineContext::new()).with_cache(true);
        assert!(!factory.evict(&PipelineSpec::new("ghost")));
    }
}
