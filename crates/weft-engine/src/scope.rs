//! Module scope: the owner of everything generated
//!
//! A scope pairs a configuration with the caches that live as long as the
//! generated types: the type cache, the method resolver shared by proxy
//! instances, and the name counter for generated types. Scopes are
//! independent; two generators sharing one scope share their types.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use weft_types::ModuleInfo;

use crate::cache::TypeCache;
use crate::config::GeneratorConfig;
use crate::error::GenerationResult;
use crate::rebind::MethodResolver;
use crate::replicate::AttributeReplicator;
use crate::shape::ProxyShape;
use crate::synth::{GeneratedProxyType, Synthesizer};

pub struct ModuleScope {
    config: GeneratorConfig,
    generator_module: Arc<ModuleInfo>,
    cache: TypeCache,
    resolver: Arc<MethodResolver>,
    replicator: AttributeReplicator,
    /// Times each generated name was handed out
    names: Mutex<FxHashMap<String, usize>>,
}

impl ModuleScope {
    pub fn new() -> Self {
        Self::with_config(GeneratorConfig::default())
    }

    pub fn with_config(config: GeneratorConfig) -> Self {
        let generator_module = Arc::new(ModuleInfo::new(config.assembly_name.clone()));
        let replicator = AttributeReplicator::new(config.default_attributes_to_avoid.clone());
        ModuleScope {
            config,
            generator_module,
            cache: TypeCache::new(),
            resolver: Arc::new(MethodResolver::new()),
            replicator,
            names: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Module generated types are defined in
    pub fn generator_module(&self) -> &Arc<ModuleInfo> {
        &self.generator_module
    }

    pub fn cache(&self) -> &TypeCache {
        &self.cache
    }

    pub fn resolver(&self) -> &Arc<MethodResolver> {
        &self.resolver
    }

    pub fn replicator(&self) -> &AttributeReplicator {
        &self.replicator
    }

    /// Unique name for a proxy of `primary`
    ///
    /// `IFoo` yields `weft.proxies.IFooProxy`, then `weft.proxies.IFooProxy_1`, ...
    pub fn next_type_name(&self, primary: &str) -> String {
        let base = format!("{}.{}Proxy", self.config.proxy_namespace, primary);
        let mut names = self.names.lock();
        let count = names.entry(base.clone()).or_insert(0);
        let name = match *count {
            0 => base,
            n => format!("{base}_{n}"),
        };
        *count += 1;
        name
    }

    /// The generated type for `shape`, synthesizing it on first request
    pub fn get_or_create_type(&self, shape: &ProxyShape) -> GenerationResult<Arc<GeneratedProxyType>> {
        self.cache
            .get_or_create(shape, |shape| Synthesizer::new(self, shape).synthesize())
    }
}

impl Default for ModuleScope {
    fn default() -> Self {
        Self::new()
    }
}
