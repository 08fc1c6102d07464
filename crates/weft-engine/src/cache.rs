//! Cache of generated proxy types
//!
//! Each distinct [`ProxyShape`] is synthesized at most once. Lookups take the
//! read side of an `RwLock` over the finished types; a miss joins a per-shape
//! gate so concurrent requests for one shape wait for a single synthesis while
//! requests for other shapes proceed. Failed syntheses are handed to every
//! caller that waited on the gate and are never stored.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::error::GenerationResult;
use crate::shape::ProxyShape;
use crate::synth::GeneratedProxyType;

/// Rendezvous for callers racing on the same shape
struct Gate<T> {
    outcome: Mutex<Option<GenerationResult<Arc<T>>>>,
}

impl<T> Gate<T> {
    fn new() -> Self {
        Gate {
            outcome: Mutex::new(None),
        }
    }
}

/// Thread-safe map of shape → generated type
pub struct TypeCache<T = GeneratedProxyType> {
    /// Finished types
    types: RwLock<FxHashMap<ProxyShape, Arc<T>>>,
    /// In-flight syntheses
    gates: DashMap<ProxyShape, Arc<Gate<T>>>,
    /// Number of synthesis runs, failed ones included
    syntheses: AtomicUsize,
}

impl<T> TypeCache<T> {
    pub fn new() -> Self {
        TypeCache {
            types: RwLock::new(FxHashMap::default()),
            gates: DashMap::new(),
            syntheses: AtomicUsize::new(0),
        }
    }

    /// Look up a finished type
    pub fn get(&self, shape: &ProxyShape) -> Option<Arc<T>> {
        self.types.read().get(shape).cloned()
    }

    /// Return the type for `shape`, running `synthesize` if there is none yet
    ///
    /// `synthesize` runs at most once per shape across all threads until it
    /// succeeds. Callers that waited while it failed get the same error.
    pub fn get_or_create<F>(&self, shape: &ProxyShape, synthesize: F) -> GenerationResult<Arc<T>>
    where
        F: FnOnce(&ProxyShape) -> GenerationResult<T>,
    {
        if let Some(found) = self.get(shape) {
            tracing::debug!(shape = %shape, "proxy type cache hit");
            return Ok(found);
        }

        let gate = Arc::clone(
            self.gates
                .entry(shape.clone())
                .or_insert_with(|| Arc::new(Gate::new()))
                .value(),
        );
        let mut outcome = gate.outcome.lock();
        if let Some(shared) = outcome.as_ref() {
            return shared.clone();
        }
        // Another gate may have finished between the read check and here
        if let Some(found) = self.get(shape) {
            return Ok(found);
        }

        tracing::debug!(shape = %shape, "proxy type cache miss, synthesizing");
        let result = synthesize(shape).map(Arc::new);
        self.syntheses.fetch_add(1, Ordering::Relaxed);
        match &result {
            Ok(ty) => {
                self.types.write().insert(shape.clone(), Arc::clone(ty));
            }
            Err(err) => {
                tracing::debug!(shape = %shape, error = %err, "proxy synthesis failed");
            }
        }
        *outcome = Some(result.clone());
        drop(outcome);

        self.gates.remove_if(shape, |_, current| Arc::ptr_eq(current, &gate));
        result
    }

    pub fn contains(&self, shape: &ProxyShape) -> bool {
        self.types.read().contains_key(shape)
    }

    /// Number of finished types
    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many times synthesis ran
    pub fn synthesis_count(&self) -> usize {
        self.syntheses.load(Ordering::Relaxed)
    }
}

impl<T> Default for TypeCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;
    use crate::shape::{ProxyGenerationOptions, ProxyKind};
    use std::sync::Barrier;
    use weft_types::TypeBuilder;

    fn shape(name: &str) -> ProxyShape {
        let iface = TypeBuilder::interface(name).build().unwrap();
        ProxyShape::new(
            ProxyKind::InterfaceWithoutTarget,
            None,
            vec![iface],
            ProxyGenerationOptions::default(),
        )
    }

    #[test]
    fn test_second_lookup_hits() {
        let cache: TypeCache<String> = TypeCache::new();
        let key = shape("IFoo");

        let first = cache.get_or_create(&key, |_| Ok("foo".to_string())).unwrap();
        let second = cache
            .get_or_create(&key, |_| panic!("must not synthesize twice"))
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.synthesis_count(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&key));
    }

    #[test]
    fn test_failure_not_cached() {
        let cache: TypeCache<String> = TypeCache::new();
        let key = shape("IBroken");

        let err = cache
            .get_or_create(&key, |_| {
                Err(GenerationError::InvalidShape {
                    reason: "broken".to_string(),
                })
            })
            .unwrap_err();
        assert!(matches!(err, GenerationError::InvalidShape { .. }));
        assert!(!cache.contains(&key));
        assert!(cache.is_empty());

        let retried = cache.get_or_create(&key, |_| Ok("fixed".to_string())).unwrap();
        assert_eq!(retried.as_str(), "fixed");
        assert_eq!(cache.synthesis_count(), 2);
    }

    #[test]
    fn test_concurrent_requests_synthesize_once() {
        const THREADS: usize = 8;
        let cache: TypeCache<String> = TypeCache::new();
        let key = shape("IRace");
        let barrier = Barrier::new(THREADS);

        let results: Vec<Arc<String>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        cache
                            .get_or_create(&key, |_| {
                                std::thread::sleep(std::time::Duration::from_millis(20));
                                Ok("raced".to_string())
                            })
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(cache.synthesis_count(), 1);
        assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0])));
    }

    #[test]
    fn test_distinct_shapes_are_distinct_entries() {
        let cache: TypeCache<String> = TypeCache::new();
        cache.get_or_create(&shape("IA"), |_| Ok("a".to_string())).unwrap();
        cache.get_or_create(&shape("IB"), |_| Ok("b".to_string())).unwrap();
        assert_eq!(cache.len(), 2);
    }
}
