//! Process-lifetime lookup caches for connections, mappings and describers.
//!
//! All three share one rule: for a given key at most one value is ever stored.
//! Builders run without any lock held (they are network calls), so concurrent
//! first-time callers may each build a value; the first insert wins and every
//! caller, including the losers, returns the stored survivor. A failed build
//! stores nothing, so a later call retries. Entries are never evicted.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::backend::{ClusterBackend, ResourceDescriber};
use crate::error::{DescribeError, Result};
use crate::types::{CacheKey, ConnectionConfig, ResourceMapping};

/// Insert-if-absent map with build-on-miss.
pub struct LookupCache<K, V> {
    name: &'static str,
    entries: RwLock<HashMap<K, V>>,
}

impl<K, V> LookupCache<K, V>
where
    K: Eq + Hash + Clone + Display,
    V: Clone,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        // Recover from poisoning - entries are only ever inserted whole
        let entries = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.get(key).cloned()
    }

    /// Returns the cached value for `key`, building and inserting it on a miss.
    pub fn get_or_build<E>(
        &self,
        key: &K,
        build: impl FnOnce() -> std::result::Result<V, E>,
    ) -> std::result::Result<V, E> {
        // Phase 1: hit under read lock
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        // Phase 2: build with no lock held
        debug!(cache = self.name, key = %key, "Lookup cache miss");
        let built = build()?;

        // Phase 3: insert-if-absent; a racing builder's value may already be there
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(entries.entry(key.clone()).or_insert(built).clone())
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The three caches shared by one-shot describes and sessions.
pub struct LookupCaches {
    connections: LookupCache<String, Arc<ConnectionConfig>>,
    mappings: LookupCache<CacheKey, Arc<ResourceMapping>>,
    describers: LookupCache<CacheKey, Arc<dyn ResourceDescriber>>,
}

impl Default for LookupCaches {
    fn default() -> Self {
        Self::new()
    }
}

impl LookupCaches {
    pub fn new() -> Self {
        Self {
            connections: LookupCache::new("connection"),
            mappings: LookupCache::new("mapping"),
            describers: LookupCache::new("describer"),
        }
    }

    /// Connection configuration for a context, keyed by context name.
    pub fn connection(
        &self,
        backend: &dyn ClusterBackend,
        context: &str,
    ) -> Result<Arc<ConnectionConfig>> {
        self.connections
            .get_or_build(&context.to_string(), || {
                backend
                    .open_connection(context)
                    .map(Arc::new)
                    .map_err(|source| DescribeError::Connection {
                        context: context.to_string(),
                        source,
                    })
            })
    }

    /// Resolved mapping for a context + resource type.
    /// Fails when discovery cannot resolve the type; callers decide whether to degrade.
    pub fn mapping(
        &self,
        backend: &dyn ClusterBackend,
        connection: &ConnectionConfig,
        key: &CacheKey,
    ) -> Result<Arc<ResourceMapping>> {
        self.mappings.get_or_build(key, || {
            backend
                .resolve_mapping(connection, &key.resource_type)
                .map(Arc::new)
                .map_err(|source| DescribeError::mapping(key, source))
        })
    }

    /// Describer for a context + resource type. A backend that has no
    /// describer for the mapping is an error and is not cached.
    pub fn describer(
        &self,
        backend: &dyn ClusterBackend,
        connection: &ConnectionConfig,
        mapping: &ResourceMapping,
        key: &CacheKey,
    ) -> Result<Arc<dyn ResourceDescriber>> {
        self.describers.get_or_build(key, || {
            let resource = key.resource_type.resource.clone();
            match backend.build_describer(connection, mapping) {
                Ok(Some(describer)) => Ok(describer),
                Ok(None) => Err(DescribeError::DescriberUnavailable {
                    resource,
                    reason: format!("no describer registered for kind {}", mapping.kind),
                }),
                Err(err) => Err(DescribeError::DescriberUnavailable {
                    resource,
                    reason: err.to_string(),
                }),
            }
        })
    }

    /// Entry counts as (connections, mappings, describers).
    pub fn sizes(&self) -> (usize, usize, usize) {
        (
            self.connections.len(),
            self.mappings.len(),
            self.describers.len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::test_utils::{ScriptedBackend, ScriptedDescriber};
    use crate::types::ResourceType;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn hit_does_not_rebuild() {
        let cache: LookupCache<String, Arc<String>> = LookupCache::new("test");
        let builds = AtomicUsize::new(0);
        let key = "ctx".to_string();

        for _ in 0..3 {
            let value = cache
                .get_or_build(&key, || {
                    builds.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(Arc::new("value".to_string()))
                })
                .unwrap();
            assert_eq!(*value, "value");
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_builders_converge_on_one_value() {
        const CALLERS: usize = 8;
        let cache: Arc<LookupCache<String, Arc<usize>>> = Arc::new(LookupCache::new("test"));
        let barrier = Arc::new(Barrier::new(CALLERS));

        let handles: Vec<_> = (0..CALLERS)
            .map(|i| {
                let cache = Arc::clone(&cache);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache
                        .get_or_build(&"shared".to_string(), || {
                            thread::sleep(Duration::from_millis(10));
                            Ok::<_, String>(Arc::new(i))
                        })
                        .unwrap()
                })
            })
            .collect();

        let values: Vec<Arc<usize>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let first = &values[0];
        assert!(values.iter().all(|v| Arc::ptr_eq(v, first)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failed_build_is_not_sticky() {
        let cache: LookupCache<String, Arc<String>> = LookupCache::new("test");
        let key = "ctx".to_string();

        let err = cache
            .get_or_build(&key, || Err::<Arc<String>, _>("boom".to_string()))
            .unwrap_err();
        assert_eq!(err, "boom");
        assert!(cache.is_empty());

        let value = cache
            .get_or_build(&key, || Ok::<_, String>(Arc::new("ok".to_string())))
            .unwrap();
        assert_eq!(*value, "ok");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn connection_failure_retries_builder() {
        let backend = ScriptedBackend::new();
        let caches = LookupCaches::new();
        backend.set_unreachable("prod", true);

        let err = caches.connection(&backend, "prod").unwrap_err();
        assert!(matches!(err, DescribeError::Connection { .. }));

        backend.set_unreachable("prod", false);
        let first = caches.connection(&backend, "prod").unwrap();
        let second = caches.connection(&backend, "prod").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(backend.opens(), 2);
    }

    #[test]
    fn unresolvable_mapping_is_never_cached() {
        let backend = ScriptedBackend::new();
        let caches = LookupCaches::new();
        backend.set_unresolvable("widgets", true);
        let conn = ConnectionConfig::new("dev");
        let key = CacheKey::new("dev", ResourceType::new("example.io", "v1", "widgets"));

        assert!(matches!(
            caches.mapping(&backend, &conn, &key),
            Err(DescribeError::Mapping { .. })
        ));
        assert!(matches!(
            caches.mapping(&backend, &conn, &key),
            Err(DescribeError::Mapping { .. })
        ));
        assert_eq!(backend.resolves(), 2);
        assert_eq!(caches.sizes().1, 0);
    }

    #[test]
    fn missing_describer_is_unavailable_and_not_cached() {
        let backend = ScriptedBackend::new();
        let caches = LookupCaches::new();
        let conn = ConnectionConfig::new("dev");
        let gvr = ResourceType::new("", "v1", "pods");
        let key = CacheKey::new("dev", gvr.clone());
        let mapping = ResourceMapping::synthetic(&gvr);

        let err = caches
            .describer(&backend, &conn, &mapping, &key)
            .err()
            .unwrap();
        assert!(matches!(err, DescribeError::DescriberUnavailable { .. }));
        assert_eq!(caches.sizes().2, 0);

        backend.add_describer("pods", Arc::new(ScriptedDescriber::outputs(["Name: web"])));
        assert!(caches.describer(&backend, &conn, &mapping, &key).is_ok());
        assert!(caches.describer(&backend, &conn, &mapping, &key).is_ok());
        assert_eq!(backend.builds(), 2);
    }

    #[test]
    fn keys_are_scoped_per_context() {
        let backend = ScriptedBackend::new();
        let caches = LookupCaches::new();
        let dev = caches.connection(&backend, "dev").unwrap();
        let prod = caches.connection(&backend, "prod").unwrap();
        assert_eq!(dev.context, "dev");
        assert_eq!(prod.context, "prod");
        assert_eq!(caches.sizes().0, 2);
    }
}
