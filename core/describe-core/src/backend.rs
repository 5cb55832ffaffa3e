//! Collaborator interfaces for cluster access.
//!
//! Connecting to a context, resolving a resource type through discovery, and
//! rendering a description are all delegated to a [`ClusterBackend`]. Every call
//! is synchronous and may block on the network; the core never holds a lock
//! while one is in flight.

use std::sync::Arc;

use crate::error::BackendError;
use crate::types::{ConnectionConfig, DescribeSettings, ResourceMapping, ResourceType};

/// Entry point for everything that talks to a cluster.
///
/// Implementors should:
/// - Return errors with the underlying client's message intact
/// - Leave caching to the core (results are cached per context/resource type)
/// - Be safe to call from many threads at once
pub trait ClusterBackend: Send + Sync {
    /// Load connection configuration for a named context.
    fn open_connection(&self, context: &str) -> Result<ConnectionConfig, BackendError>;

    /// Resolve a resource type against discovered server metadata.
    /// Must fail when the type is not served, so it is never cached as a false positive.
    fn resolve_mapping(
        &self,
        connection: &ConnectionConfig,
        resource_type: &ResourceType,
    ) -> Result<ResourceMapping, BackendError>;

    /// Build a describer for a resolved mapping.
    /// `Ok(None)` means the mapping has no describer.
    fn build_describer(
        &self,
        connection: &ConnectionConfig,
        mapping: &ResourceMapping,
    ) -> Result<Option<Arc<dyn ResourceDescriber>>, BackendError>;

    /// Node drain support, when the backend provides it.
    fn drainer(&self) -> Option<&dyn NodeDrainer> {
        None
    }
}

/// Renders one object's live state as human-readable text.
pub trait ResourceDescriber: Send + Sync {
    fn describe(
        &self,
        namespace: &str,
        name: &str,
        settings: &DescribeSettings,
    ) -> Result<String, BackendError>;
}

/// A pod selected for eviction during a drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodRef {
    pub namespace: String,
    pub name: String,
}

impl PodRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

/// Pods chosen for deletion plus any non-fatal warnings from selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodDeletionPlan {
    pub pods: Vec<PodRef>,
    pub warnings: Vec<String>,
}

/// Filters applied when selecting pods and performing evictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainOptions {
    /// Negative means use each pod's own grace period.
    pub grace_period_seconds: i64,
    /// Zero means wait forever.
    pub timeout_seconds: u64,
    pub ignore_daemonsets: bool,
    pub delete_emptydir_data: bool,
    pub force: bool,
    pub dry_run: bool,
}

impl Default for DrainOptions {
    fn default() -> Self {
        Self {
            grace_period_seconds: -1,
            timeout_seconds: 0,
            ignore_daemonsets: false,
            delete_emptydir_data: false,
            force: false,
            dry_run: false,
        }
    }
}

/// The individual steps of a node drain.
pub trait NodeDrainer: Send + Sync {
    /// Mark the node unschedulable. Returns `false` if it already was.
    fn cordon(
        &self,
        connection: &ConnectionConfig,
        node: &str,
        dry_run: bool,
    ) -> Result<bool, BackendError>;

    /// Select the pods to evict. Every blocking problem is reported, not just the first.
    fn pods_for_deletion(
        &self,
        connection: &ConnectionConfig,
        node: &str,
        options: &DrainOptions,
    ) -> Result<PodDeletionPlan, Vec<BackendError>>;

    fn evict_pod(
        &self,
        connection: &ConnectionConfig,
        pod: &PodRef,
        options: &DrainOptions,
    ) -> Result<(), BackendError>;
}

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils {
    //! Scripted in-memory backend for exercising the core without a cluster.

    use super::*;
    use crate::types::MappingScope;
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Condvar, Mutex};
    use std::time::{Duration, Instant};

    struct Script {
        queued: VecDeque<Result<String, String>>,
        last: Result<String, String>,
        calls: u64,
    }

    /// Describer that replays queued responses, then repeats the last one.
    pub struct ScriptedDescriber {
        script: Mutex<Script>,
        calls_changed: Condvar,
    }

    impl ScriptedDescriber {
        pub fn new<I, S>(responses: I) -> Self
        where
            I: IntoIterator<Item = Result<S, S>>,
            S: Into<String>,
        {
            let queued: VecDeque<Result<String, String>> = responses
                .into_iter()
                .map(|r| r.map(Into::into).map_err(Into::into))
                .collect();
            Self {
                script: Mutex::new(Script {
                    queued,
                    last: Err("no scripted response".to_string()),
                    calls: 0,
                }),
                calls_changed: Condvar::new(),
            }
        }

        /// Describer that returns each output in turn.
        pub fn outputs<I, S>(outputs: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self::new(outputs.into_iter().map(Ok::<S, S>))
        }

        pub fn calls(&self) -> u64 {
            self.script.lock().unwrap().calls
        }

        /// Block until at least `count` describe calls have started.
        pub fn wait_for_calls(&self, count: u64, timeout: Duration) -> bool {
            let deadline = Instant::now() + timeout;
            let mut script = self.script.lock().unwrap();
            while script.calls < count {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return false;
                }
                script = self
                    .calls_changed
                    .wait_timeout(script, remaining)
                    .unwrap()
                    .0;
            }
            true
        }
    }

    impl ResourceDescriber for ScriptedDescriber {
        fn describe(
            &self,
            _namespace: &str,
            _name: &str,
            _settings: &DescribeSettings,
        ) -> Result<String, BackendError> {
            let mut script = self.script.lock().unwrap();
            script.calls += 1;
            if let Some(next) = script.queued.pop_front() {
                script.last = next;
            }
            let response = script.last.clone();
            drop(script);
            self.calls_changed.notify_all();
            response.map_err(BackendError::from)
        }
    }

    /// Backend whose failures and describers are configured per test.
    #[derive(Default)]
    pub struct ScriptedBackend {
        unreachable_contexts: Mutex<HashSet<String>>,
        unresolvable: Mutex<HashSet<String>>,
        cluster_scoped: Mutex<HashSet<String>>,
        describers: Mutex<HashMap<String, Arc<ScriptedDescriber>>>,
        drainer: Option<ScriptedDrainer>,
        connection_opens: AtomicUsize,
        mapping_resolves: AtomicUsize,
        describer_builds: AtomicUsize,
    }

    impl ScriptedBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_drainer(drainer: ScriptedDrainer) -> Self {
            Self {
                drainer: Some(drainer),
                ..Self::default()
            }
        }

        pub fn set_unreachable(&self, context: &str, unreachable: bool) {
            let mut contexts = self.unreachable_contexts.lock().unwrap();
            if unreachable {
                contexts.insert(context.to_string());
            } else {
                contexts.remove(context);
            }
        }

        pub fn set_unresolvable(&self, resource: &str, unresolvable: bool) {
            let mut resources = self.unresolvable.lock().unwrap();
            if unresolvable {
                resources.insert(resource.to_string());
            } else {
                resources.remove(resource);
            }
        }

        pub fn set_cluster_scoped(&self, resource: &str) {
            self.cluster_scoped
                .lock()
                .unwrap()
                .insert(resource.to_string());
        }

        /// Register the describer served for a resource string.
        pub fn add_describer(&self, resource: &str, describer: Arc<ScriptedDescriber>) {
            self.describers
                .lock()
                .unwrap()
                .insert(resource.to_string(), describer);
        }

        pub fn opens(&self) -> usize {
            self.connection_opens.load(Ordering::SeqCst)
        }

        pub fn resolves(&self) -> usize {
            self.mapping_resolves.load(Ordering::SeqCst)
        }

        pub fn builds(&self) -> usize {
            self.describer_builds.load(Ordering::SeqCst)
        }

        pub fn scripted_drainer(&self) -> Option<&ScriptedDrainer> {
            self.drainer.as_ref()
        }
    }

    fn kind_for(resource: &str) -> String {
        let singular = resource.strip_suffix('s').unwrap_or(resource);
        let mut chars = singular.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    impl ClusterBackend for ScriptedBackend {
        fn open_connection(&self, context: &str) -> Result<ConnectionConfig, BackendError> {
            self.connection_opens.fetch_add(1, Ordering::SeqCst);
            if self.unreachable_contexts.lock().unwrap().contains(context) {
                return Err(BackendError::new(format!(
                    "context \"{context}\" does not exist"
                )));
            }
            Ok(ConnectionConfig {
                context: context.to_string(),
                server: Some(format!("https://{context}.example:6443")),
                namespace: Some("default".to_string()),
            })
        }

        fn resolve_mapping(
            &self,
            _connection: &ConnectionConfig,
            resource_type: &ResourceType,
        ) -> Result<ResourceMapping, BackendError> {
            self.mapping_resolves.fetch_add(1, Ordering::SeqCst);
            if self
                .unresolvable
                .lock()
                .unwrap()
                .contains(&resource_type.resource)
            {
                return Err(BackendError::new(format!(
                    "the server doesn't have a resource type \"{}\"",
                    resource_type.resource
                )));
            }
            let scope = if self
                .cluster_scoped
                .lock()
                .unwrap()
                .contains(&resource_type.resource)
            {
                MappingScope::Cluster
            } else {
                MappingScope::Namespaced
            };
            Ok(ResourceMapping {
                resource_type: resource_type.clone(),
                kind: kind_for(&resource_type.resource),
                scope,
            })
        }

        fn build_describer(
            &self,
            _connection: &ConnectionConfig,
            mapping: &ResourceMapping,
        ) -> Result<Option<Arc<dyn ResourceDescriber>>, BackendError> {
            self.describer_builds.fetch_add(1, Ordering::SeqCst);
            let describers = self.describers.lock().unwrap();
            Ok(describers
                .get(&mapping.resource_type.resource)
                .map(|d| Arc::clone(d) as Arc<dyn ResourceDescriber>))
        }

        fn drainer(&self) -> Option<&dyn NodeDrainer> {
            self.drainer.as_ref().map(|d| d as &dyn NodeDrainer)
        }
    }

    /// Drainer over an in-memory node → pods table.
    #[derive(Default)]
    pub struct ScriptedDrainer {
        pods: Mutex<HashMap<String, Vec<PodRef>>>,
        cordoned: Mutex<HashSet<String>>,
        failing_pods: Mutex<HashSet<String>>,
        preflight_errors: Mutex<Vec<String>>,
        pub evicted: Mutex<Vec<PodRef>>,
    }

    impl ScriptedDrainer {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_pod(&self, node: &str, pod: PodRef) {
            self.pods
                .lock()
                .unwrap()
                .entry(node.to_string())
                .or_default()
                .push(pod);
        }

        pub fn fail_pod(&self, name: &str) {
            self.failing_pods.lock().unwrap().insert(name.to_string());
        }

        pub fn add_preflight_error(&self, message: &str) {
            self.preflight_errors
                .lock()
                .unwrap()
                .push(message.to_string());
        }

        pub fn is_cordoned(&self, node: &str) -> bool {
            self.cordoned.lock().unwrap().contains(node)
        }
    }

    impl NodeDrainer for ScriptedDrainer {
        fn cordon(
            &self,
            _connection: &ConnectionConfig,
            node: &str,
            dry_run: bool,
        ) -> Result<bool, BackendError> {
            if !self.pods.lock().unwrap().contains_key(node) {
                return Err(BackendError::new(format!("nodes \"{node}\" not found")));
            }
            let mut cordoned = self.cordoned.lock().unwrap();
            if cordoned.contains(node) {
                return Ok(false);
            }
            if !dry_run {
                cordoned.insert(node.to_string());
            }
            Ok(true)
        }

        fn pods_for_deletion(
            &self,
            _connection: &ConnectionConfig,
            node: &str,
            _options: &DrainOptions,
        ) -> Result<PodDeletionPlan, Vec<BackendError>> {
            let errors = self.preflight_errors.lock().unwrap();
            if !errors.is_empty() {
                return Err(errors.iter().map(|e| BackendError::new(e.as_str())).collect());
            }
            let pods = self
                .pods
                .lock()
                .unwrap()
                .get(node)
                .cloned()
                .unwrap_or_default();
            Ok(PodDeletionPlan {
                pods,
                warnings: Vec::new(),
            })
        }

        fn evict_pod(
            &self,
            _connection: &ConnectionConfig,
            pod: &PodRef,
            options: &DrainOptions,
        ) -> Result<(), BackendError> {
            if self.failing_pods.lock().unwrap().contains(&pod.name) {
                return Err(BackendError::new(format!(
                    "Cannot evict pod as it would violate the pod's disruption budget: {}",
                    pod.name
                )));
            }
            if !options.dry_run {
                self.evicted.lock().unwrap().push(pod.clone());
            }
            Ok(())
        }
    }
}
