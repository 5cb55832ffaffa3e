//! DescribeEngine - the application context behind every boundary call.
//!
//! The engine owns the backend, the three lookup caches and the session
//! registry. One-shot describes and sessions go through the same
//! connection → mapping → describer pipeline, so both share cached values for
//! a given context and resource type.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use describe_core::{DescribeEngine, DescribeRequest, ResourceType};
//!
//! let engine = DescribeEngine::new(backend);
//! let request = DescribeRequest {
//!     resource_type: ResourceType::new("apps", "v1", "deployments"),
//!     namespace: "default".into(),
//!     name: "web".into(),
//!     context: "kind-dev".into(),
//! };
//! let id = engine.create_session(&request)?;
//! while engine.session_is_open(id) {
//!     if let Some(text) = engine.read_session(id) { render(text) }
//! }
//! ```

use std::sync::Arc;

use tracing::{info, warn};

use crate::backend::{ClusterBackend, ResourceDescriber};
use crate::cache::LookupCaches;
use crate::config::{load_config_or_default, DescribeConfig};
use crate::drain::{self, DrainRequest};
use crate::error::{DescribeError, DrainError, Result};
use crate::session::{DescribeSession, SessionParts, SessionRegistry};
use crate::storage::StorageConfig;
use crate::types::{
    CacheKey, ConnectionConfig, DescribeRequest, ResourceMapping, SessionId, SessionInfo,
};

struct Resolved {
    connection: Arc<ConnectionConfig>,
    describer: Arc<dyn ResourceDescriber>,
}

pub struct DescribeEngine {
    backend: Arc<dyn ClusterBackend>,
    config: DescribeConfig,
    caches: LookupCaches,
    sessions: SessionRegistry,
}

impl DescribeEngine {
    /// Creates an engine with config from the default location.
    pub fn new(backend: Arc<dyn ClusterBackend>) -> Self {
        let config = load_config_or_default(&StorageConfig::default());
        Self::with_config(backend, config)
    }

    pub fn with_config(backend: Arc<dyn ClusterBackend>, config: DescribeConfig) -> Self {
        Self {
            backend,
            config,
            caches: LookupCaches::new(),
            sessions: SessionRegistry::new(),
        }
    }

    pub fn config(&self) -> &DescribeConfig {
        &self.config
    }

    pub fn caches(&self) -> &LookupCaches {
        &self.caches
    }

    pub(crate) fn backend(&self) -> &dyn ClusterBackend {
        self.backend.as_ref()
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // One-shot Describe
    // ─────────────────────────────────────────────────────────────────────────────

    /// Renders the resource once. No session is created.
    pub fn describe(&self, request: &DescribeRequest) -> Result<String> {
        let resolved = self.resolve(request)?;
        self.render(&resolved, request)
    }

    /// Like [`describe`](Self::describe), but failures become boundary error text.
    pub fn describe_text(&self, request: &DescribeRequest) -> String {
        self.describe(request).unwrap_or_else(|err| {
            warn!(
                context = %request.context,
                resource = %request.resource_type,
                name = %request.name,
                error = %err,
                "Describe failed"
            );
            err.to_boundary_text()
        })
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Sessions
    // ─────────────────────────────────────────────────────────────────────────────

    /// Resolves, renders once and starts a polling session.
    ///
    /// Atomic: on any error nothing is registered and no thread is left running.
    pub fn create_session(&self, request: &DescribeRequest) -> Result<SessionId> {
        let resolved = self.resolve(request)?;
        let initial = self.render(&resolved, request)?;

        let id = self.sessions.allocate_id();
        let session = DescribeSession::start(
            id,
            SessionParts {
                request: request.clone(),
                connection: resolved.connection,
                describer: resolved.describer,
                settings: self.config.settings(),
                initial,
                backoff: self.config.backoff(),
            },
        )?;
        self.sessions.insert(Arc::new(session));
        Ok(id)
    }

    /// Takes the session's pending render. `None` for no new content or unknown id.
    pub fn read_session(&self, id: SessionId) -> Option<String> {
        self.sessions.get(id).and_then(|session| session.read())
    }

    /// Unknown ids count as closed.
    pub fn session_is_open(&self, id: SessionId) -> bool {
        self.sessions
            .get(id)
            .map(|session| session.is_open())
            .unwrap_or(false)
    }

    /// Idempotent; unknown ids are a no-op.
    pub fn close_session(&self, id: SessionId) {
        self.sessions.close(id);
    }

    pub fn session_info(&self, id: SessionId) -> Option<SessionInfo> {
        self.sessions.get(id).map(|session| session.info())
    }

    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        self.sessions.infos()
    }

    pub fn open_session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Closes every open session.
    pub fn close_all(&self) -> usize {
        let closed = self.sessions.close_all();
        if closed > 0 {
            info!(closed, "Closed all describe sessions");
        }
        closed
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Node Drain
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn drain_node(&self, request: &DrainRequest) -> std::result::Result<String, DrainError> {
        drain::run(self, request)
    }

    /// Connection for a context through the shared cache.
    pub(crate) fn connection(&self, context: &str) -> Result<Arc<ConnectionConfig>> {
        self.caches.connection(self.backend(), context)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Pipeline
    // ─────────────────────────────────────────────────────────────────────────────

    fn resolve(&self, request: &DescribeRequest) -> Result<Resolved> {
        let connection = self.connection(&request.context)?;
        let key = request.cache_key();
        let mapping = self.mapping(&connection, &key)?;
        let describer = self
            .caches
            .describer(self.backend(), &connection, &mapping, &key)?;
        Ok(Resolved {
            connection,
            describer,
        })
    }

    /// Discovery failures degrade to a synthetic mapping unless disabled in config.
    fn mapping(
        &self,
        connection: &ConnectionConfig,
        key: &CacheKey,
    ) -> Result<Arc<ResourceMapping>> {
        match self.caches.mapping(self.backend(), connection, key) {
            Ok(mapping) => Ok(mapping),
            Err(err) if self.config.discovery_fallback => {
                warn!(
                    key = %key,
                    error = %err,
                    "Discovery failed; using synthetic namespaced mapping"
                );
                Ok(Arc::new(ResourceMapping::synthetic(&key.resource_type)))
            }
            Err(err) => Err(err),
        }
    }

    fn render(&self, resolved: &Resolved, request: &DescribeRequest) -> Result<String> {
        resolved
            .describer
            .describe(&request.namespace, &request.name, &self.config.settings())
            .map_err(|source| DescribeError::Describe {
                resource: request.resource_type.resource.clone(),
                name: request.name.clone(),
                source,
            })
    }
}

impl Drop for DescribeEngine {
    fn drop(&mut self) {
        self.close_all();
    }
}
