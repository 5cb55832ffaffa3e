//! Shared DTOs for the describe pipeline and the C boundary.
//! Prefer additive changes to keep boundary consumers stable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Process-unique session handle. Valid handles start at 1.
pub type SessionId = u64;

/// Handle returned across the boundary when session creation fails.
pub const INVALID_SESSION_ID: SessionId = 0;

/// The (group, version, resource) triple identifying a class of describable object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceType {
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl ResourceType {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            resource: resource.into(),
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.group, self.version, self.resource)
    }
}

/// Key for the mapping and describer caches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub context: String,
    pub resource_type: ResourceType,
}

impl CacheKey {
    pub fn new(context: impl Into<String>, resource_type: ResourceType) -> Self {
        Self {
            context: context.into(),
            resource_type,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.context, self.resource_type)
    }
}

/// Coordinates of a single describe call or session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescribeRequest {
    pub resource_type: ResourceType,
    pub namespace: String,
    pub name: String,
    pub context: String,
}

impl DescribeRequest {
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(self.context.clone(), self.resource_type.clone())
    }
}

/// Connection configuration for one context, as produced by the connection loader.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub context: String,
    /// API server address, when the loader knows it.
    pub server: Option<String>,
    /// Default namespace configured for the context.
    pub namespace: Option<String>,
}

impl ConnectionConfig {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingScope {
    Namespaced,
    Cluster,
}

/// Resolved metadata binding a resource type to its scope and canonical kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMapping {
    pub resource_type: ResourceType,
    pub kind: String,
    pub scope: MappingScope,
}

impl ResourceMapping {
    /// Best-effort mapping used when discovery is unavailable.
    ///
    /// Assumes namespace scope and a kind equal to the resource string, which
    /// misrenders cluster-scoped types.
    pub fn synthetic(resource_type: &ResourceType) -> Self {
        Self {
            kind: resource_type.resource.clone(),
            resource_type: resource_type.clone(),
            scope: MappingScope::Namespaced,
        }
    }
}

/// Options forwarded to every describe call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescribeSettings {
    pub show_events: bool,
}

impl Default for DescribeSettings {
    fn default() -> Self {
        Self { show_events: true }
    }
}

/// Point-in-time view of an open session, serialized as JSON at the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub context: String,
    pub resource_type: ResourceType,
    pub namespace: String,
    pub name: String,
    pub server: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub open: bool,
    pub polls: u64,
    pub failures: u64,
    pub deliveries: u64,
    pub dropped: u64,
    pub current_delay_ms: u64,
}
