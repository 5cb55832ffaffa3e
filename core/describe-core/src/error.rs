//! Error types for describe-core operations.
//! Boundary text is derived from `Display`; keep messages stable for FFI callers.

use crate::types::{CacheKey, ResourceType};

/// Prefix carried by every failure string handed across the C boundary.
///
/// Successful describe output is passed through verbatim, so callers that need
/// to tell the two apart check for this prefix.
pub const BOUNDARY_ERROR_PREFIX: &str = "Error: ";

// ═══════════════════════════════════════════════════════════════════════════════
// Collaborator Error
// ═══════════════════════════════════════════════════════════════════════════════

/// Opaque failure reported by an external collaborator (connection loader,
/// discovery, describer, drainer). Only the message survives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct BackendError {
    message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for BackendError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for BackendError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Describe Error
// ═══════════════════════════════════════════════════════════════════════════════

/// All errors that can occur while resolving or rendering a description.
#[derive(Debug, thiserror::Error)]
pub enum DescribeError {
    // ─────────────────────────────────────────────────────────────────────
    // Resolution Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("failed to connect to context {context:?}: {source}")]
    Connection {
        context: String,
        #[source]
        source: BackendError,
    },

    #[error("failed to resolve resource type {resource_type} in context {context:?}: {source}")]
    Mapping {
        context: String,
        resource_type: ResourceType,
        #[source]
        source: BackendError,
    },

    #[error("unable to find describer for {resource}: {reason}")]
    DescriberUnavailable { resource: String, reason: String },

    // ─────────────────────────────────────────────────────────────────────
    // Render Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("failed to describe {resource}/{name}: {source}")]
    Describe {
        resource: String,
        name: String,
        #[source]
        source: BackendError,
    },

    #[error("failed to start session poll loop: {0}")]
    PollLoop(#[source] std::io::Error),

    // ─────────────────────────────────────────────────────────────────────
    // Boundary Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("describe engine not installed")]
    NotInstalled,

    #[error("invalid argument {name}: {reason}")]
    InvalidArgument { name: &'static str, reason: String },
}

impl DescribeError {
    pub(crate) fn mapping(key: &CacheKey, source: BackendError) -> Self {
        DescribeError::Mapping {
            context: key.context.clone(),
            resource_type: key.resource_type.clone(),
            source,
        }
    }

    /// Formats the error the way it is handed across the C boundary.
    pub fn to_boundary_text(&self) -> String {
        format!("{BOUNDARY_ERROR_PREFIX}{self}")
    }
}

/// Convenience type alias for Results using DescribeError.
pub type Result<T> = std::result::Result<T, DescribeError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Drain Error
// ═══════════════════════════════════════════════════════════════════════════════

/// Stage-tagged failures from a node drain.
#[derive(Debug, thiserror::Error)]
pub enum DrainError {
    #[error("failed to connect to context {context:?}: {source}")]
    Connection {
        context: String,
        #[source]
        source: BackendError,
    },

    #[error("node drain is not supported by the installed backend")]
    Unsupported,

    #[error("cordon failed: {0}")]
    Cordon(#[source] BackendError),

    #[error("pod pre-flight errors: {}", .0.join("; "))]
    PreFlight(Vec<String>),

    #[error("drain failed: evicting {pod}: {source}")]
    Evict {
        pod: String,
        #[source]
        source: BackendError,
    },

    #[error("drain did not complete within {0}s")]
    Timeout(u64),

    #[error("describe engine not installed")]
    NotInstalled,

    #[error("invalid argument {name}: {reason}")]
    InvalidArgument { name: &'static str, reason: String },
}

impl DrainError {
    pub fn to_boundary_text(&self) -> String {
        format!("{BOUNDARY_ERROR_PREFIX}{self}")
    }
}
