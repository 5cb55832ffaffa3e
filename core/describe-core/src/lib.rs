//! # describe-core
//!
//! Live "describe" views of Kubernetes objects for a native host, exposed as a
//! C-callable library.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime. Each session polls on its own thread.
//! - **Thread-safe**: Every boundary call may arrive from any host thread.
//! - **Never throws across the boundary**: Failures become `"Error: "` text,
//!   handle `0`, or `NULL`. Panics are caught.
//! - **Cluster access is pluggable**: The host installs a [`ClusterBackend`];
//!   this crate owns caching, polling, change detection and delivery.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use describe_core::{ffi, DescribeEngine};
//!
//! ffi::install(DescribeEngine::new(Arc::new(MyBackend::new())))
//!     .map_err(|_| "already installed")?;
//! // The host now calls create_describe_session / describe_session_read / ...
//! ```

// Public modules
pub mod backend;
pub mod backoff;
pub mod cache;
pub mod config;
pub mod drain;
pub mod engine;
pub mod error;
pub mod ffi;
pub mod fingerprint;
pub mod logging;
pub mod session;
pub mod storage;
pub mod types;

// Re-export commonly used items at crate root
pub use backend::{
    ClusterBackend, DrainOptions, NodeDrainer, PodDeletionPlan, PodRef, ResourceDescriber,
};
pub use backoff::RetryBackoff;
pub use config::{load_config, load_config_or_default, DescribeConfig};
pub use drain::DrainRequest;
pub use engine::DescribeEngine;
pub use error::{BackendError, DescribeError, DrainError, Result, BOUNDARY_ERROR_PREFIX};
pub use fingerprint::Fingerprint;
pub use session::DescribeSession;
pub use storage::StorageConfig;
pub use types::*;
