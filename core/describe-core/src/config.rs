//! Runtime configuration loaded from `~/.kubedescribe/config.toml`.
//!
//! Every field has a default, so a missing file or a partial file is fine.
//!
//! ```toml
//! refresh_interval_ms = 5000
//! max_retry_interval_ms = 120000
//! show_events = true
//! discovery_fallback = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::backoff::{RetryBackoff, DEFAULT_REFRESH_INTERVAL, MAX_RETRY_INTERVAL};
use crate::storage::StorageConfig;
use crate::types::DescribeSettings;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescribeConfig {
    /// Wait between successful polls.
    pub refresh_interval_ms: u64,
    /// Ceiling for the backoff after failed polls.
    pub max_retry_interval_ms: u64,
    /// Include recent events in rendered output.
    pub show_events: bool,
    /// Fall back to a synthetic namespaced mapping when discovery fails.
    /// When false, an unresolvable resource type fails the describe.
    pub discovery_fallback: bool,
}

impl Default for DescribeConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL.as_millis() as u64,
            max_retry_interval_ms: MAX_RETRY_INTERVAL.as_millis() as u64,
            show_events: true,
            discovery_fallback: true,
        }
    }
}

impl DescribeConfig {
    /// Zero is treated as 1ms so the poll loop never spins.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms.max(1))
    }

    /// Never below the refresh interval.
    pub fn max_retry_interval(&self) -> Duration {
        Duration::from_millis(self.max_retry_interval_ms).max(self.refresh_interval())
    }

    pub fn backoff(&self) -> RetryBackoff {
        RetryBackoff::new(self.refresh_interval(), self.max_retry_interval())
    }

    pub fn settings(&self) -> DescribeSettings {
        DescribeSettings {
            show_events: self.show_events,
        }
    }
}

/// Loads config from `path`, returning defaults when the file does not exist.
pub fn load_config(path: &Path) -> Result<DescribeConfig, String> {
    if !path.exists() {
        return Ok(DescribeConfig::default());
    }

    let content = fs_err::read_to_string(path)
        .map_err(|err| format!("Failed to read config {}: {}", path.display(), err))?;
    let config = toml::from_str::<DescribeConfig>(&content)
        .map_err(|err| format!("Failed to parse config {}: {}", path.display(), err))?;

    if config.max_retry_interval_ms < config.refresh_interval_ms {
        warn!(
            refresh_interval_ms = config.refresh_interval_ms,
            max_retry_interval_ms = config.max_retry_interval_ms,
            "max_retry_interval_ms below refresh interval; clamping"
        );
    }
    Ok(config)
}

/// Loads config from the default location, logging and falling back to
/// defaults on any error.
pub fn load_config_or_default(storage: &StorageConfig) -> DescribeConfig {
    let path = storage.config_file();
    load_config(&path).unwrap_or_else(|err| {
        warn!(error = %err, "Failed to load describe config; using defaults");
        DescribeConfig::default()
    })
}
