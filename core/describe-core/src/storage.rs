//! Path management for describe-core's on-disk files.
//!
//! Only two things live on disk: the optional TOML config and the rolling log
//! files. Tests inject a temp root with [`StorageConfig::with_root`].

use std::path::{Path, PathBuf};

const ROOT_DIR_NAME: &str = ".kubedescribe";

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory (default: ~/.kubedescribe)
    root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(std::env::temp_dir);
        Self {
            root: home.join(ROOT_DIR_NAME),
        }
    }
}

impl StorageConfig {
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_hang_off_root() {
        let storage = StorageConfig::with_root(PathBuf::from("/tmp/kd"));
        assert_eq!(storage.config_file(), PathBuf::from("/tmp/kd/config.toml"));
        assert_eq!(storage.log_dir(), PathBuf::from("/tmp/kd/logs"));
    }

    #[test]
    fn default_root_is_dot_dir() {
        let storage = StorageConfig::default();
        assert!(storage.root().ends_with(ROOT_DIR_NAME));
    }
}
