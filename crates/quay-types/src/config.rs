//! Host configuration for the quay daemon.
//!
//! [`HostConfig`] is loaded from a TOML file and controls where plugin
//! binaries are installed, where the catalog lives, and the timeouts that
//! bound installation and plugin startup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::QuayError;

fn default_download_timeout_secs() -> u64 {
    300
}

fn default_startup_timeout_secs() -> u64 {
    30
}

/// Top-level configuration for a quay host instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Root directory plugin binaries are installed under
    /// (`{plugin_root}/{type}/{name}_{version}`).
    pub plugin_root: PathBuf,
    /// Path to the SQLite plugin catalog.
    pub catalog_path: PathBuf,
    /// Overall timeout for a plugin binary download, in seconds.
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
    /// Timeout for a plugin subprocess to complete its handshake, in seconds.
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
}

impl HostConfig {
    /// Parse a configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, QuayError> {
        toml::from_str(content).map_err(|e| QuayError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String, QuayError> {
        toml::to_string_pretty(self).map_err(|e| QuayError::Config(e.to_string()))
    }

    /// Read and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, QuayError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            QuayError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = Self::from_toml(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration rooted under `base_dir`.
    pub fn default_for(base_dir: &Path) -> Self {
        Self {
            plugin_root: base_dir.join("plugins"),
            catalog_path: base_dir.join("catalog.db"),
            download_timeout_secs: default_download_timeout_secs(),
            startup_timeout_secs: default_startup_timeout_secs(),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), QuayError> {
        if self.plugin_root.as_os_str().is_empty() {
            return Err(QuayError::Config("plugin_root is required".into()));
        }
        if self.catalog_path.as_os_str().is_empty() {
            return Err(QuayError::Config("catalog_path is required".into()));
        }
        if self.download_timeout_secs == 0 {
            return Err(QuayError::Config(
                "download_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.startup_timeout_secs == 0 {
            return Err(QuayError::Config(
                "startup_timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_toml_roundtrip() {
        let config = HostConfig {
            plugin_root: PathBuf::from("/var/lib/quay/plugins"),
            catalog_path: PathBuf::from("/var/lib/quay/catalog.db"),
            download_timeout_secs: 120,
            startup_timeout_secs: 10,
        };
        let toml_str = config.to_toml().unwrap();
        let parsed = HostConfig::from_toml(&toml_str).unwrap();
        assert_eq!(parsed.plugin_root, config.plugin_root);
        assert_eq!(parsed.download_timeout_secs, 120);
        assert_eq!(parsed.startup_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn timeouts_default_when_omitted() {
        let parsed = HostConfig::from_toml(
            r#"
            plugin_root = "/tmp/plugins"
            catalog_path = "/tmp/catalog.db"
        "#,
        )
        .unwrap();
        assert_eq!(parsed.download_timeout_secs, 300);
        assert_eq!(parsed.startup_timeout_secs, 30);
    }

    #[test]
    fn default_for_places_paths_under_base() {
        let config = HostConfig::default_for(Path::new("/home/user/.quay"));
        assert_eq!(config.plugin_root, PathBuf::from("/home/user/.quay/plugins"));
        assert_eq!(
            config.catalog_path,
            PathBuf::from("/home/user/.quay/catalog.db")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut config = HostConfig::default_for(Path::new("/tmp/quay"));
        config.startup_timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("startup_timeout_secs"));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quay.toml");
        std::fs::write(
            &path,
            "plugin_root = \"/tmp/plugins\"\ncatalog_path = \"/tmp/catalog.db\"\n",
        )
        .unwrap();
        let config = HostConfig::load(&path).unwrap();
        assert_eq!(config.plugin_root, PathBuf::from("/tmp/plugins"));
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let err = HostConfig::load(Path::new("/nonexistent/quay.toml")).unwrap_err();
        assert!(matches!(err, QuayError::Config(_)));
    }
}
