//! Plugin identity and catalog record model.
//!
//! A plugin is identified by its unique `(name, version)` pair and by the
//! numeric surrogate id the catalog assigns. The record's `binary_path` is
//! derived once at install time via [`binary_path_for`] and never rewritten.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Opaque key/value maps passed through to the plugin (config, metadata).
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Lifecycle status of a catalogued plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginStatus {
    /// Record created, download in progress.
    Installing,
    /// Installed but not loaded.
    Inactive,
    /// Loaded; a supervised subprocess exists for this plugin.
    Active,
    /// Administratively disabled.
    Disabled,
    /// Installation or load failed; activation retries the load.
    Error,
}

impl PluginStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginStatus::Installing => "installing",
            PluginStatus::Inactive => "inactive",
            PluginStatus::Active => "active",
            PluginStatus::Disabled => "disabled",
            PluginStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a status string the catalog does not recognize.
#[derive(Debug, thiserror::Error)]
#[error("unknown plugin status '{0}'")]
pub struct ParseStatusError(pub String);

impl std::str::FromStr for PluginStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "installing" => Ok(PluginStatus::Installing),
            "inactive" => Ok(PluginStatus::Inactive),
            "active" => Ok(PluginStatus::Active),
            "disabled" => Ok(PluginStatus::Disabled),
            "error" => Ok(PluginStatus::Error),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// Wire protocol a plugin speaks. Only gRPC in v1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginProtocol {
    Grpc,
}

impl PluginProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginProtocol::Grpc => "grpc",
        }
    }
}

impl std::fmt::Display for PluginProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a protocol string the catalog does not recognize.
#[derive(Debug, thiserror::Error)]
#[error("unknown plugin protocol '{0}'")]
pub struct ParseProtocolError(pub String);

impl std::str::FromStr for PluginProtocol {
    type Err = ParseProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grpc" => Ok(PluginProtocol::Grpc),
            other => Err(ParseProtocolError(other.to_string())),
        }
    }
}

/// A catalogued plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginRecord {
    pub id: i64,
    pub name: String,
    pub version: String,
    /// Opaque type tag; only used to partition binary paths on disk.
    #[serde(rename = "type")]
    pub plugin_type: String,
    pub description: String,
    pub status: PluginStatus,
    /// Absolute path to the executable, fixed at install time.
    pub binary_path: String,
    /// Retained for reinstall.
    pub download_url: Option<String>,
    pub protocol: PluginProtocol,
    pub protocol_version: i32,
    /// Expected SHA-256 of the binary, hex-encoded.
    pub checksum: Option<String>,
    pub config: JsonMap,
    pub metadata: JsonMap,
    /// Unix timestamps.
    pub created_at: i64,
    pub updated_at: i64,
    pub last_used_at: Option<i64>,
}

/// Insert shape for creating a catalog record (everything but the id and
/// timestamps, which the catalog assigns).
#[derive(Debug, Clone)]
pub struct NewPlugin {
    pub name: String,
    pub version: String,
    pub plugin_type: String,
    pub description: String,
    pub status: PluginStatus,
    pub binary_path: String,
    pub download_url: Option<String>,
    pub protocol: PluginProtocol,
    pub protocol_version: i32,
    pub checksum: Option<String>,
    pub config: JsonMap,
    pub metadata: JsonMap,
}

/// An install request as received from the API layer.
#[derive(Debug, Clone, Deserialize)]
pub struct InstallRequest {
    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub plugin_type: String,
    #[serde(default)]
    pub description: String,
    pub download_url: String,
    /// Optional expected SHA-256 of the binary, hex-encoded. When present the
    /// installer verifies the download against it.
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub config: JsonMap,
    #[serde(default)]
    pub metadata: JsonMap,
}

/// Canonical binary path for a plugin: `{root}/{type}/{name}_{version}`.
pub fn binary_path_for(root: &Path, plugin_type: &str, name: &str, version: &str) -> PathBuf {
    root.join(plugin_type).join(format!("{name}_{version}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            PluginStatus::Installing,
            PluginStatus::Inactive,
            PluginStatus::Active,
            PluginStatus::Disabled,
            PluginStatus::Error,
        ] {
            assert_eq!(PluginStatus::from_str(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        let err = PluginStatus::from_str("paused").unwrap_err();
        assert_eq!(err.to_string(), "unknown plugin status 'paused'");
    }

    #[test]
    fn protocol_round_trips() {
        assert_eq!(PluginProtocol::from_str("grpc").unwrap(), PluginProtocol::Grpc);
        assert!(PluginProtocol::from_str("net-rpc").is_err());
    }

    #[test]
    fn binary_path_partitions_by_type() {
        let path = binary_path_for(Path::new("/var/lib/quay"), "util", "echo", "1.0.0");
        assert_eq!(path, PathBuf::from("/var/lib/quay/util/echo_1.0.0"));
    }

    #[test]
    fn install_request_defaults_optional_fields() {
        let req: InstallRequest = serde_json::from_str(
            r#"{
                "name": "echo",
                "version": "1.0.0",
                "type": "util",
                "download_url": "http://example.com/echo"
            }"#,
        )
        .unwrap();
        assert_eq!(req.name, "echo");
        assert!(req.description.is_empty());
        assert!(req.checksum.is_none());
        assert!(req.config.is_empty());
    }

    #[test]
    fn record_serializes_status_lowercase() {
        let record = PluginRecord {
            id: 1,
            name: "echo".into(),
            version: "1.0.0".into(),
            plugin_type: "util".into(),
            description: String::new(),
            status: PluginStatus::Inactive,
            binary_path: "/tmp/echo_1.0.0".into(),
            download_url: None,
            protocol: PluginProtocol::Grpc,
            protocol_version: 1,
            checksum: None,
            config: JsonMap::new(),
            metadata: JsonMap::new(),
            created_at: 0,
            updated_at: 0,
            last_used_at: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "inactive");
        assert_eq!(json["protocol"], "grpc");
        assert_eq!(json["type"], "util");
    }
}
