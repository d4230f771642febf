//! Error types shared across all quay crates.

use crate::plugin::PluginStatus;

/// Errors that can occur across the quay host.
///
/// Each variant corresponds to one domain-level failure kind: catalog lookup,
/// installation, subprocess load, protocol compatibility, lifecycle state, or
/// plugin invocation.
#[derive(Debug, thiserror::Error)]
pub enum QuayError {
    /// Catalog lookup miss for a plugin id.
    #[error("plugin not found: {0}")]
    NotFound(i64),

    /// Install of a `(name, version)` pair that already exists.
    #[error("plugin {name} version {version} already exists")]
    AlreadyExists { name: String, version: String },

    /// Plugin binary missing, not a regular file, or not executable.
    #[error("invalid plugin binary: {0}")]
    InvalidBinary(String),

    /// Download or filesystem failure during installation.
    #[error("plugin install failed: {0}")]
    InstallFailed(String),

    /// Handshake or metadata protocol version outside the supported range.
    #[error("plugin protocol version {reported} is not supported (host supports {min}-{max})")]
    IncompatibleVersion { reported: i32, min: i32, max: i32 },

    /// Subprocess handshake or RPC channel setup failure.
    #[error("plugin load failed: {0}")]
    LoadFailed(String),

    /// Lifecycle operation attempted from an incompatible state.
    #[error("plugin cannot be {operation} from status '{status}'")]
    InvalidState {
        status: PluginStatus,
        operation: &'static str,
    },

    /// Transport error or plugin-reported failure during Execute.
    #[error("plugin call failed: {0}")]
    CallFailed(String),

    /// Catalog (SQLite) read/write failure.
    #[error("catalog error: {0}")]
    Catalog(String),

    /// Configuration loading or validation error.
    #[error("configuration error: {0}")]
    Config(String),
}
