//! Shared types for the quay plugin host.
//!
//! - [`error`]: the workspace-wide error enum
//! - [`plugin`]: catalog record model and plugin identity helpers
//! - [`config`]: host configuration loaded from TOML

pub mod config;
pub mod error;
pub mod plugin;

pub use config::HostConfig;
pub use error::QuayError;
pub use plugin::{
    binary_path_for, InstallRequest, JsonMap, NewPlugin, PluginProtocol, PluginRecord,
    PluginStatus,
};
