//! Plugin catalog: the persistence contract and its SQLite implementation.
//!
//! The catalog maps plugin identity `(name, version)` and the numeric
//! surrogate id to the filesystem path and lifecycle state of each installed
//! plugin. "Not found" is a distinct outcome (`Ok(None)`), never an error.

mod sqlite;

pub use sqlite::SqliteCatalog;

use quay_types::{NewPlugin, PluginRecord, PluginStatus, QuayError};

/// Filter for catalog queries. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct PluginFilter {
    pub status: Option<PluginStatus>,
    pub plugin_type: Option<String>,
}

impl PluginFilter {
    /// Convenience filter on status alone.
    pub fn with_status(status: PluginStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Persistence contract consumed by the lifecycle service.
pub trait Catalog: Send + Sync {
    /// Insert a new record and return it with its assigned id and timestamps.
    /// A `(name, version)` collision is `QuayError::AlreadyExists`.
    fn create(&self, plugin: NewPlugin) -> Result<PluginRecord, QuayError>;

    fn find_by_id(&self, id: i64) -> Result<Option<PluginRecord>, QuayError>;

    fn find_by_name_and_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Option<PluginRecord>, QuayError>;

    fn find_all(&self, filter: &PluginFilter) -> Result<Vec<PluginRecord>, QuayError>;

    /// Update the lifecycle status, touching `updated_at`.
    fn update_status(&self, id: i64, status: PluginStatus) -> Result<(), QuayError>;

    fn update_last_used_at(&self, id: i64, ts: i64) -> Result<(), QuayError>;

    fn delete(&self, id: i64) -> Result<(), QuayError>;
}
