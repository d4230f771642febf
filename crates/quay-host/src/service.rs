//! Plugin lifecycle orchestration: install, activate, deactivate, uninstall,
//! and call.
//!
//! The service owns the catalog state machine. Every operation either
//! completes its transition or leaves the record in a consistent state
//! (`error`, or the previous state when pre-validation fails). The in-memory
//! pool is authoritative for what is actually running; catalog writes that
//! fail after a subprocess change are rolled back or surfaced.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use quay_catalog::{Catalog, PluginFilter};
use quay_types::{
    binary_path_for, InstallRequest, JsonMap, NewPlugin, PluginProtocol, PluginRecord,
    PluginStatus, QuayError,
};

use crate::installer::{verify_checksum, Installer};
use crate::pool::ClientPool;

/// Orchestrates catalog state transitions against the installer and pool.
pub struct PluginService {
    catalog: Arc<dyn Catalog>,
    pool: Arc<ClientPool>,
    installer: Installer,
    plugin_root: PathBuf,
}

impl PluginService {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        pool: Arc<ClientPool>,
        installer: Installer,
        plugin_root: PathBuf,
    ) -> Self {
        Self {
            catalog,
            pool,
            installer,
            plugin_root,
        }
    }

    /// Install a plugin: create the record as `installing`, download the
    /// binary, verify its checksum when the request carries one, and mark the
    /// record `inactive`. Download or verification failure marks it `error`.
    pub async fn install(&self, req: InstallRequest) -> Result<PluginRecord, QuayError> {
        if self
            .catalog
            .find_by_name_and_version(&req.name, &req.version)?
            .is_some()
        {
            return Err(QuayError::AlreadyExists {
                name: req.name,
                version: req.version,
            });
        }

        let binary_path =
            binary_path_for(&self.plugin_root, &req.plugin_type, &req.name, &req.version);

        let record = self.catalog.create(NewPlugin {
            name: req.name,
            version: req.version,
            plugin_type: req.plugin_type,
            description: req.description,
            status: PluginStatus::Installing,
            binary_path: binary_path.display().to_string(),
            download_url: Some(req.download_url.clone()),
            protocol: PluginProtocol::Grpc,
            protocol_version: 1,
            checksum: req.checksum.clone(),
            config: req.config,
            metadata: req.metadata,
        })?;

        if let Err(e) = self
            .fetch_binary(&req.download_url, &binary_path, req.checksum.as_deref())
            .await
        {
            self.mark_error(record.id);
            return Err(e);
        }

        self.catalog
            .update_status(record.id, PluginStatus::Inactive)?;
        info!(plugin_id = record.id, name = %record.name, version = %record.version, "plugin installed");
        self.catalog
            .find_by_id(record.id)?
            .ok_or(QuayError::NotFound(record.id))
    }

    async fn fetch_binary(
        &self,
        url: &str,
        dest: &Path,
        checksum: Option<&str>,
    ) -> Result<(), QuayError> {
        self.installer.download(url, dest).await?;
        if let Some(expected) = checksum {
            if let Err(e) = verify_checksum(dest, expected) {
                // A binary that fails verification must not stay installed.
                let _ = tokio::fs::remove_file(dest).await;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Activate a plugin: load the subprocess and mark the record `active`.
    ///
    /// Already-active is a no-op. Activation is legal from `inactive`,
    /// `disabled`, and `error` (retrying a failed load); anything else is an
    /// invalid state.
    pub async fn activate(&self, id: i64) -> Result<(), QuayError> {
        let record = self.get(id)?;

        if record.status == PluginStatus::Active {
            return Ok(());
        }
        if !matches!(
            record.status,
            PluginStatus::Inactive | PluginStatus::Disabled | PluginStatus::Error
        ) {
            return Err(QuayError::InvalidState {
                status: record.status,
                operation: "activated",
            });
        }

        if let Err(e) = self
            .pool
            .load(id, Path::new(&record.binary_path), &record.name)
            .await
        {
            self.mark_error(id);
            return Err(e);
        }

        if let Err(e) = self.catalog.update_status(id, PluginStatus::Active) {
            // The catalog and the pool must agree; roll the load back.
            self.pool.unload(id).await;
            return Err(e);
        }

        info!(plugin_id = id, name = %record.name, "plugin activated");
        Ok(())
    }

    /// Deactivate a plugin: unload the subprocess and mark the record
    /// `inactive`. Already-inactive is a no-op.
    pub async fn deactivate(&self, id: i64) -> Result<(), QuayError> {
        let record = self.get(id)?;

        if record.status == PluginStatus::Inactive {
            return Ok(());
        }

        self.pool.unload(id).await;
        self.catalog.update_status(id, PluginStatus::Inactive)?;
        info!(plugin_id = id, name = %record.name, "plugin deactivated");
        Ok(())
    }

    /// Uninstall a plugin: deactivate if active, remove the binary (a missing
    /// file is not an error), and delete the record.
    pub async fn uninstall(&self, id: i64) -> Result<(), QuayError> {
        let record = self.get(id)?;

        if record.status == PluginStatus::Active {
            self.deactivate(id).await?;
        }

        match tokio::fs::remove_file(&record.binary_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(QuayError::InstallFailed(format!(
                    "failed to remove plugin binary {}: {e}",
                    record.binary_path
                )));
            }
        }

        self.catalog.delete(id)?;
        info!(plugin_id = id, name = %record.name, "plugin uninstalled");
        Ok(())
    }

    /// Call a method on an active plugin. Parameters are coerced to the
    /// string-typed wire form; the plugin's response is unwrapped into the
    /// result string or a call failure.
    pub async fn call(
        &self,
        id: i64,
        method: &str,
        params: &JsonMap,
    ) -> Result<String, QuayError> {
        let record = self.get(id)?;

        if record.status != PluginStatus::Active {
            return Err(QuayError::InvalidState {
                status: record.status,
                operation: "called",
            });
        }

        // Best-effort usage timestamp; a failure here must not block the call.
        if let Err(e) = self.catalog.update_last_used_at(id, Utc::now().timestamp()) {
            warn!(plugin_id = id, error = %e, "failed to update last_used_at");
        }

        let response = match self.pool.invoke(id, method, coerce_params(params)).await {
            Ok(response) => response,
            Err(e) => {
                // A transport failure may mean the child died behind the
                // host's back; status is `active` iff the pool holds a live
                // handle, so a dead child is evicted and the record marked.
                if self.pool.evict_if_dead(id).await {
                    self.mark_error(id);
                }
                return Err(e);
            }
        };

        if !response.success {
            let message = response
                .error
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(QuayError::CallFailed(message));
        }
        Ok(response.result.unwrap_or_default())
    }

    pub fn list(&self, filter: &PluginFilter) -> Result<Vec<PluginRecord>, QuayError> {
        self.catalog.find_all(filter)
    }

    pub fn get(&self, id: i64) -> Result<PluginRecord, QuayError> {
        self.catalog.find_by_id(id)?.ok_or(QuayError::NotFound(id))
    }

    fn mark_error(&self, id: i64) {
        if let Err(e) = self.catalog.update_status(id, PluginStatus::Error) {
            warn!(plugin_id = id, error = %e, "failed to record error status");
        }
    }
}

/// Coerce a JSON parameter map to the string-typed wire form.
///
/// Strings pass through verbatim; every other value uses its canonical JSON
/// encoding (booleans `true`/`false`, numbers decimal, structures nested
/// JSON, nulls `"null"`).
pub fn coerce_params(params: &JsonMap) -> HashMap<String, String> {
    params
        .iter()
        .map(|(key, value)| {
            let coerced = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), coerced)
        })
        .collect()
}
