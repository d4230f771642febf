//! Startup sweep and shutdown: reload every plugin the catalog marks
//! `active`, and unload everything when the host stops.
//!
//! The sweep runs after the catalog is ready and before the host starts
//! accepting traffic. Individual failures mark the affected record `error`
//! and are logged; they never prevent the host from starting.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use quay_catalog::{Catalog, PluginFilter};
use quay_types::PluginStatus;

use crate::pool::ClientPool;

/// Load every `active` catalog record into the pool. Returns the number of
/// plugins loaded and the number that failed.
pub async fn load_active_plugins(catalog: &Arc<dyn Catalog>, pool: &ClientPool) -> (usize, usize) {
    let records = match catalog.find_all(&PluginFilter::with_status(PluginStatus::Active)) {
        Ok(records) => records,
        Err(e) => {
            warn!(error = %e, "failed to enumerate active plugins, skipping auto-load");
            return (0, 0);
        }
    };

    let mut loaded = 0;
    let mut failed = 0;
    for record in records {
        match pool
            .load(record.id, Path::new(&record.binary_path), &record.name)
            .await
        {
            Ok(()) => {
                info!(plugin_id = record.id, name = %record.name, "plugin auto-loaded");
                loaded += 1;
            }
            Err(e) => {
                warn!(plugin_id = record.id, name = %record.name, error = %e, "failed to auto-load plugin");
                if let Err(e) = catalog.update_status(record.id, PluginStatus::Error) {
                    warn!(plugin_id = record.id, error = %e, "failed to record error status");
                }
                failed += 1;
            }
        }
    }
    (loaded, failed)
}

/// Unload every plugin at host shutdown, killing the subprocesses.
pub async fn shutdown(pool: &ClientPool) {
    pool.unload_all().await;
}
