//! Client pool: the map from plugin id to supervised subprocess and stub.
//!
//! Two aligned maps guarded by a single reader/writer lock. Reads (invoke
//! lookup, is-loaded checks) take the read lock; loads and unloads take the
//! write lock. A load holds the write lock across the subprocess launch, so
//! concurrent loads for one id serialize and at most one child is ever
//! spawned; an unload kills the child inside the critical section, so no
//! invoke can be dispatched to a stub whose child has been terminated once
//! the unload returns.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tonic::transport::Channel;
use tracing::{info, warn};

use quay_types::QuayError;
use quay_wire::proto::plugin_client::PluginClient;
use quay_wire::proto::{ExecuteRequest, ExecuteResponse};

use crate::registry::InterfaceRegistry;
use crate::supervisor::{self, PluginHandle};

#[derive(Default)]
struct PoolState {
    supervisors: HashMap<i64, PluginHandle>,
    clients: HashMap<i64, PluginClient<Channel>>,
}

/// Concurrent pool of loaded plugins keyed by catalog id.
pub struct ClientPool {
    state: RwLock<PoolState>,
    registry: Arc<InterfaceRegistry>,
    startup_timeout: Duration,
}

impl ClientPool {
    pub fn new(registry: Arc<InterfaceRegistry>, startup_timeout: Duration) -> Self {
        Self {
            state: RwLock::new(PoolState::default()),
            registry,
            startup_timeout,
        }
    }

    /// Load the plugin subprocess for `id`. Idempotent: if a handle already
    /// exists the call succeeds without spawning anything.
    pub async fn load(
        &self,
        id: i64,
        binary_path: &Path,
        plugin_name: &str,
    ) -> Result<(), QuayError> {
        if self.state.read().await.supervisors.contains_key(&id) {
            return Ok(());
        }

        let mut state = self.state.write().await;
        // Re-check under the write lock: a concurrent load may have won.
        if state.supervisors.contains_key(&id) {
            return Ok(());
        }

        let interface = self.registry.get(plugin_name);
        let handle = supervisor::launch(binary_path, &interface, self.startup_timeout).await?;

        info!(plugin_id = id, pid = handle.pid(), name = plugin_name, "plugin loaded");
        state.clients.insert(id, handle.client());
        state.supervisors.insert(id, handle);
        Ok(())
    }

    /// Unload `id` if loaded: drain both maps, then kill the child.
    /// Idempotent.
    pub async fn unload(&self, id: i64) {
        let mut state = self.state.write().await;
        state.clients.remove(&id);
        let Some(handle) = state.supervisors.remove(&id) else {
            return;
        };
        let pid = handle.pid();
        handle.kill().await;
        info!(plugin_id = id, pid, "plugin unloaded");
    }

    /// Execute a method on a loaded plugin.
    ///
    /// The stub is cloned under the read lock and the RPC runs outside it, so
    /// concurrent invokes do not serialize.
    pub async fn invoke(
        &self,
        id: i64,
        method: &str,
        params: HashMap<String, String>,
    ) -> Result<ExecuteResponse, QuayError> {
        let mut client = {
            let state = self.state.read().await;
            state
                .clients
                .get(&id)
                .cloned()
                .ok_or_else(|| QuayError::CallFailed(format!("plugin {id} is not loaded")))?
        };

        let response = client
            .execute(ExecuteRequest {
                method: method.to_string(),
                params,
            })
            .await
            .map_err(|status| {
                QuayError::CallFailed(format!("transport error calling plugin {id}: {status}"))
            })?;
        Ok(response.into_inner())
    }

    /// Evict the entry for `id` if its child has exited behind the pool's
    /// back. Returns true when a dead child was found and evicted; a live
    /// child (or no entry at all) leaves the pool untouched.
    pub async fn evict_if_dead(&self, id: i64) -> bool {
        let mut state = self.state.write().await;
        match state.supervisors.get_mut(&id) {
            Some(handle) => {
                if handle.is_alive() {
                    return false;
                }
            }
            None => return false,
        }
        state.clients.remove(&id);
        if let Some(handle) = state.supervisors.remove(&id) {
            let pid = handle.pid();
            // The child has already exited; kill just reaps it.
            handle.kill().await;
            warn!(plugin_id = id, pid, "plugin process died, handle evicted");
        }
        true
    }

    /// Kill every supervised plugin and clear the pool. Invoked on shutdown.
    pub async fn unload_all(&self) {
        let mut state = self.state.write().await;
        state.clients.clear();
        let handles: Vec<(i64, PluginHandle)> = state.supervisors.drain().collect();
        let count = handles.len();
        for (id, handle) in handles {
            let pid = handle.pid();
            handle.kill().await;
            info!(plugin_id = id, pid, "plugin unloaded");
        }
        if count > 0 {
            info!(count, "all plugins unloaded");
        }
    }

    pub async fn is_loaded(&self, id: i64) -> bool {
        self.state.read().await.supervisors.contains_key(&id)
    }

    /// The child pid for a loaded plugin, if any.
    pub async fn pid_of(&self, id: i64) -> Option<u32> {
        self.state.read().await.supervisors.get(&id).map(|h| h.pid())
    }

    /// Snapshot of loaded plugin ids, sorted for deterministic output.
    pub async fn loaded_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.state.read().await.supervisors.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Write an executable shell script into `dir` and return its path.
    fn write_script(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        path
    }

    fn pool() -> ClientPool {
        ClientPool::new(
            Arc::new(InterfaceRegistry::new()),
            Duration::from_millis(500),
        )
    }

    #[tokio::test]
    async fn invoke_unloaded_plugin_fails_with_not_loaded() {
        let pool = pool();
        let err = pool.invoke(7, "Ping", HashMap::new()).await.unwrap_err();
        assert!(matches!(err, QuayError::CallFailed(_)));
        assert!(err.to_string().contains("not loaded"));
    }

    #[tokio::test]
    async fn failed_load_leaves_pool_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), "quitter.sh", "exit 1");

        let pool = pool();
        let err = pool.load(1, &path, "quitter").await.unwrap_err();
        assert!(matches!(err, QuayError::LoadFailed(_)));
        assert!(!pool.is_loaded(1).await);
        assert!(pool.loaded_ids().await.is_empty());
    }

    #[tokio::test]
    async fn load_of_missing_binary_is_invalid_binary() {
        let pool = pool();
        let err = pool
            .load(1, Path::new("/nonexistent/plugin"), "ghost")
            .await
            .unwrap_err();
        assert!(matches!(err, QuayError::InvalidBinary(_)));
    }

    #[tokio::test]
    async fn unload_is_idempotent() {
        let pool = pool();
        // Nothing loaded: both calls are no-ops.
        pool.unload(3).await;
        pool.unload(3).await;
        assert!(!pool.is_loaded(3).await);
    }

    #[tokio::test]
    async fn unload_all_on_empty_pool_is_a_no_op() {
        let pool = pool();
        pool.unload_all().await;
        assert!(pool.loaded_ids().await.is_empty());
    }

    #[tokio::test]
    async fn evict_if_dead_ignores_unknown_ids() {
        let pool = pool();
        assert!(!pool.evict_if_dead(42).await);
    }
}
