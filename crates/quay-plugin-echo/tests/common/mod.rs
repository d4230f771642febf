//! Shared fixtures for the end-to-end tests: a host wired to an in-memory
//! catalog, and the compiled echo plugin staged as a real binary on disk.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use quay_catalog::{Catalog, SqliteCatalog};
use quay_host::installer::Installer;
use quay_host::pool::ClientPool;
use quay_host::registry::InterfaceRegistry;
use quay_host::service::PluginService;
use quay_types::plugin::PluginProtocol;
use quay_types::{binary_path_for, JsonMap, NewPlugin, PluginStatus};

pub struct TestHost {
    pub catalog: Arc<dyn Catalog>,
    pub pool: Arc<ClientPool>,
    pub service: Arc<PluginService>,
}

/// Path to the compiled echo plugin binary.
pub fn echo_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_quay-plugin-echo"))
}

/// Copy the compiled echo plugin into its canonical location under `root`.
pub fn stage_echo_binary(root: &Path) -> PathBuf {
    let dest = binary_path_for(root, "util", "echo", "1.0.0");
    std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
    std::fs::copy(echo_binary(), &dest).unwrap();
    dest
}

pub fn host(plugin_root: &Path) -> TestHost {
    let catalog: Arc<dyn Catalog> = Arc::new(SqliteCatalog::open_in_memory().unwrap());
    let registry = Arc::new(InterfaceRegistry::new());
    let pool = Arc::new(ClientPool::new(registry, Duration::from_secs(10)));
    let installer = Installer::new(Duration::from_secs(10)).unwrap();
    let service = Arc::new(PluginService::new(
        Arc::clone(&catalog),
        Arc::clone(&pool),
        installer,
        plugin_root.to_path_buf(),
    ));
    TestHost {
        catalog,
        pool,
        service,
    }
}

/// Insert an inactive catalog record pointing at the staged echo binary.
pub fn register_echo(host: &TestHost, binary_path: &Path) -> i64 {
    host.catalog
        .create(NewPlugin {
            name: "echo".to_string(),
            version: "1.0.0".to_string(),
            plugin_type: "util".to_string(),
            description: String::new(),
            status: PluginStatus::Inactive,
            binary_path: binary_path.display().to_string(),
            download_url: None,
            protocol: PluginProtocol::Grpc,
            protocol_version: 1,
            checksum: None,
            config: JsonMap::new(),
            metadata: JsonMap::new(),
        })
        .unwrap()
        .id
}

pub fn status_of(host: &TestHost, id: i64) -> PluginStatus {
    host.catalog.find_by_id(id).unwrap().unwrap().status
}

pub fn process_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(raw), None).is_ok()
}

/// Wait up to ten seconds for a process to disappear.
pub async fn wait_for_exit(pid: u32) {
    for _ in 0..200 {
        if !process_alive(pid) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("process {pid} still alive after waiting");
}
