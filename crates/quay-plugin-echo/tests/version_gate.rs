//! Protocol version gate: a plugin reporting a version outside the host's
//! supported range is rejected at load, its subprocess is terminated, and the
//! record can later be reactivated once the version is back in range.
//!
//! Lives in its own test binary because the fixture's advertised version is
//! driven through a process-global environment variable.

mod common;

use serde_json::json;

use common::*;
use quay_types::{JsonMap, PluginStatus, QuayError};

#[tokio::test]
async fn incompatible_version_is_rejected_then_retryable() {
    std::env::set_var("ECHO_PROTOCOL_VERSION", "2");

    let dir = tempfile::tempdir().unwrap();
    let host = host(dir.path());
    let binary = stage_echo_binary(dir.path());
    let id = register_echo(&host, &binary);

    let err = host.service.activate(id).await.unwrap_err();
    assert!(matches!(
        err,
        QuayError::IncompatibleVersion {
            reported: 2,
            min: 1,
            max: 1
        }
    ));
    assert_eq!(status_of(&host, id), PluginStatus::Error);
    assert!(!host.pool.is_loaded(id).await);

    // Back in range: activation from `error` retries the load and succeeds.
    std::env::remove_var("ECHO_PROTOCOL_VERSION");
    host.service.activate(id).await.unwrap();
    assert_eq!(status_of(&host, id), PluginStatus::Active);

    let mut params = JsonMap::new();
    params.insert("msg".to_string(), json!("recovered"));
    let result = host.service.call(id, "Ping", &params).await.unwrap();
    assert_eq!(result, "recovered");

    host.pool.unload_all().await;
}
