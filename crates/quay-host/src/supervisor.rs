//! Plugin subprocess supervision: launch, handshake, dispense, kill.
//!
//! [`launch`] spawns a plugin executable with the magic cookie injected into
//! its environment, waits for the single handshake line on its stdout, opens
//! the gRPC channel against the advertised address, dispenses the named stub,
//! and gates on the plugin's reported protocol version. Every failure path
//! kills the child before returning.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use chrono::{DateTime, Utc};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, warn};

use quay_types::QuayError;
use quay_wire::handshake::{
    self, HandshakeLine, Network, MAX_SUPPORTED_PROTOCOL_VERSION, MIN_SUPPORTED_PROTOCOL_VERSION,
};
use quay_wire::proto::plugin_client::PluginClient;
use quay_wire::proto::MetadataRequest;

use crate::registry::InterfaceConfig;

/// Grace period between SIGTERM and SIGKILL when stopping a plugin.
const KILL_GRACE_PERIOD: Duration = Duration::from_secs(5);
/// Poll interval while waiting for a terminated child to exit.
const KILL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A supervised plugin subprocess bundled with its RPC channel and stub.
#[derive(Debug)]
pub struct PluginHandle {
    child: Child,
    pid: u32,
    client: PluginClient<Channel>,
    loaded_at: DateTime<Utc>,
}

impl PluginHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// A clone of the dispensed stub. gRPC clients are cheap to clone and
    /// safe for concurrent use.
    pub fn client(&self) -> PluginClient<Channel> {
        self.client.clone()
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Whether the child process is still running.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Terminate the child and close the RPC channel: SIGTERM, a bounded
    /// grace wait, then SIGKILL. Consumes the handle, so a second kill cannot
    /// happen; killing an already-exited child is a no-op.
    pub async fn kill(mut self) {
        terminate(&mut self.child).await;
    }
}

/// Validate that a path points to a launchable plugin binary: it must exist,
/// be a regular file, and carry an execute bit.
pub fn validate_binary(path: &Path) -> Result<(), QuayError> {
    let meta = std::fs::metadata(path).map_err(|e| {
        QuayError::InvalidBinary(format!("plugin binary not found: {}: {e}", path.display()))
    })?;
    if !meta.is_file() {
        return Err(QuayError::InvalidBinary(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o111 == 0 {
            return Err(QuayError::InvalidBinary(format!(
                "{} is not executable",
                path.display()
            )));
        }
    }
    Ok(())
}

/// Launch a plugin executable and complete the handshake.
///
/// On success the returned handle owns the child process and the dispensed
/// stub. On any failure the child is killed before the error is returned.
pub async fn launch(
    binary_path: &Path,
    interface: &InterfaceConfig,
    startup_timeout: Duration,
) -> Result<PluginHandle, QuayError> {
    validate_binary(binary_path)?;

    let mut child = Command::new(binary_path)
        .env(
            interface.handshake.magic_cookie_key,
            interface.handshake.magic_cookie_value,
        )
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            QuayError::LoadFailed(format!("failed to spawn {}: {e}", binary_path.display()))
        })?;

    let pid = child.id().unwrap_or(0);
    debug!(pid, binary = %binary_path.display(), "plugin process spawned");

    // Forward the child's stderr into the host log so plugin diagnostics are
    // not lost (and the pipe never fills up).
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_stderr(stderr, pid));
    }

    match establish(&mut child, interface, startup_timeout).await {
        Ok(client) => Ok(PluginHandle {
            child,
            pid,
            client,
            loaded_at: Utc::now(),
        }),
        Err(e) => {
            terminate(&mut child).await;
            Err(e)
        }
    }
}

/// Handshake, channel setup, dispense, and the metadata version gate.
async fn establish(
    child: &mut Child,
    interface: &InterfaceConfig,
    startup_timeout: Duration,
) -> Result<PluginClient<Channel>, QuayError> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| QuayError::LoadFailed("failed to capture plugin stdout".to_string()))?;
    let mut lines = BufReader::new(stdout).lines();

    let line = tokio::time::timeout(startup_timeout, lines.next_line())
        .await
        .map_err(|_| {
            QuayError::LoadFailed(format!(
                "plugin did not complete the handshake within {}s",
                startup_timeout.as_secs()
            ))
        })?
        .map_err(|e| QuayError::LoadFailed(format!("failed to read handshake line: {e}")))?
        .ok_or_else(|| {
            QuayError::LoadFailed("plugin exited before emitting a handshake line".to_string())
        })?;

    let hs = HandshakeLine::parse(&line).map_err(QuayError::LoadFailed)?;

    if hs.core_version != handshake::CORE_PROTOCOL_VERSION {
        return Err(QuayError::LoadFailed(format!(
            "plugin speaks core protocol version {}, host requires {}",
            hs.core_version,
            handshake::CORE_PROTOCOL_VERSION
        )));
    }
    if !handshake::is_protocol_version_supported(hs.app_version) {
        return Err(QuayError::IncompatibleVersion {
            reported: hs.app_version,
            min: MIN_SUPPORTED_PROTOCOL_VERSION,
            max: MAX_SUPPORTED_PROTOCOL_VERSION,
        });
    }

    // Anything the plugin writes to stdout after the handshake is log
    // content; keep draining it.
    let pid = child.id().unwrap_or(0);
    tokio::spawn(forward_stdout(lines, pid));

    let channel = connect(&hs).await?;

    let build = interface
        .plugin_map
        .get(&interface.plugin_name)
        .ok_or_else(|| {
            QuayError::LoadFailed(format!(
                "no stub registered for '{}' in its plugin map",
                interface.plugin_name
            ))
        })?;
    let mut client = build(channel);

    verify_metadata(&mut client).await?;
    Ok(client)
}

/// Open a gRPC channel to the address the plugin advertised.
async fn connect(hs: &HandshakeLine) -> Result<Channel, QuayError> {
    match hs.network {
        Network::Tcp => {
            let endpoint = Endpoint::from_shared(format!("http://{}", hs.address)).map_err(|e| {
                QuayError::LoadFailed(format!("invalid plugin address '{}': {e}", hs.address))
            })?;
            endpoint.connect().await.map_err(|e| {
                QuayError::LoadFailed(format!("failed to connect to plugin at {}: {e}", hs.address))
            })
        }
        Network::Unix => {
            let path = hs.address.clone();
            // The URI is required by the endpoint API but ignored by the
            // connector; the socket path carries the real destination.
            Endpoint::from_static("http://[::]:0")
                .connect_with_connector(tower::service_fn(move |_: tonic::transport::Uri| {
                    let path = path.clone();
                    async move { tokio::net::UnixStream::connect(path).await }
                }))
                .await
                .map_err(|e| {
                    QuayError::LoadFailed(format!(
                        "failed to connect to plugin socket {}: {e}",
                        hs.address
                    ))
                })
        }
    }
}

/// Gate on the protocol version the plugin reports through GetMetadata.
async fn verify_metadata(client: &mut PluginClient<Channel>) -> Result<(), QuayError> {
    let metadata = match client.get_metadata(MetadataRequest {}).await {
        Ok(response) => response.into_inner(),
        Err(status) if status.code() == tonic::Code::Unimplemented => {
            // Plugins that predate GetMetadata are accepted for backward
            // compatibility.
            warn!("plugin does not implement GetMetadata, skipping version check");
            return Ok(());
        }
        Err(status) => {
            return Err(QuayError::LoadFailed(format!(
                "failed to get plugin metadata: {status}"
            )));
        }
    };

    // A plugin that reports 0 predates version reporting; treat as 1.
    let reported = if metadata.protocol_version == 0 {
        1
    } else {
        metadata.protocol_version
    };

    if !handshake::is_protocol_version_supported(reported) {
        return Err(QuayError::IncompatibleVersion {
            reported,
            min: MIN_SUPPORTED_PROTOCOL_VERSION,
            max: MAX_SUPPORTED_PROTOCOL_VERSION,
        });
    }

    debug!(
        plugin = %metadata.name,
        version = %metadata.version,
        protocol_version = reported,
        "plugin metadata verified"
    );
    Ok(())
}

/// Terminate a child process: SIGTERM, poll up to the grace period, SIGKILL.
async fn terminate(child: &mut Child) {
    let Some(pid) = child.id() else {
        // Already reaped.
        return;
    };

    if let Ok(raw) = i32::try_from(pid) {
        if let Err(e) = signal::kill(Pid::from_raw(raw), Signal::SIGTERM) {
            debug!(pid, error = %e, "SIGTERM failed (child may have already exited)");
        }
    }

    let deadline = tokio::time::Instant::now() + KILL_GRACE_PERIOD;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(pid, ?status, "plugin process exited");
                return;
            }
            Ok(None) => {
                if tokio::time::Instant::now() >= deadline {
                    warn!(pid, "grace period expired, sending SIGKILL");
                    let _ = child.kill().await;
                    return;
                }
                tokio::time::sleep(KILL_POLL_INTERVAL).await;
            }
            Err(e) => {
                warn!(pid, error = %e, "failed to poll plugin process, force-killing");
                let _ = child.kill().await;
                return;
            }
        }
    }
}

async fn forward_stderr(stderr: ChildStderr, pid: u32) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if !line.trim().is_empty() {
            debug!(pid, line = %line, "plugin stderr");
        }
    }
}

async fn forward_stdout(mut lines: Lines<BufReader<ChildStdout>>, pid: u32) {
    while let Ok(Some(line)) = lines.next_line().await {
        if !line.trim().is_empty() {
            debug!(pid, line = %line, "plugin stdout");
        }
    }
}
