//! Plugin-side serve loop.
//!
//! A plugin binary calls [`serve`] from its `main`. The function verifies the
//! magic cookie the host injected, binds an ephemeral loopback listener,
//! emits the single handshake line on stdout, and serves the gRPC plugin
//! service until the process is killed.

use std::io::Write;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

use crate::handshake::{self, HandshakeLine, Network};
use crate::proto::plugin_server::{Plugin, PluginServer};

/// Errors raised before or while serving a plugin.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    /// The cookie environment variable is absent: the binary was launched
    /// directly instead of by a quay host.
    #[error(
        "this binary is a quay plugin and must be launched by a quay host \
         (missing {0} in the environment)"
    )]
    MissingCookie(&'static str),

    /// The cookie is present but wrong; refuse to serve.
    #[error("magic cookie mismatch; refusing to serve")]
    CookieMismatch,

    #[error("failed to bind plugin listener: {0}")]
    Bind(std::io::Error),

    #[error("failed to write handshake line: {0}")]
    Handshake(std::io::Error),

    #[error("gRPC server error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

/// Verify the magic cookie in the current environment.
fn check_cookie() -> Result<(), ServeError> {
    match std::env::var(handshake::MAGIC_COOKIE_KEY) {
        Ok(value) if value == handshake::MAGIC_COOKIE_VALUE => Ok(()),
        Ok(_) => Err(ServeError::CookieMismatch),
        Err(_) => Err(ServeError::MissingCookie(handshake::MAGIC_COOKIE_KEY)),
    }
}

/// Serve a plugin implementation on an ephemeral loopback TCP port.
///
/// Returns only on listener or transport failure; a healthy plugin serves
/// until the host kills it.
pub async fn serve<P: Plugin>(plugin: P) -> Result<(), ServeError> {
    check_cookie()?;

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(ServeError::Bind)?;
    let addr = listener.local_addr().map_err(ServeError::Bind)?;

    let line = HandshakeLine {
        core_version: handshake::CORE_PROTOCOL_VERSION,
        app_version: handshake::PROTOCOL_VERSION,
        network: Network::Tcp,
        address: addr.to_string(),
    };

    // The handshake line must be the first (and only) thing on stdout, and
    // the host blocks on it: flush before serving.
    let mut stdout = std::io::stdout();
    writeln!(stdout, "{line}").map_err(ServeError::Handshake)?;
    stdout.flush().map_err(ServeError::Handshake)?;

    Server::builder()
        .add_service(PluginServer::new(plugin))
        .serve_with_incoming(TcpListenerStream::new(listener))
        .await?;

    Ok(())
}
