//! Handshake constants and the subprocess handshake line.
//!
//! The host injects the magic cookie into a plugin's environment at launch; a
//! well-formed plugin verifies it and answers with a single line on stdout:
//!
//! ```text
//! CORE_VERSION|APP_VERSION|NETWORK|ADDRESS|PROTOCOL
//! 1|1|tcp|127.0.0.1:43521|grpc
//! ```
//!
//! Any cookie or version mismatch is fatal on both sides before business RPCs
//! occur.

/// Environment variable carrying the magic cookie.
pub const MAGIC_COOKIE_KEY: &str = "PLUGIN_INTERFACE";

/// Randomly generated 64-character hex string that prevents unrelated
/// processes from being mistaken for plugins. Never change after release:
/// every deployed plugin checks this exact value.
pub const MAGIC_COOKIE_VALUE: &str =
    "8f3e9a2d7c1b5e4f6a8d9c2b1e5f7a3d4c6b8e1f9a2d5c7b3e8f1a4d6c9b2e5f";

/// Version of the subprocess framing itself (cookie + handshake line).
pub const CORE_PROTOCOL_VERSION: i32 = 1;

/// Application protocol version the host advertises.
pub const PROTOCOL_VERSION: i32 = 1;

/// Minimum application protocol version the host accepts.
pub const MIN_SUPPORTED_PROTOCOL_VERSION: i32 = 1;

/// Maximum application protocol version the host accepts.
pub const MAX_SUPPORTED_PROTOCOL_VERSION: i32 = 1;

// Version history:
// v1 (current): GetMetadata and Execute.

/// Whether an application protocol version falls inside the supported range.
pub fn is_protocol_version_supported(version: i32) -> bool {
    (MIN_SUPPORTED_PROTOCOL_VERSION..=MAX_SUPPORTED_PROTOCOL_VERSION).contains(&version)
}

/// The cookie + version triple both sides agree on before any RPC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeConfig {
    pub protocol_version: i32,
    pub magic_cookie_key: &'static str,
    pub magic_cookie_value: &'static str,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            magic_cookie_key: MAGIC_COOKIE_KEY,
            magic_cookie_value: MAGIC_COOKIE_VALUE,
        }
    }
}

/// Transport the plugin serves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Tcp,
    Unix,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Tcp => "tcp",
            Network::Unix => "unix",
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single line a plugin emits on stdout after binding its listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeLine {
    /// Subprocess framing version; must equal [`CORE_PROTOCOL_VERSION`].
    pub core_version: i32,
    /// Application protocol version; must fall in the supported range.
    pub app_version: i32,
    pub network: Network,
    /// `host:port` for tcp, socket path for unix.
    pub address: String,
}

impl HandshakeLine {
    /// Parse a `CORE|APP|NETWORK|ADDR|PROTOCOL` line. The protocol tag must
    /// be `grpc`; the version gate itself is the caller's job.
    pub fn parse(line: &str) -> Result<Self, String> {
        let trimmed = line.trim();
        let parts: Vec<&str> = trimmed.split('|').collect();
        if parts.len() != 5 {
            return Err(format!(
                "malformed handshake line (expected 5 '|'-separated fields, got {}): {trimmed:?}",
                parts.len()
            ));
        }

        let core_version: i32 = parts[0]
            .parse()
            .map_err(|_| format!("invalid core protocol version {:?}", parts[0]))?;
        let app_version: i32 = parts[1]
            .parse()
            .map_err(|_| format!("invalid protocol version {:?}", parts[1]))?;
        let network = match parts[2] {
            "tcp" => Network::Tcp,
            "unix" => Network::Unix,
            other => return Err(format!("unsupported network type {other:?}")),
        };
        let address = parts[3].to_string();
        if address.is_empty() {
            return Err("handshake line has an empty address".to_string());
        }
        if parts[4] != "grpc" {
            return Err(format!("unsupported server protocol {:?}", parts[4]));
        }

        Ok(Self {
            core_version,
            app_version,
            network,
            address,
        })
    }
}

impl std::fmt::Display for HandshakeLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}|grpc",
            self.core_version, self.app_version, self.network, self.address
        )
    }
}
