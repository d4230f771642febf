//! Wire protocol shared by the quay host and its plugins.
//!
//! - [`handshake`]: the magic cookie, the supported protocol version range,
//!   and the single stdout line a plugin emits at launch
//! - [`proto`]: gRPC message types and client/server bindings for the
//!   `plugin.v1.Plugin` service (checked in so the build needs no protoc)
//! - [`serve`]: the plugin-side entry point that verifies the cookie, binds a
//!   loopback listener, emits the handshake line, and serves the service

pub mod handshake;
pub mod proto;
pub mod serve;

pub use handshake::{HandshakeConfig, HandshakeLine};
pub use serve::serve;
