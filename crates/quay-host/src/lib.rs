//! Plugin lifecycle core for the quay host.
//!
//! Dataflow for a call: API layer -> [`service::PluginService`] ->
//! [`pool::ClientPool`] -> [`supervisor`] -> plugin subprocess -> response.
//! Installation flows through [`installer::Installer`] with catalog state
//! transitions managed by the service; [`autoload`] restores active plugins
//! at startup.
//!
//! - [`registry`]: interface configuration per plugin name, auto-registering
//! - [`supervisor`]: subprocess launch, handshake, dispense, kill
//! - [`installer`]: atomic binary download and checksum verification
//! - [`pool`]: the map from plugin id to supervised subprocess and stub
//! - [`service`]: install/activate/deactivate/uninstall/call orchestration
//! - [`autoload`]: startup sweep and shutdown unload

pub mod autoload;
pub mod installer;
pub mod pool;
pub mod registry;
pub mod service;
pub mod supervisor;

pub use installer::Installer;
pub use pool::ClientPool;
pub use registry::{InterfaceConfig, InterfaceRegistry};
pub use service::PluginService;
pub use supervisor::PluginHandle;
