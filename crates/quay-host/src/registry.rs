//! Interface registry: wire configuration per plugin name.
//!
//! The registry is a cache with a default-constructor fallback, not a static
//! configuration store: looking up an unknown name auto-registers a default
//! gRPC interface for it, so the host never needs a baked-in list of plugin
//! names.

use std::collections::HashMap;
use std::sync::RwLock;

use tonic::transport::Channel;
use tracing::info;

use quay_types::QuayError;
use quay_wire::handshake::HandshakeConfig;
use quay_wire::proto::plugin_client::PluginClient;

/// Builds a typed client stub from an established channel ("dispense").
pub type StubBuilder = fn(Channel) -> PluginClient<Channel>;

fn default_stub(channel: Channel) -> PluginClient<Channel> {
    PluginClient::new(channel)
}

/// Wire configuration for a plugin name: the handshake plus the dispense map
/// from stub name to builder.
#[derive(Clone)]
pub struct InterfaceConfig {
    pub plugin_name: String,
    pub handshake: HandshakeConfig,
    pub plugin_map: HashMap<String, StubBuilder>,
}

impl InterfaceConfig {
    /// Default interface for a name: the current handshake and a single-entry
    /// dispense map serving the plugin's own name.
    pub fn default_for(plugin_name: &str) -> Self {
        let mut plugin_map: HashMap<String, StubBuilder> = HashMap::new();
        plugin_map.insert(plugin_name.to_string(), default_stub as StubBuilder);
        Self {
            plugin_name: plugin_name.to_string(),
            handshake: HandshakeConfig::default(),
            plugin_map,
        }
    }
}

/// Registry of interface configurations keyed by plugin name.
pub struct InterfaceRegistry {
    configs: RwLock<HashMap<String, InterfaceConfig>>,
}

impl Default for InterfaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InterfaceRegistry {
    pub fn new() -> Self {
        Self {
            configs: RwLock::new(HashMap::new()),
        }
    }

    /// Idempotent insert. Rejects empty plugin names.
    pub fn register(&self, config: InterfaceConfig) -> Result<(), QuayError> {
        if config.plugin_name.is_empty() {
            return Err(QuayError::LoadFailed(
                "plugin name cannot be empty".to_string(),
            ));
        }
        self.configs
            .write()
            .unwrap()
            .insert(config.plugin_name.clone(), config);
        Ok(())
    }

    /// Look up the interface for `plugin_name`, auto-registering a default
    /// one on miss.
    pub fn get(&self, plugin_name: &str) -> InterfaceConfig {
        if let Some(config) = self.configs.read().unwrap().get(plugin_name) {
            return config.clone();
        }

        let mut configs = self.configs.write().unwrap();
        // Double-check: another thread may have inserted while we upgraded.
        if let Some(config) = configs.get(plugin_name) {
            return config.clone();
        }

        let config = InterfaceConfig::default_for(plugin_name);
        configs.insert(plugin_name.to_string(), config.clone());
        info!(plugin = plugin_name, "auto-registered plugin interface");
        config
    }

    pub fn len(&self) -> usize {
        self.configs.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.read().unwrap().is_empty()
    }
}
