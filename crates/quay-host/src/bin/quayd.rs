//! quayd -- the quay plugin host daemon.
//!
//! Loads the host configuration, opens the plugin catalog, builds the
//! lifecycle service, restores every plugin the catalog marks active, and
//! supervises them until shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use quay_catalog::{Catalog, PluginFilter, SqliteCatalog};
use quay_host::autoload;
use quay_host::installer::Installer;
use quay_host::pool::ClientPool;
use quay_host::registry::InterfaceRegistry;
use quay_host::service::PluginService;
use quay_types::HostConfig;

/// quayd -- polyglot plugin host daemon.
#[derive(Parser, Debug)]
#[command(name = "quayd", version, about)]
struct Cli {
    /// Path to the host configuration file (TOML). Defaults under ~/.quay.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Increase logging verbosity (RUST_LOG=debug)
    #[arg(long, short)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, short)]
    quiet: bool,
}

fn base_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home).join(".quay")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // --verbose sets debug, --quiet sets error, otherwise respect RUST_LOG.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else if cli.quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => HostConfig::load(path)?,
        None => HostConfig::default_for(&base_dir()),
    };
    config.validate()?;

    if let Some(parent) = config.catalog_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let catalog: Arc<dyn Catalog> = Arc::new(SqliteCatalog::open(&config.catalog_path)?);
    let registry = Arc::new(InterfaceRegistry::new());
    let pool = Arc::new(ClientPool::new(registry, config.startup_timeout()));
    let installer = Installer::new(config.download_timeout())?;

    // The lifecycle service is the surface the API layer drives; the daemon
    // owns it for the lifetime of the process.
    let service = Arc::new(PluginService::new(
        Arc::clone(&catalog),
        Arc::clone(&pool),
        installer,
        config.plugin_root.clone(),
    ));

    let plugins = service.list(&PluginFilter::default())?;
    tracing::info!(total = plugins.len(), "plugin catalog ready");

    let (loaded, failed) = autoload::load_active_plugins(&catalog, &pool).await;
    tracing::info!(loaded, failed, "plugin auto-load complete");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down, unloading all plugins");
    autoload::shutdown(&pool).await;

    Ok(())
}
