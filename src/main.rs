//! PteroEngine - A simulated game/app server hosting panel
//!
//! Manages hosted instances with a power lifecycle, a virtual file store,
//! a live console and simulated provisioning work, persisted to SQLite.

#![allow(dead_code)] // Registry and store APIs are wider than the shell uses

mod core;
mod persistence;
mod shell;

use std::path::PathBuf;

use anyhow::Result;
use single_instance::SingleInstance;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry};

use crate::core::{InstanceRegistry, Settings};
use crate::persistence::Database;
use crate::shell::Shell;

/// Application name constant
pub const APP_NAME: &str = "PteroEngine";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let log_filter = init_logging();

    info!("{} v{} starting...", APP_NAME, APP_VERSION);

    // Ensure only one process writes the state slot
    let instance = SingleInstance::new(APP_NAME)
        .map_err(|e| anyhow::anyhow!("Failed to create single instance lock: {}", e))?;
    if !instance.is_single() {
        error!("Another instance of {} is already running!", APP_NAME);
        return Ok(());
    }

    // An explicit data directory may be passed as the only argument
    let mut settings = Settings::default();
    settings.data_directory = std::env::args().nth(1).map(PathBuf::from);

    // Initialize database
    let db = Database::new(&settings.get_database_path())?;
    db.initialize()?;
    info!("Database initialized");

    // Create application state
    let registry = InstanceRegistry::new(db)?;
    info!("Registry initialized with {} instances", registry.instance_count());

    if registry.settings().debug_logging && std::env::var_os("RUST_LOG").is_none() {
        if let Err(e) = log_filter.reload(EnvFilter::new("pteroengine=debug")) {
            error!("Failed to enable debug logging: {}", e);
        }
    }

    Shell::new(registry.clone()).run().await?;

    registry.shutdown().await;
    info!("{} shutting down", APP_NAME);
    Ok(())
}

/// Initialize the logging system. The returned handle swaps the filter later.
fn init_logging() -> reload::Handle<EnvFilter, Registry> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pteroengine=info"));
    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    handle
}
