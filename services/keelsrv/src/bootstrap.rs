//! Service Bootstrap and Initialization
//!
//! This module handles service initialization including:
//! - Command-line parsing
//! - Configuration loading and validation
//! - Logging configuration
//! - State store and plugin client construction

use anyhow::Context;
use clap::{Parser, Subcommand};
use errors::{KeelError, KeelResult};
use keel_state::{MemoryStateStore, RedisStateStore, StateStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::config::{KeelsrvConfig, StoreBackend, DEFAULT_CONFIG_PATH};
use crate::plugin_client::{HttpPluginClient, PluginClient};

/// Command-line arguments for keelsrv
#[derive(Parser, Debug, Clone)]
#[command(
    name = "keelsrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "Plugin platform control plane",
    long_about = None
)]
pub struct Args {
    /// Configuration file
    #[arg(short, long, value_name = "FILE", env = "KEELSRV_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Override the API port
    #[arg(short, long)]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Validate and print the effective configuration
    Check,
}

/// Load, apply CLI overrides and validate
pub fn load_configuration(args: &Args) -> KeelResult<KeelsrvConfig> {
    let mut config = KeelsrvConfig::load_from(&args.config)?;
    if let Some(port) = args.port {
        config.api.port = port;
    }
    config.validate()?;
    Ok(config)
}

/// Initialize logging from the `logging` section
pub fn initialize_logging(config: &KeelsrvConfig) -> KeelResult<()> {
    let log_config = common::logging::LogConfig {
        service_name: config.service.name.clone(),
        level: config.logging.level.clone(),
        log_dir: config.logging.dir.clone(),
        enable_json: config.logging.json_file,
    };
    common::logging::init_with_config(&log_config)
        .map_err(|e| KeelError::Configuration(format!("Failed to init logging: {}", e)))
}

/// Open the configured state store
pub async fn setup_state_store(config: &KeelsrvConfig) -> anyhow::Result<Arc<dyn StateStore>> {
    match config.store.backend {
        StoreBackend::Memory => {
            info!("Using in-memory state store");
            Ok(Arc::new(MemoryStateStore::new()))
        },
        StoreBackend::Redis => {
            let store = RedisStateStore::new(&config.store.redis_url)
                .await
                .with_context(|| format!("connecting to {}", config.store.redis_url))?;
            info!("Using Redis state store at {}", config.store.redis_url);
            Ok(Arc::new(store))
        },
    }
}

pub fn setup_plugin_client(config: &KeelsrvConfig) -> KeelResult<Arc<dyn PluginClient>> {
    let client = HttpPluginClient::new(
        config.plugins.base_url_template.clone(),
        config.plugins.request_timeout,
    )?;
    Ok(Arc::new(client))
}

/// Human-readable dump for `keelsrv check`
pub fn describe(config: &KeelsrvConfig) -> KeelResult<String> {
    let mut shown = config.clone();
    shown.token.secret = "********".to_string();
    serde_yaml::to_string(&shown).map_err(|e| KeelError::Serialization(e.to_string()))
}
