//! keelsrv - plugin platform control plane
//!
//! Registers plugins, keeps the route table and resolves gateway requests.

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use errors::KeelResult;
use keelsrv::app_state::AppState;
use keelsrv::bootstrap::{self, Args, Command};
use keelsrv::routes::create_routes;

/// Time background tasks get to stop after the server has drained
const BACKGROUND_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> KeelResult<()> {
    let args = Args::parse();
    let config = bootstrap::load_configuration(&args)?;

    if let Some(Command::Check) = args.command {
        println!("{}", bootstrap::describe(&config)?);
        println!("Configuration OK");
        return Ok(());
    }

    bootstrap::initialize_logging(&config)?;
    info!(
        "Starting {} v{} (platform {})",
        config.service.name,
        env!("CARGO_PKG_VERSION"),
        config.service.platform_version
    );

    let store = bootstrap::setup_state_store(&config).await?;
    let client = bootstrap::setup_plugin_client(&config)?;
    let addr = config.listen_addr();
    let state = Arc::new(AppState::new(config, store, client));

    let shutdown_token = CancellationToken::new();
    let signal_handle = common::shutdown::cancel_on_shutdown(shutdown_token.clone());
    let background = state.spawn_background(&shutdown_token);

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        errors::KeelError::Configuration(format!("Failed to bind {}: {}", addr, e))
    })?;
    info!("API server listening on http://{}", addr);

    let app = create_routes(state);
    let server_token = shutdown_token.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_token.cancelled().await })
        .await;
    if let Err(e) = served {
        error!("API server error: {}", e);
    }

    // Server may also stop on its own; make sure everything else follows
    shutdown_token.cancel();
    for handle in background {
        if tokio::time::timeout(BACKGROUND_STOP_TIMEOUT, handle).await.is_err() {
            warn!("Background task did not stop in time");
        }
    }
    signal_handle.abort();

    info!("keelsrv stopped");
    Ok(())
}
