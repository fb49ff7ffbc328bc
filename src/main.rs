//! Rota Session - Entry Point
//!
//! Starts the rotation controller and the control API with graceful shutdown.

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rota_session::api::ApiServer;
use rota_session::config::{Config, LogConfig, StartupConfig};
use rota_session::error::Result;
use rota_session::models::ResourceRef;
use rota_session::rotation::{create_connector, RotationController, RotationHandle};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config.log);

    info!("Starting Rota Session");

    let connector = create_connector(&config.rotation);
    info!(
        "Using {} connector, {} sessions, {} on failure",
        connector.strategy_name(),
        rota_session::models::format_duration(config.rotation.session_duration.as_secs()),
        config.rotation.failure_policy.as_str()
    );

    let (controller, handle) = RotationController::new(config.rotation.clone(), connector)?;
    let controller_task = tokio::spawn(controller.run());

    preload(&handle, &config.startup).await?;

    let (shutdown_tx, api_shutdown) = watch::channel(false);
    let api_server = ApiServer::new(config.clone(), handle.clone());
    let api_task = tokio::spawn(async move {
        if let Err(e) = api_server.run(api_shutdown).await {
            error!("API server error: {}", e);
        }
    });

    info!("API started on {}", config.api_addr());

    shutdown_signal().await;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    if let Err(e) = handle.shutdown().await {
        warn!("Controller already stopped: {}", e);
    }

    let _ = tokio::join!(controller_task, api_task);

    info!("Rota Session stopped");
    Ok(())
}

fn init_tracing(log: &LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("rota_session={},tower_http=debug", log.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if log.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Load the proxy list and resource named in the environment, then start
/// rotating if asked to
async fn preload(handle: &RotationHandle, startup: &StartupConfig) -> Result<()> {
    if let Some(path) = &startup.proxy_file {
        let text = tokio::fs::read_to_string(path).await?;
        let loaded = handle.load_pool_text(&text).await?;
        info!("Loaded {} proxies from {}", loaded, path.display());
    }

    if let Some(url) = &startup.resource_url {
        let resource = ResourceRef::from_url(url)?;
        info!("Resource set to {}", resource.id);
        handle.set_resource(resource).await?;
    }

    if startup.autostart {
        match handle.start().await {
            Ok(()) => info!("Rotation started"),
            Err(e) => warn!("Autostart skipped: {}", e),
        }
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
