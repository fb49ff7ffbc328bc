//! API server using Axum
//!
//! Serves the control endpoints that drive the rotation controller.

use std::net::SocketAddr;
use std::time::Instant;

use axum::Router;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::config::{ApiServerConfig, Config};
use crate::error::{Result, RotaError};
use crate::rotation::RotationHandle;

use super::middleware::cors_layer;
use super::routes;

/// Shared state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub rotation: RotationHandle,
    pub config: Config,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(rotation: RotationHandle, config: Config) -> Self {
        Self {
            rotation,
            config,
            started_at: Instant::now(),
        }
    }
}

/// API server
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(config: Config, rotation: RotationHandle) -> Self {
        Self {
            config: config.api.clone(),
            state: AppState::new(rotation, config),
        }
    }

    /// Build the router with CORS and request tracing applied
    pub fn build_router(&self) -> Router {
        let cors = cors_layer(&self.config.cors_origins);

        routes::create_router(self.state.clone())
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the API server until `shutdown` flips
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| RotaError::InvalidConfig(format!("invalid API address: {}", e)))?;

        let router = self.build_router();

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("API server listening on {}", addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
            .map_err(|e| RotaError::Internal(e.to_string()))?;

        info!("API server shut down");
        Ok(())
    }
}
