//! API route definitions

use axum::routing::{get, post, put};
use axum::Router;

use super::handlers;
use super::server::AppState;
use super::websocket;

/// Create the API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .nest("/api", api_routes())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        // Read side
        .route("/status", get(handlers::rotation::get_status))
        .route("/stats", get(handlers::rotation::get_stats))
        // Run control
        .route("/start", post(handlers::rotation::start))
        .route("/pause", post(handlers::rotation::pause))
        .route("/reset", post(handlers::rotation::reset))
        // Inputs
        .route("/pool", put(handlers::rotation::load_pool))
        .route("/resource", put(handlers::rotation::set_resource))
        .route("/config", put(handlers::rotation::update_config))
        // Event streams
        .route("/events", get(handlers::events::event_stream))
        .route("/ws/events", get(websocket::events::events_ws))
}
