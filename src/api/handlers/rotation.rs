//! Rotation control handlers

use std::time::Duration;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::api::server::AppState;
use crate::config::RotationConfig;
use crate::error::RotaError;
use crate::models::{format_duration, ResourceRef};

/// Body for setting the resource
#[derive(Debug, Deserialize)]
pub struct SetResourceRequest {
    pub url: String,
}

/// Body for updating rotation settings
#[derive(Debug, Deserialize)]
pub struct UpdateConfigRequest {
    /// Session duration in minutes (1 - 1440)
    pub session_duration_minutes: u64,
}

/// Current controller status
pub async fn get_status(State(state): State<AppState>) -> Result<impl IntoResponse, RotaError> {
    Ok(Json(state.rotation.status().await?))
}

/// Run statistics
pub async fn get_stats(State(state): State<AppState>) -> Result<impl IntoResponse, RotaError> {
    Ok(Json(state.rotation.stats().await?))
}

/// Start or resume the rotation
pub async fn start(State(state): State<AppState>) -> Result<impl IntoResponse, RotaError> {
    state.rotation.start().await?;
    Ok(Json(state.rotation.status().await?))
}

/// Pause the rotation, keeping stats
pub async fn pause(State(state): State<AppState>) -> Result<impl IntoResponse, RotaError> {
    state.rotation.pause().await?;
    Ok(Json(state.rotation.status().await?))
}

/// Stop the rotation and clear stats
pub async fn reset(State(state): State<AppState>) -> Result<impl IntoResponse, RotaError> {
    state.rotation.reset().await?;
    Ok(Json(state.rotation.status().await?))
}

/// Replace the proxy pool from a newline-delimited body
pub async fn load_pool(
    State(state): State<AppState>,
    body: String,
) -> Result<impl IntoResponse, RotaError> {
    let loaded = state.rotation.load_pool_text(&body).await?;
    info!("{} proxies loaded via API", loaded);
    Ok(Json(json!({ "loaded": loaded })))
}

/// Set the resource every session binds to
pub async fn set_resource(
    State(state): State<AppState>,
    Json(req): Json<SetResourceRequest>,
) -> Result<impl IntoResponse, RotaError> {
    let resource = ResourceRef::from_url(&req.url)?;
    state.rotation.set_resource(resource.clone()).await?;

    Ok(Json(json!({
        "id": resource.id,
        "source_url": resource.source_url,
        "embed_url": resource.embed_url(),
    })))
}

/// Update the session duration; applies from the next session
pub async fn update_config(
    State(state): State<AppState>,
    Json(req): Json<UpdateConfigRequest>,
) -> Result<impl IntoResponse, RotaError> {
    let duration: Duration =
        RotationConfig::session_duration_from_minutes(req.session_duration_minutes)?;
    state.rotation.set_session_duration(duration).await?;

    Ok(Json(json!({
        "session_duration_secs": duration.as_secs(),
        "session_duration": format_duration(duration.as_secs()),
    })))
}
