//! Liveness, lock and collection handlers

use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use maestro_cloud::OnixClient;
use maestro_types::Deployment;
use serde::Serialize;

/// `GET /ping`
pub async fn ping() -> &'static str {
    "pong"
}

/// Healthcheck response body
#[derive(Debug, Serialize)]
pub struct Healthcheck {
    pub name: &'static str,
    pub version: &'static str,
    pub success: bool,
}

/// `GET /healthcheck`
pub async fn healthcheck() -> Json<Healthcheck> {
    Json(Healthcheck {
        name: "maestro",
        version: env!("CARGO_PKG_VERSION"),
        success: true,
    })
}

/// Daemon status response body
#[derive(Debug, Serialize)]
pub struct DaemonStatus {
    pub name: &'static str,
    pub version: &'static str,
    pub uptime_seconds: i64,
}

/// `GET /status`
pub async fn daemon_status(State(state): State<AppState>) -> Json<DaemonStatus> {
    Json(DaemonStatus {
        name: "maestro",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: (chrono::Utc::now() - state.started_at).num_seconds(),
    })
}

/// `GET /lock` - 200 when locked, 404 when unlocked
pub async fn lock_state(State(state): State<AppState>) -> StatusCode {
    if state.control.locked().await {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

/// `POST /lock`
pub async fn set_lock(State(state): State<AppState>) -> StatusCode {
    state.control.lock().await;
    tracing::info!("Lock set");
    StatusCode::NO_CONTENT
}

/// `DELETE /lock`
pub async fn clear_lock(State(state): State<AppState>) -> StatusCode {
    state.control.unlock().await;
    tracing::info!("Lock cleared");
    StatusCode::NO_CONTENT
}

/// `GET /environments` - sorted environment names
pub async fn environments(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    let mut environments = state.onix.environments().await?;
    environments.sort();
    Ok(Json(environments))
}

/// `GET /in-progress`
pub async fn in_progress(State(state): State<AppState>) -> ApiResult<Json<Vec<Deployment>>> {
    Ok(Json(state.control.in_progress_deployments().await?))
}

/// `GET /paused`
pub async fn paused(State(state): State<AppState>) -> ApiResult<Json<Vec<Deployment>>> {
    Ok(Json(state.control.paused_deployments().await?))
}

/// `GET /awaiting-pause`
pub async fn awaiting_pause(State(state): State<AppState>) -> ApiResult<Json<Vec<Deployment>>> {
    Ok(Json(state.control.awaiting_pause_deployments().await?))
}
