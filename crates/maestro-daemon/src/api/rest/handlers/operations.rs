//! Deployment operation handlers

use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::extract::{Path, State};
use axum::Json;
use maestro_control::DeployRequest;
use serde::{Deserialize, Serialize};

/// Body of `POST /applications/:app/:env/deploy`
#[derive(Debug, Deserialize)]
pub struct DeployBody {
    pub ami: String,
    #[serde(default)]
    pub hash: Option<String>,
    pub message: String,
    #[serde(default)]
    pub silent: bool,
    pub user: String,
    /// Region override; the daemon default applies otherwise.
    #[serde(default)]
    pub region: Option<String>,
}

/// Body of undo/rollback requests.
#[derive(Debug, Default, Deserialize)]
pub struct OperationBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

/// Response carrying the new deployment's id.
#[derive(Debug, Serialize)]
pub struct DeploymentIdResponse {
    pub id: String,
}

/// `POST /applications/:app/:env/deploy`
pub async fn deploy(
    State(state): State<AppState>,
    Path((app, env)): Path<(String, String)>,
    Json(body): Json<DeployBody>,
) -> ApiResult<Json<DeploymentIdResponse>> {
    let region = body.region.unwrap_or_else(|| state.default_region.clone());
    let id = state
        .control
        .begin(
            &app,
            &env,
            &region,
            DeployRequest {
                ami: body.ami,
                hash: body.hash,
                message: body.message,
                silent: body.silent,
                user: body.user,
            },
        )
        .await?;
    Ok(Json(DeploymentIdResponse { id: id.to_string() }))
}

/// `POST /applications/:app/:env/undo`
pub async fn undo(
    State(state): State<AppState>,
    Path((app, env)): Path<(String, String)>,
    body: Option<Json<OperationBody>>,
) -> ApiResult<Json<DeploymentIdResponse>> {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let region = body.region.unwrap_or_else(|| state.default_region.clone());
    let id = state
        .control
        .undo(
            &app,
            &env,
            &region,
            body.user.as_deref().unwrap_or("maestro"),
            body.message.as_deref().unwrap_or("Undoing deployment"),
        )
        .await?;
    Ok(Json(DeploymentIdResponse { id: id.to_string() }))
}

/// `POST /applications/:app/:env/rollback`
pub async fn rollback(
    State(state): State<AppState>,
    Path((app, env)): Path<(String, String)>,
    body: Option<Json<OperationBody>>,
) -> ApiResult<Json<DeploymentIdResponse>> {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let region = body.region.unwrap_or_else(|| state.default_region.clone());
    let id = state
        .control
        .rollback(
            &app,
            &env,
            &region,
            body.user.as_deref().unwrap_or("maestro"),
            body.message.as_deref().unwrap_or("Rolling back deployment"),
        )
        .await?;
    Ok(Json(DeploymentIdResponse { id: id.to_string() }))
}

/// `POST /applications/:app/:env/pause`
pub async fn register_pause(
    State(state): State<AppState>,
    Path((app, env)): Path<(String, String)>,
) -> ApiResult<()> {
    state
        .control
        .register_pause(&app, &env, &state.default_region)
        .await?;
    Ok(())
}

/// `DELETE /applications/:app/:env/pause`
pub async fn unregister_pause(
    State(state): State<AppState>,
    Path((app, env)): Path<(String, String)>,
) -> ApiResult<()> {
    state
        .control
        .unregister_pause(&app, &env, &state.default_region)
        .await?;
    Ok(())
}

/// `POST /applications/:app/:env/resume`
pub async fn resume(
    State(state): State<AppState>,
    Path((app, env)): Path<(String, String)>,
) -> ApiResult<Json<DeploymentIdResponse>> {
    let id = state
        .control
        .resume(&app, &env, &state.default_region)
        .await?;
    Ok(Json(DeploymentIdResponse { id: id.to_string() }))
}
