//! Application registry handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::extract::{Path, State};
use axum::Json;
use maestro_cloud::{OnixApplication, OnixClient};
use maestro_types::OnixMetadata;
use regex::Regex;
use std::sync::OnceLock;

fn application_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z]+$").unwrap())
}

/// `GET /applications`
pub async fn list_applications(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(state.onix.applications().await?))
}

/// `GET /applications/:app`
pub async fn get_application(
    State(state): State<AppState>,
    Path(app): Path<String>,
) -> ApiResult<Json<OnixApplication>> {
    let application = state
        .onix
        .application(&app)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Application {app}")))?;
    Ok(Json(application))
}

/// `PUT /applications/:app` - upsert; identical input yields an identical
/// registration.
pub async fn upsert_application(
    State(state): State<AppState>,
    Path(app): Path<String>,
    Json(metadata): Json<OnixMetadata>,
) -> ApiResult<Json<OnixApplication>> {
    if !application_name_pattern().is_match(&app) {
        return Err(ApiError::BadRequest(format!(
            "Application name {app} is illegal"
        )));
    }
    let application = state.onix.upsert_application(&app, metadata).await?;
    tracing::info!(application = %app, "Application upserted");
    Ok(Json(application))
}
