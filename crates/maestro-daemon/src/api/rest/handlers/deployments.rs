//! Deployment query handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use maestro_store::{DeploymentFilter, DeploymentStore};
use maestro_types::{Deployment, DeploymentId, DeploymentStatus, LogEntry, Phase, Task};
use serde::{Deserialize, Serialize};

/// Raw query string for the deployment list; everything is validated by
/// hand so a bad parameter is a 400 naming the offender.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub application: Option<String>,
    pub environment: Option<String>,
    pub region: Option<String>,
    pub status: Option<String>,
    pub from: Option<String>,
    pub size: Option<String>,
    #[serde(rename = "start-from")]
    pub start_from: Option<String>,
    #[serde(rename = "start-to")]
    pub start_to: Option<String>,
    pub full: Option<String>,
}

fn parse_status(value: &str) -> ApiResult<DeploymentStatus> {
    match value {
        "running" => Ok(DeploymentStatus::Running),
        "completed" => Ok(DeploymentStatus::Completed),
        "failed" => Ok(DeploymentStatus::Failed),
        "terminated" => Ok(DeploymentStatus::Terminated),
        other => Err(ApiError::BadRequest(format!("Invalid status {other}"))),
    }
}

fn parse_number(value: &str, name: &str) -> ApiResult<usize> {
    value
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid {name} {value}")))
}

fn parse_date(value: &str, name: &str) -> ApiResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|date| date.with_timezone(&Utc))
        .map_err(|_| ApiError::BadRequest(format!("Invalid {name} {value}")))
}

fn parse_bool(value: &str, name: &str) -> ApiResult<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(ApiError::BadRequest(format!("Invalid {name} {other}"))),
    }
}

/// Summary shape returned unless `full=true`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeploymentSummary {
    pub id: DeploymentId,
    pub application: String,
    pub environment: String,
    pub region: String,
    pub user: String,
    pub message: String,
    pub created: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    pub phase: Phase,
    pub status: DeploymentStatus,
}

impl From<Deployment> for DeploymentSummary {
    fn from(deployment: Deployment) -> Self {
        Self {
            id: deployment.id,
            application: deployment.application,
            environment: deployment.environment,
            region: deployment.region,
            user: deployment.user,
            message: deployment.message,
            created: deployment.created,
            start: deployment.start,
            end: deployment.end,
            phase: deployment.phase,
            status: deployment.status,
        }
    }
}

/// `GET /deployments`
pub async fn list_deployments(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let mut filter = DeploymentFilter {
        application: query.application,
        environment: query.environment,
        region: query.region,
        size: DeploymentFilter::DEFAULT_SIZE,
        ..Default::default()
    };
    if let Some(status) = query.status.as_deref() {
        filter.status = Some(parse_status(status)?);
    }
    if let Some(from) = query.from.as_deref() {
        filter.from = parse_number(from, "from")?;
    }
    if let Some(size) = query.size.as_deref() {
        filter.size = parse_number(size, "size")?;
    }
    if let Some(start_from) = query.start_from.as_deref() {
        filter.start_from = Some(parse_date(start_from, "start-from")?);
    }
    if let Some(start_to) = query.start_to.as_deref() {
        filter.start_to = Some(parse_date(start_to, "start-to")?);
    }
    let full = match query.full.as_deref() {
        Some(value) => parse_bool(value, "full")?,
        None => false,
    };

    let deployments = state.store.list_deployments(&filter).await?;
    let body = if full {
        serde_json::to_value(&deployments)
    } else {
        let summaries: Vec<DeploymentSummary> =
            deployments.into_iter().map(DeploymentSummary::from).collect();
        serde_json::to_value(&summaries)
    }
    .map_err(|error| ApiError::Internal(error.to_string()))?;
    Ok(Json(body))
}

fn parse_deployment_id(id: &str) -> ApiResult<DeploymentId> {
    id.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid deployment id {id}")))
}

/// `GET /deployments/:id`
pub async fn get_deployment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Deployment>> {
    let deployment_id = parse_deployment_id(&id)?;
    let deployment = state
        .store
        .get_deployment(&deployment_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Deployment {id}")))?;
    Ok(Json(deployment))
}

/// `GET /deployments/:id/tasks`
pub async fn deployment_tasks(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Task>>> {
    let deployment_id = parse_deployment_id(&id)?;
    let deployment = state
        .store
        .get_deployment(&deployment_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Deployment {id}")))?;
    Ok(Json(deployment.tasks))
}

/// Log query string
#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    pub since: Option<String>,
}

/// `GET /deployments/:id/logs`
pub async fn deployment_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<Json<Vec<LogEntry>>> {
    let deployment_id = parse_deployment_id(&id)?;
    let since = match query.since.as_deref() {
        Some(value) => Some(parse_date(value, "since")?),
        None => None,
    };
    let logs = state.store.logs_since(&deployment_id, since).await?;
    Ok(Json(logs))
}
