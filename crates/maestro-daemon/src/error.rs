//! Error types for maestro-daemon

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use maestro_control::ControlError;
use maestro_store::StoreError;
use serde::Serialize;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Collaborator client construction failed
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// API-specific errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// The system is locked; refuse with the canonical message.
    #[error("Maestro is currently closed for business.")]
    Locked,

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Conflict
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::DeploymentNotFound(id) => ApiError::NotFound(format!("Deployment {id}")),
            StoreError::TaskNotFound { task_id, .. } => {
                ApiError::NotFound(format!("Task {task_id}"))
            }
            StoreError::InvalidQuery(message) => ApiError::BadRequest(message),
            StoreError::Backend(message) => ApiError::Internal(message),
        }
    }
}

impl From<ControlError> for ApiError {
    fn from(error: ControlError) -> Self {
        match error {
            ControlError::Locked => ApiError::Locked,
            ControlError::IllegalApplicationName(_) | ControlError::Validation(_) => {
                ApiError::BadRequest(error.to_string())
            }
            ControlError::NotFound(what) => ApiError::NotFound(what),
            ControlError::AlreadyInProgress(_)
            | ControlError::NothingToUndo(_)
            | ControlError::NothingToRollBack(_)
            | ControlError::NotInProgress(_)
            | ControlError::NotPaused(_)
            | ControlError::NotAwaitingPause(_) => ApiError::Conflict(error.to_string()),
            ControlError::Store(store) => store.into(),
            ControlError::Engine(engine) => ApiError::Internal(engine.to_string()),
        }
    }
}

impl From<maestro_cloud::CloudError> for ApiError {
    fn from(error: maestro_cloud::CloudError) -> Self {
        match &error {
            maestro_cloud::CloudError::NotFound(what) => ApiError::NotFound(what.clone()),
            _ => ApiError::Internal(error.to_string()),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            // the lock refusal is a plain-text contract with callers
            ApiError::Locked => {
                return (StatusCode::CONFLICT, self.to_string()).into_response()
            }
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };
        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;
