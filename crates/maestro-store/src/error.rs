//! Error types for the store

use maestro_types::{DeploymentId, TaskId};
use thiserror::Error;

/// Store error type
#[derive(Debug, Error)]
pub enum StoreError {
    /// Deployment not found
    #[error("Deployment {0} not found")]
    DeploymentNotFound(DeploymentId),

    /// Task not found within a deployment
    #[error("Task {task_id} not found on deployment {deployment_id}")]
    TaskNotFound {
        deployment_id: DeploymentId,
        task_id: TaskId,
    },

    /// Invalid query parameters
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Backing store fault
    #[error("Store fault: {0}")]
    Backend(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
