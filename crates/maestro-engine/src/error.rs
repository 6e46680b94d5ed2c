//! Error types for the engine

use maestro_cloud::CloudError;
use maestro_store::StoreError;
use maestro_types::DeploymentId;
use thiserror::Error;

/// Engine error type
#[derive(Debug, Error)]
pub enum EngineError {
    /// Store fault
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Collaborator fault
    #[error("Cloud error: {0}")]
    Cloud(#[from] CloudError),

    /// Deployment not found
    #[error("Deployment {0} not found")]
    DeploymentNotFound(DeploymentId),

    /// The deployment record is missing state a task needs
    #[error("Deployment {deployment_id} is missing {what}")]
    MissingState {
        deployment_id: DeploymentId,
        what: String,
    },
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
