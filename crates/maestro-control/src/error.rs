//! Error types for the control plane

use maestro_engine::EngineError;
use maestro_store::{StoreError, Triple};
use thiserror::Error;

/// Control plane error type
#[derive(Debug, Error)]
pub enum ControlError {
    /// The global lock is set; no new work is accepted.
    #[error("Maestro is currently closed for business.")]
    Locked,

    /// Another deployment already owns the in-progress slot.
    #[error("A deployment of {0} is already in progress")]
    AlreadyInProgress(Triple),

    /// Application names are lower-case letters only.
    #[error("Application name {0} is illegal")]
    IllegalApplicationName(String),

    /// Request validation failure.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Nothing suitable to act on.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Undo needs an unsuccessful or in-flight deployment.
    #[error("Nothing to undo for {0}")]
    NothingToUndo(Triple),

    /// Rollback needs at least two completed deployments.
    #[error("Not enough completed deployments to roll back {0}")]
    NothingToRollBack(Triple),

    /// No deployment for the triple is in progress.
    #[error("No deployment of {0} is in progress")]
    NotInProgress(Triple),

    /// Pause flag state does not allow the operation.
    #[error("Deployment of {0} is not paused")]
    NotPaused(Triple),

    /// No pause is registered for the triple.
    #[error("No pause is registered for {0}")]
    NotAwaitingPause(Triple),

    /// Store fault
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Engine fault
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Result type for control plane operations
pub type ControlResult<T> = Result<T, ControlError>;
