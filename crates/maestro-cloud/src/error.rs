//! Error types for collaborator calls
//!
//! Every error carries a kind tag so callers can classify without matching
//! on message text: the tracker hides `upstream-fault` kinds and
//! reschedules, the pipeline retries only `configuration-unexpected-response`,
//! and the executor treats `unexpected-remote-status` and `asg-not-found`
//! as fatal.

use thiserror::Error;

/// Collaborator error type
#[derive(Debug, Error)]
pub enum CloudError {
    /// Transport-level fault: connection refused, timeouts, unknown host.
    #[error("HTTP fault while calling {service}: {message}")]
    Http { service: String, message: String },

    /// The upstream answered definitively that the thing does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// A state-changing call did not yield the expected redirect.
    #[error("Unexpected status while {operation}: {status}")]
    UnexpectedStatus { operation: String, status: u16 },

    /// The target ASG is gone but the operation requires it.
    #[error("Auto Scaling Group does not exist.")]
    AsgNotFound,

    /// The upstream answered, but with something we could not parse.
    #[error("Unexpected response from {service}: {message}")]
    UnexpectedResponse { service: String, message: String },
}

impl CloudError {
    pub fn http(service: impl Into<String>, message: impl ToString) -> Self {
        Self::Http {
            service: service.into(),
            message: message.to_string(),
        }
    }

    /// The kind tag carried by this error.
    pub fn kind(&self) -> &'static str {
        match self {
            CloudError::Http { .. } => "upstream-fault(http)",
            CloudError::NotFound(_) => "upstream-not-found",
            CloudError::UnexpectedStatus { .. } => "unexpected-remote-status",
            CloudError::AsgNotFound => "asg-not-found",
            CloudError::UnexpectedResponse { .. } => "configuration-unexpected-response",
        }
    }

    /// Transport faults are transient: the tracker reschedules instead of
    /// failing the task.
    pub fn is_transient(&self) -> bool {
        matches!(self, CloudError::Http { .. })
    }
}

/// Result type for collaborator operations
pub type CloudResult<T> = Result<T, CloudError>;
