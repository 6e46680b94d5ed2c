//! Pipeline error type
//!
//! Every failure carries a kind tag; the tag (not the message) drives
//! behaviour: `configuration-unexpected-response` is the only kind a step
//! may turn into a retry, everything else terminates the deployment.

use maestro_cloud::CloudError;
use std::fmt;
use thiserror::Error;

/// Classification tags for preparation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MissingField,
    UpstreamNotFound,
    UpstreamFault,
    MismatchedImage,
    IncompatibleInstanceType,
    UnknownSecurityGroups,
    MissingLoadBalancers,
    NoSubnets,
    NoMatchingZones,
    UnexpectedRemoteStatus,
    AsgNotFound,
    ConfigurationMissing,
    ConfigurationUnexpectedResponse,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::MissingField => "missing-field",
            ErrorKind::UpstreamNotFound => "upstream-not-found",
            ErrorKind::UpstreamFault => "upstream-fault",
            ErrorKind::MismatchedImage => "mismatched-image",
            ErrorKind::IncompatibleInstanceType => "incompatible-instance-type",
            ErrorKind::UnknownSecurityGroups => "unknown-security-groups",
            ErrorKind::MissingLoadBalancers => "missing-load-balancers",
            ErrorKind::NoSubnets => "no-subnets",
            ErrorKind::NoMatchingZones => "no-matching-zones",
            ErrorKind::UnexpectedRemoteStatus => "unexpected-remote-status",
            ErrorKind::AsgNotFound => "asg-not-found",
            ErrorKind::ConfigurationMissing => "configuration-missing",
            ErrorKind::ConfigurationUnexpectedResponse => "configuration-unexpected-response",
        };
        f.write_str(s)
    }
}

/// A terminating preparation failure.
#[derive(Debug, Error)]
#[error("[{kind}] {message}")]
pub struct PipelineError {
    pub kind: ErrorKind,
    pub message: String,
    /// Structured payload, e.g. the complete list of unresolved names.
    pub details: Option<serde_json::Value>,
}

impl PipelineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        kind: ErrorKind,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(ErrorKind::MissingField, format!("Missing field {field}"))
    }
}

impl From<CloudError> for PipelineError {
    fn from(error: CloudError) -> Self {
        let kind = match &error {
            CloudError::Http { .. } => ErrorKind::UpstreamFault,
            CloudError::NotFound(_) => ErrorKind::UpstreamNotFound,
            CloudError::UnexpectedStatus { .. } => ErrorKind::UnexpectedRemoteStatus,
            CloudError::AsgNotFound => ErrorKind::AsgNotFound,
            CloudError::UnexpectedResponse { .. } => ErrorKind::ConfigurationUnexpectedResponse,
        };
        Self::new(kind, error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags_render_kebab_case() {
        assert_eq!(ErrorKind::UnknownSecurityGroups.to_string(), "unknown-security-groups");
        assert_eq!(
            ErrorKind::ConfigurationUnexpectedResponse.to_string(),
            "configuration-unexpected-response"
        );
    }

    #[test]
    fn test_cloud_error_mapping() {
        let error: PipelineError = CloudError::AsgNotFound.into();
        assert_eq!(error.kind, ErrorKind::AsgNotFound);
    }
}
