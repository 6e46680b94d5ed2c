//! Per-hash configuration service
//!
//! Tyranitar holds the version-controlled application-properties,
//! deployment-params and launch-data documents, addressed by commit hash.

use crate::error::CloudResult;
use async_trait::async_trait;

#[async_trait]
pub trait TyranitarClient: Send + Sync {
    /// The most recent hash for (environment, application), if any exists.
    async fn latest_hash(&self, environment: &str, application: &str)
        -> CloudResult<Option<String>>;

    /// Whether a hash is known for (environment, application).
    async fn hash_exists(
        &self,
        environment: &str,
        application: &str,
        hash: &str,
    ) -> CloudResult<bool>;

    /// The application-properties document at a hash.
    async fn application_properties(
        &self,
        environment: &str,
        application: &str,
        hash: &str,
    ) -> CloudResult<Option<serde_json::Value>>;

    /// The deployment-params document at a hash.
    async fn deployment_params(
        &self,
        environment: &str,
        application: &str,
        hash: &str,
    ) -> CloudResult<Option<serde_json::Value>>;

    /// The launch-data lines at a hash.
    async fn launch_data(
        &self,
        environment: &str,
        application: &str,
        hash: &str,
    ) -> CloudResult<Option<Vec<String>>>;
}
