//! Policy-configuration service
//!
//! Shuppet must answer affirmatively before a deployment proceeds in
//! governed environments. A definite absence fails the deployment; a
//! response that cannot be parsed is reported as
//! `configuration-unexpected-response`, which the pipeline retries.

use crate::error::CloudResult;
use async_trait::async_trait;

#[async_trait]
pub trait ShuppetClient: Send + Sync {
    /// The policy configuration for an application in an environment.
    /// `Ok(None)` means definitively absent; a parse fault surfaces as
    /// [`crate::CloudError::UnexpectedResponse`].
    async fn configuration(
        &self,
        environment: &str,
        application: &str,
    ) -> CloudResult<Option<serde_json::Value>>;
}
