//! Storage trait definitions

use crate::error::StoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use maestro_types::{Deployment, DeploymentId, DeploymentStatus, LogEntry, Phase, Task};

/// Query filter for the deployment list endpoint.
#[derive(Debug, Clone, Default)]
pub struct DeploymentFilter {
    pub application: Option<String>,
    pub environment: Option<String>,
    pub region: Option<String>,
    pub status: Option<DeploymentStatus>,
    pub start_from: Option<DateTime<Utc>>,
    pub start_to: Option<DateTime<Utc>>,
    /// Offset into the result set.
    pub from: usize,
    /// Page size.
    pub size: usize,
}

impl DeploymentFilter {
    pub const DEFAULT_SIZE: usize = 10;
    pub const MAX_SIZE: usize = 100;
}

/// Storage for deployments, their tasks and their log streams.
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Upsert the full deployment record.
    async fn store_deployment(&self, deployment: &Deployment) -> StoreResult<()>;

    /// Fetch a deployment by id.
    async fn get_deployment(&self, id: &DeploymentId) -> StoreResult<Option<Deployment>>;

    /// Upsert a task on a deployment, preserving append-only logs and
    /// monotone status. Regressions are dropped field-wise, never applied.
    async fn store_task(&self, deployment_id: &DeploymentId, task: &Task) -> StoreResult<()>;

    /// Atomically append a timestamped line to the deployment's own log
    /// stream (distinct from per-task logs).
    async fn append_log(&self, deployment_id: &DeploymentId, message: &str) -> StoreResult<()>;

    /// Merge new keys into the deployment's free-form parameters.
    async fn add_to_deployment_parameters(
        &self,
        deployment_id: &DeploymentId,
        partial: serde_json::Map<String, serde_json::Value>,
    ) -> StoreResult<()>;

    /// Paginated deployment query, newest first.
    async fn list_deployments(&self, filter: &DeploymentFilter) -> StoreResult<Vec<Deployment>>;

    /// Deployment log lines at or after `since`, oldest first.
    async fn logs_since(
        &self,
        deployment_id: &DeploymentId,
        since: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<LogEntry>>;

    /// All deployments currently in one of the given phases.
    async fn deployments_in_phase(&self, phases: &[Phase]) -> StoreResult<Vec<Deployment>>;

    /// Deployments for a triple, newest first. Used by undo and rollback.
    async fn deployments_for(
        &self,
        application: &str,
        environment: &str,
        region: &str,
    ) -> StoreResult<Vec<Deployment>>;
}
