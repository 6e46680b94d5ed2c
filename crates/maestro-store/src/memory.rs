//! In-memory store implementation
//!
//! Mutations take the write lock for the whole read-modify-write, so
//! concurrent writers for the same deployment cannot lose log lines. That
//! is the same guarantee the adapter must provide over a real document
//! store that lacks atomic appends.

use crate::error::{StoreError, StoreResult};
use crate::traits::{DeploymentFilter, DeploymentStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use maestro_types::{Deployment, DeploymentId, LogEntry, Phase, Task};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct DeploymentRecord {
    deployment: Deployment,
    log: Vec<LogEntry>,
}

/// In-memory deployment store for development and testing.
#[derive(Debug, Default)]
pub struct InMemoryDeploymentStore {
    deployments: RwLock<HashMap<DeploymentId, DeploymentRecord>>,
}

impl InMemoryDeploymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Merge an incoming task into the stored one without ever regressing
/// status, overwriting a set `end`, or shrinking the log.
fn merge_task(stored: &mut Task, incoming: &Task) {
    if incoming.status.rank() >= stored.status.rank() && !stored.status.is_terminal() {
        stored.status = incoming.status;
    }
    if stored.start.is_none() {
        stored.start = incoming.start;
    }
    if stored.end.is_none() {
        stored.end = incoming.end;
    }
    if incoming.remote.is_some() {
        stored.remote = incoming.remote.clone();
    }
    if incoming.log.len() > stored.log.len() {
        let tail = incoming.log[stored.log.len()..].to_vec();
        stored.log.extend(tail);
    }
}

#[async_trait]
impl DeploymentStore for InMemoryDeploymentStore {
    async fn store_deployment(&self, deployment: &Deployment) -> StoreResult<()> {
        let mut deployments = self.deployments.write().await;
        match deployments.get_mut(&deployment.id) {
            Some(record) => {
                let mut merged = deployment.clone();
                // apply the monotone rules task-wise against what we hold
                for task in merged.tasks.iter_mut() {
                    if let Some(stored) = record.deployment.task(&task.id) {
                        let mut base = stored.clone();
                        merge_task(&mut base, task);
                        *task = base;
                    }
                }
                record.deployment = merged;
            }
            None => {
                deployments.insert(
                    deployment.id.clone(),
                    DeploymentRecord {
                        deployment: deployment.clone(),
                        log: Vec::new(),
                    },
                );
            }
        }
        Ok(())
    }

    async fn get_deployment(&self, id: &DeploymentId) -> StoreResult<Option<Deployment>> {
        let deployments = self.deployments.read().await;
        Ok(deployments.get(id).map(|r| r.deployment.clone()))
    }

    async fn store_task(&self, deployment_id: &DeploymentId, task: &Task) -> StoreResult<()> {
        let mut deployments = self.deployments.write().await;
        let record = deployments
            .get_mut(deployment_id)
            .ok_or_else(|| StoreError::DeploymentNotFound(deployment_id.clone()))?;
        let stored = record
            .deployment
            .task_mut(&task.id)
            .ok_or_else(|| StoreError::TaskNotFound {
                deployment_id: deployment_id.clone(),
                task_id: task.id.clone(),
            })?;
        merge_task(stored, task);
        Ok(())
    }

    async fn append_log(&self, deployment_id: &DeploymentId, message: &str) -> StoreResult<()> {
        let mut deployments = self.deployments.write().await;
        let record = deployments
            .get_mut(deployment_id)
            .ok_or_else(|| StoreError::DeploymentNotFound(deployment_id.clone()))?;
        record.log.push(LogEntry::now(message));
        Ok(())
    }

    async fn add_to_deployment_parameters(
        &self,
        deployment_id: &DeploymentId,
        partial: serde_json::Map<String, serde_json::Value>,
    ) -> StoreResult<()> {
        let mut deployments = self.deployments.write().await;
        let record = deployments
            .get_mut(deployment_id)
            .ok_or_else(|| StoreError::DeploymentNotFound(deployment_id.clone()))?;
        for (key, value) in partial {
            record.deployment.parameters.insert(key, value);
        }
        Ok(())
    }

    async fn list_deployments(&self, filter: &DeploymentFilter) -> StoreResult<Vec<Deployment>> {
        let deployments = self.deployments.read().await;
        let mut matching: Vec<Deployment> = deployments
            .values()
            .map(|r| &r.deployment)
            .filter(|d| {
                filter
                    .application
                    .as_ref()
                    .map_or(true, |a| &d.application == a)
                    && filter
                        .environment
                        .as_ref()
                        .map_or(true, |e| &d.environment == e)
                    && filter.region.as_ref().map_or(true, |r| &d.region == r)
                    && filter.status.map_or(true, |s| d.status == s)
                    && filter
                        .start_from
                        .map_or(true, |from| d.start.map_or(false, |s| s >= from))
                    && filter
                        .start_to
                        .map_or(true, |to| d.start.map_or(false, |s| s < to))
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created.cmp(&a.created));
        let size = if filter.size == 0 {
            DeploymentFilter::DEFAULT_SIZE
        } else {
            filter.size.min(DeploymentFilter::MAX_SIZE)
        };
        Ok(matching
            .into_iter()
            .skip(filter.from)
            .take(size)
            .collect())
    }

    async fn logs_since(
        &self,
        deployment_id: &DeploymentId,
        since: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<LogEntry>> {
        let deployments = self.deployments.read().await;
        let record = deployments
            .get(deployment_id)
            .ok_or_else(|| StoreError::DeploymentNotFound(deployment_id.clone()))?;
        Ok(record
            .log
            .iter()
            .filter(|entry| since.map_or(true, |s| entry.date > s))
            .cloned()
            .collect())
    }

    async fn deployments_in_phase(&self, phases: &[Phase]) -> StoreResult<Vec<Deployment>> {
        let deployments = self.deployments.read().await;
        Ok(deployments
            .values()
            .map(|r| &r.deployment)
            .filter(|d| phases.contains(&d.phase))
            .cloned()
            .collect())
    }

    async fn deployments_for(
        &self,
        application: &str,
        environment: &str,
        region: &str,
    ) -> StoreResult<Vec<Deployment>> {
        let deployments = self.deployments.read().await;
        let mut matching: Vec<Deployment> = deployments
            .values()
            .map(|r| &r.deployment)
            .filter(|d| {
                d.application == application && d.environment == environment && d.region == region
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(matching)
    }
}
