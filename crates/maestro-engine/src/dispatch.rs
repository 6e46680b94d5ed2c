//! Per-deployment serialization
//!
//! Work for a deployment is one message at a time: whoever mutates a
//! deployment holds its mutex for the duration of the mutation. Different
//! deployments proceed in parallel.

use dashmap::DashMap;
use maestro_types::DeploymentId;
use std::sync::Arc;
use tokio::sync::Mutex;

/// One mutex per deployment id, created on first use.
#[derive(Debug, Default)]
pub struct DeploymentLocks {
    locks: DashMap<DeploymentId, Arc<Mutex<()>>>,
}

impl DeploymentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The mutex guarding a deployment's mutations.
    pub fn for_deployment(&self, deployment_id: &DeploymentId) -> Arc<Mutex<()>> {
        self.locks
            .entry(deployment_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the mutex for a finished deployment.
    pub fn release(&self, deployment_id: &DeploymentId) {
        self.locks.remove(deployment_id);
    }
}
