//! The preparation runner
//!
//! Walks the step sequence for one deployment, persisting the record
//! between steps. A step error terminates the deployment as failed; a
//! retry requeues the same step after a backoff.

use crate::context::Services;
use crate::steps::{Step, StepOutcome};
use chrono::Utc;
use maestro_store::{DeploymentStore, StoreError, StoreResult};
use maestro_types::{Deployment, DeploymentId, DeploymentStatus, Phase};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// How preparation ended. Store faults surface as errors instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreparationOutcome {
    /// Every step succeeded; the record is ready for the executor.
    Prepared,
    /// A step terminated the deployment; the failure is persisted.
    Failed,
}

pub struct PreparationRunner {
    services: Services,
    store: Arc<dyn DeploymentStore>,
    retry_backoff: Duration,
}

impl PreparationRunner {
    pub fn new(services: Services, store: Arc<dyn DeploymentStore>) -> Self {
        Self {
            services,
            store,
            retry_backoff: Duration::from_secs(5),
        }
    }

    /// Override the retry backoff (tests use zero).
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Run the full preparation pipeline for a deployment.
    #[instrument(skip(self), fields(deployment_id = %deployment_id))]
    pub async fn prepare(&self, deployment_id: &DeploymentId) -> StoreResult<PreparationOutcome> {
        let mut deployment = self
            .store
            .get_deployment(deployment_id)
            .await?
            .ok_or_else(|| StoreError::DeploymentNotFound(deployment_id.clone()))?;

        for step in Step::SEQUENCE {
            loop {
                debug!(step = step.name(), "Running preparation step");
                let outcome = step.run(&self.services, &mut deployment).await;
                self.store.store_deployment(&deployment).await?;
                match outcome {
                    StepOutcome::Success => break,
                    StepOutcome::Retry(reason) => {
                        warn!(step = step.name(), reason = %reason, "Retrying preparation step");
                        self.store
                            .append_log(
                                deployment_id,
                                &format!("Retrying {} ({reason})", step.name()),
                            )
                            .await?;
                        tokio::time::sleep(self.retry_backoff).await;
                    }
                    StepOutcome::Error(error) => {
                        warn!(step = step.name(), error = %error, "Preparation failed");
                        return self.fail(&mut deployment, &step, error).await;
                    }
                }
            }
        }

        self.store
            .append_log(deployment_id, "Preparation complete")
            .await?;
        info!("Deployment prepared");
        Ok(PreparationOutcome::Prepared)
    }

    async fn fail(
        &self,
        deployment: &mut Deployment,
        step: &Step,
        error: crate::error::PipelineError,
    ) -> StoreResult<PreparationOutcome> {
        deployment.phase = Phase::Failed;
        deployment.status = DeploymentStatus::Failed;
        deployment.end = Some(Utc::now());
        self.store.store_deployment(deployment).await?;
        self.store
            .append_log(
                &deployment.id,
                &format!("Preparation failed at {}: {error}", step.name()),
            )
            .await?;
        Ok(PreparationOutcome::Failed)
    }
}
