//! Task executor
//!
//! Walks the fixed task sequence of a prepared deployment. Each task runs
//! as its own spawned job; per-deployment mutations are guarded by the
//! deployment's mutex so task *i+1* never starts before task *i*'s
//! completion is persisted. The pause gate is honoured between tasks,
//! never within one.

use crate::config::EngineConfig;
use crate::dispatch::DeploymentLocks;
use crate::error::{EngineError, EngineResult};
use crate::tracker::TaskTracker;
use crate::waiters::HealthWaiters;
use async_trait::async_trait;
use chrono::Utc;
use maestro_cloud::asgard::{explode, FormParams};
use maestro_cloud::{remote, AsgardClient, InstanceHealthClient};
use maestro_store::{DeploymentStore, Registry, Triple};
use maestro_types::{
    Deployment, DeploymentId, DeploymentStatus, EventSource, MaestroEvent, MaestroEventEnvelope,
    Phase, RemoteRef, Task, TaskAction, TaskId, TaskStatus,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::{error, info, instrument, warn};

/// Callbacks a tracker or waiter fires when its task reaches a verdict.
#[async_trait]
pub trait TaskCallbacks: Send + Sync {
    /// The task reached a terminal status (not necessarily completed).
    async fn on_complete(&self, deployment_id: &DeploymentId, task: Task);

    /// The task exhausted its budget.
    async fn on_timeout(&self, deployment_id: &DeploymentId, task: Task);
}

pub struct TaskExecutor {
    store: Arc<dyn DeploymentStore>,
    registry: Arc<dyn Registry>,
    asgard: Arc<dyn AsgardClient>,
    tracker: TaskTracker,
    waiters: HealthWaiters,
    locks: DeploymentLocks,
    config: EngineConfig,
    events: broadcast::Sender<MaestroEventEnvelope>,
    self_ref: Weak<TaskExecutor>,
}

impl TaskExecutor {
    pub fn new(
        store: Arc<dyn DeploymentStore>,
        registry: Arc<dyn Registry>,
        asgard: Arc<dyn AsgardClient>,
        health: Arc<dyn InstanceHealthClient>,
        config: EngineConfig,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        Arc::new_cyclic(|self_ref| Self {
            tracker: TaskTracker::new(asgard.clone(), store.clone(), config.clone()),
            waiters: HealthWaiters::new(asgard.clone(), health, store.clone(), config.clone()),
            store,
            registry,
            asgard,
            locks: DeploymentLocks::new(),
            config,
            events,
            self_ref: self_ref.clone(),
        })
    }

    /// Subscribe to deployment events.
    pub fn subscribe(&self) -> broadcast::Receiver<MaestroEventEnvelope> {
        self.events.subscribe()
    }

    fn emit(&self, event: MaestroEvent) {
        let _ = self
            .events
            .send(MaestroEventEnvelope::new(event, EventSource::Executor));
    }

    fn arc(&self) -> Option<Arc<Self>> {
        self.self_ref.upgrade()
    }

    async fn load(&self, deployment_id: &DeploymentId) -> EngineResult<Deployment> {
        self.store
            .get_deployment(deployment_id)
            .await?
            .ok_or_else(|| EngineError::DeploymentNotFound(deployment_id.clone()))
    }

    /// Begin executing a prepared deployment: stamp the start, then kick
    /// off the first pending task.
    #[instrument(skip(self), fields(deployment_id = %deployment_id))]
    pub async fn start_deployment(&self, deployment_id: &DeploymentId) -> EngineResult<()> {
        let lock = self.locks.for_deployment(deployment_id);
        let _guard = lock.lock().await;

        let mut deployment = self.load(deployment_id).await?;
        deployment.phase = Phase::Deployment;
        deployment.status = DeploymentStatus::Running;
        if deployment.start.is_none() {
            deployment.start = Some(Utc::now());
        }
        self.store.store_deployment(&deployment).await?;
        self.store
            .append_log(
                deployment_id,
                &format!(
                    "Starting deployment of {} to {} in {}",
                    deployment.application, deployment.environment, deployment.region
                ),
            )
            .await?;
        info!("Starting deployment");

        let first = deployment
            .first_pending_task()
            .map(|task| task.id.clone())
            .ok_or_else(|| EngineError::MissingState {
                deployment_id: deployment_id.clone(),
                what: "a pending task".to_string(),
            })?;
        self.spawn_run(deployment_id.clone(), first);
        Ok(())
    }

    /// Continue a paused deployment from its next pending task.
    #[instrument(skip(self), fields(deployment_id = %deployment_id))]
    pub async fn resume_deployment(&self, deployment_id: &DeploymentId) -> EngineResult<()> {
        let deployment = self.load(deployment_id).await?;
        let triple = Self::triple(&deployment);
        self.registry.clear_paused(&triple).await;
        self.store
            .append_log(deployment_id, "Deployment resumed")
            .await?;
        self.emit(MaestroEvent::DeploymentResumed {
            deployment_id: deployment_id.clone(),
        });

        match deployment.first_pending_task().map(|task| task.id.clone()) {
            Some(task_id) => self.spawn_run(deployment_id.clone(), task_id),
            None => self.finish_deployment(deployment_id).await?,
        }
        Ok(())
    }

    fn triple(deployment: &Deployment) -> Triple {
        Triple::new(
            deployment.application.clone(),
            deployment.environment.clone(),
            deployment.region.clone(),
        )
    }

    fn spawn_run(&self, deployment_id: DeploymentId, task_id: TaskId) {
        let Some(executor) = self.arc() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(err) = executor.run_task(&deployment_id, &task_id).await {
                error!(deployment_id = %deployment_id, error = %err, "Task execution errored");
                executor
                    .fail_task(&deployment_id, &task_id, &err.to_string())
                    .await;
            }
        });
    }

    /// Run one task to the point where a tracker or waiter owns it.
    async fn run_task(&self, deployment_id: &DeploymentId, task_id: &TaskId) -> EngineResult<()> {
        let deployment = {
            let lock = self.locks.for_deployment(deployment_id);
            let _guard = lock.lock().await;

            let mut deployment = self.load(deployment_id).await?;
            let task = deployment
                .task_mut(task_id)
                .ok_or_else(|| EngineError::MissingState {
                    deployment_id: deployment_id.clone(),
                    what: format!("task {task_id}"),
                })?;
            task.start = Some(Utc::now());
            task.status = TaskStatus::Running;
            let task = task.clone();
            self.store.store_task(deployment_id, &task).await?;
            self.store
                .append_log(deployment_id, &format!("Starting task {}", task.action))
                .await?;
            self.emit(MaestroEvent::TaskStarted {
                deployment_id: deployment_id.clone(),
                task_id: task.id.clone(),
                action: task.action,
            });
            deployment
        };

        let task = deployment
            .task(task_id)
            .cloned()
            .ok_or_else(|| EngineError::MissingState {
                deployment_id: deployment_id.clone(),
                what: format!("task {task_id}"),
            })?;
        let callbacks: Arc<dyn TaskCallbacks> = match self.arc() {
            Some(executor) => executor,
            None => return Ok(()),
        };

        match task.action {
            TaskAction::CreateAsg => self.create_asg(&deployment, task, callbacks).await,
            TaskAction::WaitForInstanceHealth => {
                let attempts = deployment.params().instance_healthy_attempts;
                self.waiters
                    .wait_for_instance_health(&deployment, task, attempts, callbacks)
                    .await
            }
            TaskAction::EnableAsg => {
                let asg_name = Self::new_asg_name(&deployment)?;
                let location = self
                    .asgard
                    .enable_asg(&deployment.region, &asg_name)
                    .await?;
                self.track_remote(&deployment, task, &location, callbacks)
                    .await
            }
            TaskAction::WaitForElbHealth => {
                if Self::elb_wait_required(&deployment) {
                    let attempts = deployment.params().load_balancer_healthy_attempts;
                    self.waiters
                        .wait_for_elb_health(&deployment, task, attempts, callbacks)
                        .await
                } else {
                    self.complete_as_noop(
                        deployment_id,
                        task,
                        "No load balancer health check required",
                        callbacks,
                    )
                    .await
                }
            }
            TaskAction::DisableAsg => match Self::previous_asg_name(&deployment) {
                Some(asg_name) => {
                    let location = self
                        .asgard
                        .disable_asg(&deployment.region, &asg_name)
                        .await?;
                    self.track_remote(&deployment, task, &location, callbacks)
                        .await
                }
                None => {
                    self.complete_as_noop(
                        deployment_id,
                        task,
                        "No previous auto scaling group to disable",
                        callbacks,
                    )
                    .await
                }
            },
            TaskAction::DeleteAsg => match Self::previous_asg_name(&deployment) {
                Some(asg_name) => {
                    let location = self
                        .asgard
                        .delete_asg(&deployment.region, &asg_name)
                        .await?;
                    self.track_remote(&deployment, task, &location, callbacks)
                        .await
                }
                None => {
                    self.complete_as_noop(
                        deployment_id,
                        task,
                        "No previous auto scaling group to delete",
                        callbacks,
                    )
                    .await
                }
            },
        }
    }

    fn new_asg_name(deployment: &Deployment) -> EngineResult<String> {
        deployment
            .new_state
            .auto_scaling_group_name
            .clone()
            .ok_or_else(|| EngineError::MissingState {
                deployment_id: deployment.id.clone(),
                what: "auto-scaling-group-name".to_string(),
            })
    }

    fn previous_asg_name(deployment: &Deployment) -> Option<String> {
        deployment
            .previous_state
            .as_ref()
            .and_then(|previous| previous.auto_scaling_group_name.clone())
    }

    /// ELB membership is only awaited for ELB-health-checked deployments
    /// that actually selected load balancers.
    fn elb_wait_required(deployment: &Deployment) -> bool {
        !deployment.new_state.selected_load_balancers.is_empty()
            && deployment.params().health_check_type == "ELB"
    }

    async fn create_asg(
        &self,
        deployment: &Deployment,
        task: Task,
        callbacks: Arc<dyn TaskCallbacks>,
    ) -> EngineResult<()> {
        let successor = Self::previous_asg_name(deployment).is_some();
        let params = create_asg_params(deployment, successor);
        let location = if successor {
            self.asgard
                .create_next_auto_scaling_group(&deployment.region, &params)
                .await?
        } else {
            self.asgard
                .create_auto_scaling_group(&deployment.region, &params)
                .await?
        };

        // the redirect points at the new ASG's show page, or at the task
        // driving the creation; either way the ASG name is recoverable
        let created_name = if remote::is_task_location(&location) {
            match self.asgard.task(&location).await {
                Ok(remote_task) => remote::asg_name_from_task_log(&remote_task),
                Err(err) if err.is_transient() => None,
                Err(err) => return Err(err.into()),
            }
        } else {
            remote::last_path_segment(&location).map(str::to_string)
        };

        if let Some(name) = created_name {
            let lock = self.locks.for_deployment(&deployment.id);
            let _guard = lock.lock().await;
            let mut current = self.load(&deployment.id).await?;
            current.new_state.auto_scaling_group_name = Some(name.clone());
            self.store.store_deployment(&current).await?;
            self.store
                .append_log(&deployment.id, &format!("Creating auto scaling group {name}"))
                .await?;
        }

        self.track_remote(deployment, task, &location, callbacks)
            .await
    }

    async fn track_remote(
        &self,
        deployment: &Deployment,
        mut task: Task,
        location: &str,
        callbacks: Arc<dyn TaskCallbacks>,
    ) -> EngineResult<()> {
        if remote::is_task_location(location) {
            task.remote = Some(RemoteRef {
                id: remote::last_path_segment(location)
                    .unwrap_or_default()
                    .to_string(),
                url: location.to_string(),
                parameters: BTreeMap::new(),
            });
            self.store.store_task(&deployment.id, &task).await?;
        }
        self.tracker
            .track(
                deployment.id.clone(),
                task,
                self.config.tracker_budget_ticks,
                callbacks,
            )
            .await
    }

    async fn complete_as_noop(
        &self,
        deployment_id: &DeploymentId,
        mut task: Task,
        message: &str,
        callbacks: Arc<dyn TaskCallbacks>,
    ) -> EngineResult<()> {
        task.append_log(message);
        task.status = TaskStatus::Completed;
        self.store.store_task(deployment_id, &task).await?;
        callbacks.on_complete(deployment_id, task).await;
        Ok(())
    }

    async fn fail_task(&self, deployment_id: &DeploymentId, task_id: &TaskId, reason: &str) {
        {
            let lock = self.locks.for_deployment(deployment_id);
            let _guard = lock.lock().await;
            if let Ok(mut deployment) = self.load(deployment_id).await {
                if let Some(task) = deployment.task_mut(task_id) {
                    if !task.status.is_terminal() {
                        task.status = TaskStatus::Failed;
                    }
                    task.end = Some(Utc::now());
                    task.append_log(reason);
                    let task = task.clone();
                    let action = task.action;
                    if let Err(err) = self.store.store_task(deployment_id, &task).await {
                        warn!(error = %err, "Could not persist task failure");
                    }
                    self.emit(MaestroEvent::TaskFailed {
                        deployment_id: deployment_id.clone(),
                        task_id: task.id.clone(),
                        action,
                        reason: reason.to_string(),
                    });
                }
            }
        }
        self.fail_deployment(deployment_id, reason).await;
    }

    async fn fail_deployment(&self, deployment_id: &DeploymentId, reason: &str) {
        let lock = self.locks.for_deployment(deployment_id);
        let _guard = lock.lock().await;
        let Ok(mut deployment) = self.load(deployment_id).await else {
            return;
        };
        deployment.phase = Phase::Failed;
        deployment.status = DeploymentStatus::Failed;
        deployment.end = Some(Utc::now());
        if let Err(err) = self.store.store_deployment(&deployment).await {
            warn!(error = %err, "Could not persist deployment failure");
        }
        let _ = self
            .store
            .append_log(deployment_id, &format!("Deployment failed: {reason}"))
            .await;

        let triple = Self::triple(&deployment);
        self.registry.release_in_progress(&triple).await;
        self.registry.unregister_pause(&triple).await;
        self.registry.clear_paused(&triple).await;
        self.emit(MaestroEvent::DeploymentFailed {
            deployment_id: deployment_id.clone(),
            reason: reason.to_string(),
        });
        warn!(deployment_id = %deployment_id, reason, "Deployment failed");
    }

    async fn finish_deployment(&self, deployment_id: &DeploymentId) -> EngineResult<()> {
        let lock = self.locks.for_deployment(deployment_id);
        let _guard = lock.lock().await;
        let mut deployment = self.load(deployment_id).await?;
        deployment.phase = Phase::Completed;
        deployment.status = DeploymentStatus::Completed;
        deployment.end = Some(Utc::now());
        self.store.store_deployment(&deployment).await?;
        self.store
            .append_log(deployment_id, "Deployment complete")
            .await?;

        let triple = Self::triple(&deployment);
        self.registry.release_in_progress(&triple).await;
        self.registry.unregister_pause(&triple).await;
        self.registry.clear_paused(&triple).await;
        self.emit(MaestroEvent::DeploymentCompleted {
            deployment_id: deployment_id.clone(),
        });
        info!(deployment_id = %deployment_id, "Deployment complete");
        Ok(())
    }

    /// Whether the pause gate stops this deployment before the next task.
    async fn should_pause(&self, deployment: &Deployment, finished: &Task) -> bool {
        if self.registry.awaiting_pause(&Self::triple(deployment)).await {
            return true;
        }
        let params = deployment.params();
        match finished.action {
            TaskAction::WaitForInstanceHealth => params.pause_after_instances_healthy,
            TaskAction::WaitForElbHealth => params.pause_after_load_balancers_healthy,
            _ => false,
        }
    }
}

#[async_trait]
impl TaskCallbacks for TaskExecutor {
    async fn on_complete(&self, deployment_id: &DeploymentId, mut task: Task) {
        let next_task_id;
        {
            let lock = self.locks.for_deployment(deployment_id);
            let _guard = lock.lock().await;

            if task.end.is_none() {
                task.end = Some(Utc::now());
            }
            if let Err(err) = self.store.store_task(deployment_id, &task).await {
                warn!(error = %err, "Could not persist task completion");
            }

            let Ok(deployment) = self.load(deployment_id).await else {
                return;
            };

            if task.status != TaskStatus::Completed {
                drop(_guard);
                self.fail_deployment(
                    deployment_id,
                    &format!("Task {} finished as {}", task.action, task.status),
                )
                .await;
                return;
            }

            let _ = self
                .store
                .append_log(deployment_id, &format!("Task {} completed", task.action))
                .await;
            self.emit(MaestroEvent::TaskCompleted {
                deployment_id: deployment_id.clone(),
                task_id: task.id.clone(),
                action: task.action,
            });

            next_task_id = deployment.task_after(&task.id).map(|next| next.id.clone());

            if next_task_id.is_some() && self.should_pause(&deployment, &task).await {
                let triple = Self::triple(&deployment);
                self.registry.mark_paused(&triple).await;
                let _ = self.store.append_log(deployment_id, "Deployment paused").await;
                self.emit(MaestroEvent::DeploymentPaused {
                    deployment_id: deployment_id.clone(),
                });
                info!(deployment_id = %deployment_id, "Deployment paused");
                return;
            }
        }

        match next_task_id {
            Some(next) => self.spawn_run(deployment_id.clone(), next),
            None => {
                if let Err(err) = self.finish_deployment(deployment_id).await {
                    error!(error = %err, "Could not finish deployment");
                }
            }
        }
    }

    async fn on_timeout(&self, deployment_id: &DeploymentId, mut task: Task) {
        {
            let lock = self.locks.for_deployment(deployment_id);
            let _guard = lock.lock().await;
            task.end = Some(Utc::now());
            if !task.status.is_terminal() {
                task.status = TaskStatus::Failed;
            }
            task.append_log("Task timed out");
            if let Err(err) = self.store.store_task(deployment_id, &task).await {
                warn!(error = %err, "Could not persist task timeout");
            }
            self.emit(MaestroEvent::TaskFailed {
                deployment_id: deployment_id.clone(),
                task_id: task.id.clone(),
                action: task.action,
                reason: "timed out".to_string(),
            });
        }
        self.fail_deployment(deployment_id, &format!("Task {} timed out", task.action))
            .await;
    }
}

/// The exploded form parameters for an ASG creation call.
pub(crate) fn create_asg_params(deployment: &Deployment, successor: bool) -> FormParams {
    let state = &deployment.new_state;
    let config = deployment.params();
    let mut params = FormParams::new();

    let name = if successor {
        format!("{}-{}", deployment.application, deployment.environment)
    } else {
        state.auto_scaling_group_name.clone().unwrap_or_default()
    };
    params.push(("name".to_string(), name));
    if let Some(details) = &state.image_details {
        params.push(("imageId".to_string(), details.id.clone()));
    }
    params.push(("instanceType".to_string(), config.instance_type.clone()));
    params.push(("min".to_string(), config.min.to_string()));
    params.push(("max".to_string(), config.max.to_string()));
    params.push((
        "desiredCapacity".to_string(),
        config.desired_capacity.to_string(),
    ));
    params.push((
        "defaultCooldown".to_string(),
        config.default_cooldown.to_string(),
    ));
    params.push((
        "healthCheckType".to_string(),
        config.health_check_type.clone(),
    ));
    params.push((
        "healthCheckGracePeriod".to_string(),
        config.health_check_grace_period.to_string(),
    ));
    explode(&mut params, "terminationPolicy", &state.termination_policies);
    explode(&mut params, "selectedZones", &state.availability_zones);
    explode(
        &mut params,
        "selectedSecurityGroups",
        &state.selected_security_group_ids,
    );

    // inside a VPC the load-balancer selection is keyed by the VPC id
    let vpc_id = deployment
        .parameters
        .get("vpc-id")
        .and_then(|value| value.as_str());
    let lb_key = match vpc_id {
        Some(vpc_id) => {
            params.push(("subnetPurpose".to_string(), config.subnet_purpose.clone()));
            format!("selectedLoadBalancersForVpcId{vpc_id}")
        }
        None => "selectedLoadBalancers".to_string(),
    };
    explode(&mut params, &lb_key, &state.selected_load_balancers);

    for tag in &state.auto_scaling_group_tags {
        params.push((format!("tag.{}", tag.key), tag.value.clone()));
    }
    if let Some(user_data) = &state.user_data {
        params.push(("userData".to_string(), encode_user_data(user_data)));
    }
    params
}

/// Base64 for the user-data form field.
fn encode_user_data(script: &str) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(script)
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_types::ImageDetails;

    fn prepared_deployment() -> Deployment {
        let mut dep = Deployment::skeleton("search", "poke", "eu-west-1", "alice", "m");
        dep.new_state.auto_scaling_group_name = Some("search-poke-v001".to_string());
        dep.new_state.image_details = Some(ImageDetails::from_id("ami-123"));
        dep.new_state.availability_zones =
            vec!["eu-west-1a".to_string(), "eu-west-1b".to_string()];
        dep.new_state.selected_security_group_ids = vec!["sg-1".to_string()];
        dep.new_state.selected_load_balancers = vec!["search-frontend".to_string()];
        dep.new_state.termination_policies = vec!["Default".to_string()];
        dep.new_state.user_data = Some("#!/bin/bash\nexport HASH=abc\n".to_string());
        dep
    }

    fn values_for<'a>(params: &'a FormParams, key: &str) -> Vec<&'a str> {
        params
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    #[test]
    fn test_create_params_explode_lists() {
        let dep = prepared_deployment();
        let params = create_asg_params(&dep, false);
        assert_eq!(
            values_for(&params, "selectedZones"),
            vec!["eu-west-1a", "eu-west-1b"]
        );
        assert_eq!(values_for(&params, "name"), vec!["search-poke-v001"]);
        assert_eq!(values_for(&params, "imageId"), vec!["ami-123"]);
    }

    #[test]
    fn test_load_balancer_key_outside_vpc() {
        let dep = prepared_deployment();
        let params = create_asg_params(&dep, false);
        assert_eq!(
            values_for(&params, "selectedLoadBalancers"),
            vec!["search-frontend"]
        );
        assert!(values_for(&params, "subnetPurpose").is_empty());
    }

    #[test]
    fn test_load_balancer_key_inside_vpc() {
        let mut dep = prepared_deployment();
        dep.parameters
            .insert("vpc-id".to_string(), serde_json::json!("vpc-1"));
        let params = create_asg_params(&dep, false);
        assert!(values_for(&params, "selectedLoadBalancers").is_empty());
        assert_eq!(
            values_for(&params, "selectedLoadBalancersForVpcIdvpc-1"),
            vec!["search-frontend"]
        );
        assert_eq!(values_for(&params, "subnetPurpose"), vec!["internal"]);
    }

    #[test]
    fn test_successor_creation_uses_cluster_name() {
        let dep = prepared_deployment();
        let params = create_asg_params(&dep, true);
        assert_eq!(values_for(&params, "name"), vec!["search-poke"]);
    }

    #[test]
    fn test_elb_wait_condition() {
        let mut dep = prepared_deployment();
        // load balancers selected but health check type is EC2
        assert!(!TaskExecutor::elb_wait_required(&dep));

        dep.new_state.tyranitar.deployment_params = Some(maestro_types::DeploymentParams {
            health_check_type: "ELB".to_string(),
            ..Default::default()
        });
        assert!(TaskExecutor::elb_wait_required(&dep));

        dep.new_state.selected_load_balancers.clear();
        assert!(!TaskExecutor::elb_wait_required(&dep));
    }
}
