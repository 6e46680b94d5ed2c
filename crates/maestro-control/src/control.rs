//! The control plane

use crate::error::{ControlError, ControlResult};
use maestro_engine::TaskExecutor;
use maestro_pipeline::{PreparationOutcome, PreparationRunner};
use maestro_store::{DeploymentStore, Registry, Triple};
use maestro_types::{
    Deployment, DeploymentId, DeploymentStatus, EventSource, ImageDetails, MaestroEvent,
    MaestroEventEnvelope, Phase, Task,
};
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tokio::sync::broadcast;
use tracing::{error, info, instrument};

fn application_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z]+$").unwrap())
}

/// A request to deploy an image.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub ami: String,
    pub hash: Option<String>,
    pub message: String,
    pub silent: bool,
    pub user: String,
}

pub struct ControlPlane {
    store: Arc<dyn DeploymentStore>,
    registry: Arc<dyn Registry>,
    runner: Arc<PreparationRunner>,
    executor: Arc<TaskExecutor>,
    events: broadcast::Sender<MaestroEventEnvelope>,
}

impl ControlPlane {
    pub fn new(
        store: Arc<dyn DeploymentStore>,
        registry: Arc<dyn Registry>,
        runner: Arc<PreparationRunner>,
        executor: Arc<TaskExecutor>,
    ) -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            store,
            registry,
            runner,
            executor,
            events,
        }
    }

    /// Subscribe to control-plane events.
    pub fn subscribe(&self) -> broadcast::Receiver<MaestroEventEnvelope> {
        self.events.subscribe()
    }

    fn emit(&self, event: MaestroEvent) {
        let _ = self
            .events
            .send(MaestroEventEnvelope::new(event, EventSource::ControlPlane));
    }

    async fn refuse_when_locked(&self) -> ControlResult<()> {
        if self.registry.is_locked().await {
            Err(ControlError::Locked)
        } else {
            Ok(())
        }
    }

    fn validate_request(application: &str, request: &DeployRequest) -> ControlResult<()> {
        if !application_name_pattern().is_match(application) {
            return Err(ControlError::IllegalApplicationName(application.to_string()));
        }
        if request.ami.trim().is_empty() {
            return Err(ControlError::Validation("ami is required".to_string()));
        }
        if request.user.trim().is_empty() {
            return Err(ControlError::Validation("user is required".to_string()));
        }
        if request.message.trim().is_empty() {
            return Err(ControlError::Validation("message is required".to_string()));
        }
        Ok(())
    }

    /// Begin a new deployment. Returns the new deployment's id; the
    /// preparation and execution run as background jobs.
    #[instrument(skip(self, request), fields(application, environment, region))]
    pub async fn begin(
        &self,
        application: &str,
        environment: &str,
        region: &str,
        request: DeployRequest,
    ) -> ControlResult<DeploymentId> {
        self.start_deployment(application, environment, region, request, false)
            .await
    }

    async fn start_deployment(
        &self,
        application: &str,
        environment: &str,
        region: &str,
        request: DeployRequest,
        rollback: bool,
    ) -> ControlResult<DeploymentId> {
        self.refuse_when_locked().await?;
        Self::validate_request(application, &request)?;

        let mut deployment = Deployment::skeleton(
            application,
            environment,
            region,
            request.user.clone(),
            request.message.clone(),
        );
        deployment.new_state.image_details = Some(ImageDetails::from_id(request.ami.clone()));
        deployment.new_state.hash = request.hash.clone();
        deployment.silent = request.silent;
        deployment.rollback = rollback;
        let deployment_id = deployment.id.clone();
        self.store.store_deployment(&deployment).await?;

        let triple = Triple::new(application, environment, region);
        if !self
            .registry
            .acquire_in_progress(&triple, &deployment_id)
            .await
        {
            deployment.phase = Phase::Failed;
            deployment.status = DeploymentStatus::Terminated;
            deployment.end = Some(chrono::Utc::now());
            self.store.store_deployment(&deployment).await?;
            self.store
                .append_log(&deployment_id, "Another deployment is already in progress")
                .await?;
            return Err(ControlError::AlreadyInProgress(triple));
        }

        self.store
            .append_log(
                &deployment_id,
                &format!("Deployment created by {}", request.user),
            )
            .await?;
        self.emit(MaestroEvent::DeploymentCreated {
            deployment_id: deployment_id.clone(),
            application: application.to_string(),
            environment: environment.to_string(),
            region: region.to_string(),
        });
        info!(deployment_id = %deployment_id, "Deployment created");

        self.spawn_preparation(deployment_id.clone(), triple);
        Ok(deployment_id)
    }

    fn spawn_preparation(&self, deployment_id: DeploymentId, triple: Triple) {
        let runner = self.runner.clone();
        let executor = self.executor.clone();
        let registry = self.registry.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            match runner.prepare(&deployment_id).await {
                Ok(PreparationOutcome::Prepared) => {
                    let _ = events.send(MaestroEventEnvelope::new(
                        MaestroEvent::PreparationCompleted {
                            deployment_id: deployment_id.clone(),
                        },
                        EventSource::Pipeline,
                    ));
                    if let Err(err) = executor.start_deployment(&deployment_id).await {
                        error!(deployment_id = %deployment_id, error = %err, "Could not start execution");
                        registry.release_in_progress(&triple).await;
                    }
                }
                Ok(PreparationOutcome::Failed) => {
                    registry.release_in_progress(&triple).await;
                }
                Err(err) => {
                    error!(deployment_id = %deployment_id, error = %err, "Preparation errored");
                    registry.release_in_progress(&triple).await;
                }
            }
        });
    }

    /// Reverse the orientation of the latest deployment for the triple and
    /// run the task sequence again: the predecessor comes back, the new
    /// group goes away.
    #[instrument(skip(self), fields(application, environment, region))]
    pub async fn undo(
        &self,
        application: &str,
        environment: &str,
        region: &str,
        user: &str,
        message: &str,
    ) -> ControlResult<DeploymentId> {
        self.refuse_when_locked().await?;
        let triple = Triple::new(application, environment, region);

        let deployments = self
            .store
            .deployments_for(application, environment, region)
            .await?;
        let latest = deployments
            .first()
            .ok_or_else(|| ControlError::NothingToUndo(triple.clone()))?;
        if latest.status == DeploymentStatus::Completed {
            return Err(ControlError::NothingToUndo(triple.clone()));
        }
        let Some(previous_state) = latest.previous_state.clone() else {
            return Err(ControlError::NothingToUndo(triple.clone()));
        };

        let mut undo_deployment = Deployment::skeleton(
            application,
            environment,
            region,
            user,
            message,
        );
        undo_deployment.undo = true;
        undo_deployment.new_state = previous_state;
        undo_deployment.previous_state = Some(latest.new_state.clone());
        undo_deployment.tasks = Task::sequence();
        let undo_id = undo_deployment.id.clone();

        // the undone deployment no longer owns the slot
        self.registry.release_in_progress(&triple).await;
        self.registry.unregister_pause(&triple).await;
        self.registry.clear_paused(&triple).await;
        if !self.registry.acquire_in_progress(&triple, &undo_id).await {
            return Err(ControlError::AlreadyInProgress(triple));
        }

        self.store.store_deployment(&undo_deployment).await?;
        self.store
            .append_log(&undo_id, &format!("Undoing deployment {}", latest.id))
            .await?;
        info!(deployment_id = %undo_id, undoes = %latest.id, "Undo deployment created");

        // both states are already fully resolved; execution starts without
        // another preparation pass
        self.executor.start_deployment(&undo_id).await?;
        Ok(undo_id)
    }

    /// Redeploy the configuration and image of the penultimate completed
    /// deployment for the triple.
    #[instrument(skip(self), fields(application, environment, region))]
    pub async fn rollback(
        &self,
        application: &str,
        environment: &str,
        region: &str,
        user: &str,
        message: &str,
    ) -> ControlResult<DeploymentId> {
        self.refuse_when_locked().await?;
        let triple = Triple::new(application, environment, region);

        let deployments = self
            .store
            .deployments_for(application, environment, region)
            .await?;
        let mut completed = deployments
            .iter()
            .filter(|dep| dep.status == DeploymentStatus::Completed);
        let _current = completed
            .next()
            .ok_or_else(|| ControlError::NothingToRollBack(triple.clone()))?;
        let target = completed
            .next()
            .ok_or_else(|| ControlError::NothingToRollBack(triple.clone()))?;

        let ami = target
            .new_state
            .image_details
            .as_ref()
            .map(|details| details.id.clone())
            .ok_or_else(|| ControlError::NothingToRollBack(triple.clone()))?;
        let request = DeployRequest {
            ami,
            hash: target.new_state.hash.clone(),
            message: message.to_string(),
            silent: false,
            user: user.to_string(),
        };
        self.start_deployment(application, environment, region, request, true)
            .await
    }

    /// Flag the in-flight deployment to suspend at the next task boundary.
    pub async fn register_pause(
        &self,
        application: &str,
        environment: &str,
        region: &str,
    ) -> ControlResult<()> {
        let triple = Triple::new(application, environment, region);
        let in_progress = self.registry.in_progress().await;
        if !in_progress.iter().any(|(t, _)| t == &triple) {
            return Err(ControlError::NotInProgress(triple));
        }
        self.registry.register_pause(&triple).await;
        Ok(())
    }

    /// Clear a pause flag that has not been honoured yet.
    pub async fn unregister_pause(
        &self,
        application: &str,
        environment: &str,
        region: &str,
    ) -> ControlResult<()> {
        let triple = Triple::new(application, environment, region);
        if !self.registry.awaiting_pause(&triple).await {
            return Err(ControlError::NotAwaitingPause(triple));
        }
        self.registry.unregister_pause(&triple).await;
        Ok(())
    }

    /// Continue a paused deployment from its next pending task.
    pub async fn resume(
        &self,
        application: &str,
        environment: &str,
        region: &str,
    ) -> ControlResult<DeploymentId> {
        self.refuse_when_locked().await?;
        let triple = Triple::new(application, environment, region);
        if !self.registry.is_paused(&triple).await {
            return Err(ControlError::NotPaused(triple));
        }
        let deployment_id = self
            .registry
            .in_progress()
            .await
            .into_iter()
            .find(|(t, _)| t == &triple)
            .map(|(_, id)| id)
            .ok_or_else(|| ControlError::NotInProgress(triple.clone()))?;

        self.executor.resume_deployment(&deployment_id).await?;
        Ok(deployment_id)
    }

    pub async fn lock(&self) {
        self.registry.lock().await;
    }

    pub async fn unlock(&self) {
        self.registry.unlock().await;
    }

    pub async fn locked(&self) -> bool {
        self.registry.is_locked().await
    }

    /// The deployments currently owning an in-progress slot.
    pub async fn in_progress_deployments(&self) -> ControlResult<Vec<Deployment>> {
        let mut deployments = Vec::new();
        for (_, id) in self.registry.in_progress().await {
            if let Some(deployment) = self.store.get_deployment(&id).await? {
                deployments.push(deployment);
            }
        }
        Ok(deployments)
    }

    async fn deployments_for_triples(&self, triples: Vec<Triple>) -> ControlResult<Vec<Deployment>> {
        let in_progress = self.registry.in_progress().await;
        let mut deployments = Vec::new();
        for triple in triples {
            let Some((_, id)) = in_progress.iter().find(|(t, _)| t == &triple) else {
                continue;
            };
            if let Some(deployment) = self.store.get_deployment(id).await? {
                deployments.push(deployment);
            }
        }
        Ok(deployments)
    }

    /// The deployments whose pause flag the executor has honoured.
    pub async fn paused_deployments(&self) -> ControlResult<Vec<Deployment>> {
        let paused = self.registry.paused_list().await;
        self.deployments_for_triples(paused).await
    }

    /// The deployments with a pause registered but not yet honoured.
    pub async fn awaiting_pause_deployments(&self) -> ControlResult<Vec<Deployment>> {
        let awaiting = self.registry.awaiting_pause_list().await;
        self.deployments_for_triples(awaiting).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_cloud::fake::{
        FakeAsgard, FakeInstanceHealth, FakeOnix, FakeShuppet, FakeTyranitar,
    };
    use maestro_cloud::AsgInstance;
    use maestro_engine::EngineConfig;
    use maestro_pipeline::Services;
    use maestro_store::{InMemoryDeploymentStore, InMemoryRegistry};
    use maestro_types::OnixMetadata;
    use std::time::Duration;

    struct World {
        control: ControlPlane,
        store: Arc<InMemoryDeploymentStore>,
        registry: Arc<InMemoryRegistry>,
        asgard: Arc<FakeAsgard>,
        tyranitar: Arc<FakeTyranitar>,
    }

    fn request() -> DeployRequest {
        DeployRequest {
            ami: "ami-123".to_string(),
            hash: None,
            message: "initial".to_string(),
            silent: false,
            user: "alice".to_string(),
        }
    }

    fn world() -> World {
        let asgard = Arc::new(FakeAsgard::new());
        let onix = Arc::new(FakeOnix::new());
        let tyranitar = Arc::new(FakeTyranitar::new());
        let shuppet = Arc::new(FakeShuppet::new());
        let health = Arc::new(FakeInstanceHealth::new());
        let store = Arc::new(InMemoryDeploymentStore::new());
        let registry = Arc::new(InMemoryRegistry::new());

        onix.seed_application(
            "search",
            OnixMetadata {
                owner: Some("search-team".to_string()),
                contact: Some("search@example.com".to_string()),
                email: None,
            },
        );
        tyranitar.seed_hash("poke", "search", "abc123");
        asgard.seed_image("ami-123", "search-1.0.3", "paravirtual");
        asgard.seed_security_group("sg-hc", "healthcheck");
        asgard.seed_security_group("sg-nrpe", "nrpe");
        asgard.seed_subnet("subnet-a", "eu-west-1a", "internal", "vpc-1");
        asgard.seed_subnet("subnet-b", "eu-west-1b", "internal", "vpc-1");
        asgard.seed_instances(
            "search-poke-v001",
            vec![AsgInstance {
                instance_id: "i-1".to_string(),
                private_ip: "10.0.0.1".to_string(),
            }],
        );
        health.set_healthy("10.0.0.1");

        let services = Services::new(
            asgard.clone(),
            onix.clone(),
            tyranitar.clone(),
            shuppet.clone(),
        );
        let runner = Arc::new(
            PreparationRunner::new(services, store.clone()).with_retry_backoff(Duration::ZERO),
        );
        let executor = TaskExecutor::new(
            store.clone(),
            registry.clone(),
            asgard.clone(),
            health.clone(),
            EngineConfig::fast(),
        );
        let control = ControlPlane::new(store.clone(), registry.clone(), runner, executor);

        World {
            control,
            store,
            registry,
            asgard,
            tyranitar,
        }
    }

    async fn wait_for_completion(world: &World, id: &DeploymentId) -> Deployment {
        for _ in 0..500 {
            let dep = world.store.get_deployment(id).await.unwrap().unwrap();
            if dep.phase.is_terminal() {
                return dep;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("deployment never finished");
    }

    #[tokio::test]
    async fn test_begin_runs_a_deployment_to_completion() {
        let world = world();
        let id = world
            .control
            .begin("search", "poke", "eu-west-1", request())
            .await
            .unwrap();

        let finished = wait_for_completion(&world, &id).await;
        assert_eq!(finished.phase, Phase::Completed);
        assert!(world.asgard.calls().contains(&"create-asg:search-poke-v001".to_string()));
    }

    #[tokio::test]
    async fn test_begin_rejects_illegal_application_name() {
        let world = world();
        let result = world
            .control
            .begin("Search9", "poke", "eu-west-1", request())
            .await;
        assert!(matches!(
            result,
            Err(ControlError::IllegalApplicationName(_))
        ));
    }

    #[tokio::test]
    async fn test_locked_system_refuses_with_its_message() {
        let world = world();
        world.control.lock().await;
        let error = world
            .control
            .begin("search", "poke", "eu-west-1", request())
            .await
            .err()
            .unwrap();
        assert_eq!(
            error.to_string(),
            "Maestro is currently closed for business."
        );
        // no deployment record was left behind
        let deployments = world
            .store
            .deployments_for("search", "poke", "eu-west-1")
            .await
            .unwrap();
        assert!(deployments.is_empty());

        world.control.unlock().await;
        assert!(world
            .control
            .begin("search", "poke", "eu-west-1", request())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_second_begin_conflicts_while_first_is_in_flight() {
        let world = world();
        // hold the slot as if a deployment were mid-flight
        let occupant = DeploymentId::generate();
        let triple = Triple::new("search", "poke", "eu-west-1");
        assert!(world.registry.acquire_in_progress(&triple, &occupant).await);

        let error = world
            .control
            .begin("search", "poke", "eu-west-1", request())
            .await
            .err()
            .unwrap();
        assert!(matches!(error, ControlError::AlreadyInProgress(_)));
    }

    #[tokio::test]
    async fn test_rollback_uses_penultimate_completed_deployment() {
        let world = world();

        // two completed deployments with distinguishable hashes
        for hash in ["hash-one", "hash-two"] {
            let mut dep = Deployment::skeleton("search", "poke", "eu-west-1", "alice", "m");
            dep.phase = Phase::Completed;
            dep.status = DeploymentStatus::Completed;
            dep.new_state.hash = Some(hash.to_string());
            dep.new_state.image_details = Some(ImageDetails::from_id("ami-123"));
            world.store.store_deployment(&dep).await.unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        world.tyranitar.seed_hash("poke", "search", "hash-one");

        let id = world
            .control
            .rollback("search", "poke", "eu-west-1", "alice", "rolling back")
            .await
            .unwrap();
        let created = world.store.get_deployment(&id).await.unwrap().unwrap();
        assert!(created.rollback);
        assert_eq!(created.new_state.hash.as_deref(), Some("hash-one"));
    }

    #[tokio::test]
    async fn test_rollback_needs_two_completed_deployments() {
        let world = world();
        let error = world
            .control
            .rollback("search", "poke", "eu-west-1", "alice", "rolling back")
            .await
            .err()
            .unwrap();
        assert!(matches!(error, ControlError::NothingToRollBack(_)));
    }

    #[tokio::test]
    async fn test_undo_swaps_states() {
        let world = world();
        let mut failed = Deployment::skeleton("search", "poke", "eu-west-1", "alice", "m");
        failed.phase = Phase::Failed;
        failed.status = DeploymentStatus::Failed;
        failed.new_state.auto_scaling_group_name = Some("search-poke-v024".to_string());
        let mut previous = maestro_types::StateSnapshot::default();
        previous.auto_scaling_group_name = Some("search-poke-v023".to_string());
        failed.previous_state = Some(previous);
        world.store.store_deployment(&failed).await.unwrap();

        // the ASGs involved still exist
        world.asgard.seed_instances("search-poke-v023", vec![]);
        world.asgard.set_next_asg_name("search-poke-v023");

        let id = world
            .control
            .undo("search", "poke", "eu-west-1", "alice", "undoing")
            .await
            .unwrap();
        let undo = world.store.get_deployment(&id).await.unwrap().unwrap();
        assert!(undo.undo);
        assert_eq!(
            undo.new_state.auto_scaling_group_name.as_deref(),
            Some("search-poke-v023")
        );
        assert_eq!(
            undo.previous_state
                .unwrap()
                .auto_scaling_group_name
                .as_deref(),
            Some("search-poke-v024")
        );
    }

    #[tokio::test]
    async fn test_undo_refuses_after_success() {
        let world = world();
        let mut done = Deployment::skeleton("search", "poke", "eu-west-1", "alice", "m");
        done.phase = Phase::Completed;
        done.status = DeploymentStatus::Completed;
        world.store.store_deployment(&done).await.unwrap();

        let error = world
            .control
            .undo("search", "poke", "eu-west-1", "alice", "undoing")
            .await
            .err()
            .unwrap();
        assert!(matches!(error, ControlError::NothingToUndo(_)));
    }

    #[tokio::test]
    async fn test_pause_requires_an_in_flight_deployment() {
        let world = world();
        let error = world
            .control
            .register_pause("search", "poke", "eu-west-1")
            .await
            .err()
            .unwrap();
        assert!(matches!(error, ControlError::NotInProgress(_)));
    }

    #[tokio::test]
    async fn test_resume_requires_paused() {
        let world = world();
        let error = world
            .control
            .resume("search", "poke", "eu-west-1")
            .await
            .err()
            .unwrap();
        assert!(matches!(error, ControlError::NotPaused(_)));
    }
}
