//! End-to-end deployment flows against the in-memory collaborators:
//! preparation via the pipeline, then execution via the engine.

use maestro_cloud::fake::{FakeAsgard, FakeInstanceHealth, FakeOnix, FakeShuppet, FakeTyranitar};
use maestro_cloud::{AsgInstance, AsgSummary, LaunchConfiguration};
use maestro_engine::{EngineConfig, TaskExecutor};
use maestro_pipeline::{userdata, PreparationOutcome, PreparationRunner, Services};
use maestro_store::{
    DeploymentStore, InMemoryDeploymentStore, InMemoryRegistry, Registry, Triple,
};
use maestro_types::{
    Deployment, DeploymentId, DeploymentStatus, ImageDetails, OnixMetadata, Phase, TaskAction,
    TaskStatus,
};
use std::sync::Arc;
use std::time::Duration;

struct World {
    asgard: Arc<FakeAsgard>,
    tyranitar: Arc<FakeTyranitar>,
    health: Arc<FakeInstanceHealth>,
    store: Arc<InMemoryDeploymentStore>,
    registry: Arc<InMemoryRegistry>,
    runner: PreparationRunner,
    executor: Arc<TaskExecutor>,
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
            email: Some("search@example.com".to_string()),
        },
    );
    tyranitar.seed_hash("poke", "search", "abc123");
    asgard.seed_security_group("sg-hc", "healthcheck");
    asgard.seed_security_group("sg-nrpe", "nrpe");
    asgard.seed_subnet("subnet-a", "eu-west-1a", "internal", "vpc-1");
    asgard.seed_subnet("subnet-b", "eu-west-1b", "internal", "vpc-1");

    let services = Services::new(
        asgard.clone(),
        onix.clone(),
        tyranitar.clone(),
        shuppet.clone(),
    );
    let runner =
        PreparationRunner::new(services, store.clone()).with_retry_backoff(Duration::ZERO);
    let executor = TaskExecutor::new(
        store.clone(),
        registry.clone(),
        asgard.clone(),
        health.clone(),
        EngineConfig::fast(),
    );

    World {
        asgard,
        tyranitar,
        health,
        store,
        registry,
        runner,
        executor,
    }
}

async fn request_deployment(world: &World, ami: &str) -> Deployment {
    let mut dep = Deployment::skeleton("search", "poke", "eu-west-1", "alice", "initial");
    dep.new_state.image_details = Some(ImageDetails::from_id(ami));
    world.store.store_deployment(&dep).await.unwrap();
    let triple = Triple::new("search", "poke", "eu-west-1");
    assert!(world.registry.acquire_in_progress(&triple, &dep.id).await);
    dep
}

async fn wait_for_terminal_phase(world: &World, id: &DeploymentId) -> Deployment {
    for _ in 0..500 {
        let dep = world.store.get_deployment(id).await.unwrap().unwrap();
        if dep.phase.is_terminal() {
            return dep;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("deployment never reached a terminal phase");
}

async fn wait_until_paused(world: &World, triple: &Triple) {
    for _ in 0..500 {
        if world.registry.is_paused(triple).await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("deployment never paused");
}

#[tokio::test]
async fn first_deployment_runs_all_six_tasks() {
    let world = world();
    world.asgard.seed_image("ami-123", "search-1.0.3", "paravirtual");
    world.asgard.seed_instances(
        "search-poke-v001",
        vec![AsgInstance {
            instance_id: "i-1".to_string(),
            private_ip: "10.0.0.1".to_string(),
        }],
    );
    world.health.set_healthy("10.0.0.1");

    let dep = request_deployment(&world, "ami-123").await;
    let outcome = world.runner.prepare(&dep.id).await.unwrap();
    assert_eq!(outcome, PreparationOutcome::Prepared);
    world.executor.start_deployment(&dep.id).await.unwrap();

    let finished = wait_for_terminal_phase(&world, &dep.id).await;
    assert_eq!(finished.phase, Phase::Completed);
    assert_eq!(finished.status, DeploymentStatus::Completed);
    assert!(finished.start.unwrap() <= finished.end.unwrap());
    assert_eq!(
        finished.new_state.auto_scaling_group_name.as_deref(),
        Some("search-poke-v001")
    );
    assert!(finished
        .tasks
        .iter()
        .all(|task| task.status == TaskStatus::Completed));

    // no predecessor and no load balancers: only create and enable touch
    // the cloud facade
    assert_eq!(
        world.asgard.calls(),
        vec![
            "create-asg:search-poke-v001",
            "enable-asg:search-poke-v001"
        ]
    );

    // the slot is free again
    let triple = Triple::new("search", "poke", "eu-west-1");
    assert!(world
        .registry
        .acquire_in_progress(&triple, &DeploymentId::generate())
        .await);
}

#[tokio::test]
async fn successor_deployment_replaces_predecessor() {
    let world = world();
    world.asgard.seed_image("ami-456", "search-1.1.0", "paravirtual");
    world.asgard.seed_image("ami-000", "search-1.0.0", "paravirtual");

    let old_user_data = userdata::encode("#!/bin/bash\nexport HASH=old-hash\n");
    world.asgard.seed_cluster(
        "search",
        "poke",
        AsgSummary {
            auto_scaling_group_name: "search-poke-v023".to_string(),
            min: 1,
            max: 1,
            desired_capacity: 1,
            health_check_type: "EC2".to_string(),
            load_balancer_names: vec![],
            launch_configuration_name: "search-poke-v023-20140101000000".to_string(),
        },
        LaunchConfiguration {
            name: "search-poke-v023-20140101000000".to_string(),
            image_id: "ami-000".to_string(),
            instance_type: "t1.micro".to_string(),
            security_groups: vec![],
            user_data: Some(old_user_data),
        },
    );
    world.tyranitar.seed_hash("poke", "search", "old-hash");
    world.tyranitar.seed_hash("poke", "search", "abc123");
    world.asgard.set_next_asg_name("search-poke-v024");
    world.asgard.seed_instances(
        "search-poke-v024",
        vec![AsgInstance {
            instance_id: "i-9".to_string(),
            private_ip: "10.0.0.9".to_string(),
        }],
    );
    world.health.set_healthy("10.0.0.9");

    let dep = request_deployment(&world, "ami-456").await;
    assert_eq!(
        world.runner.prepare(&dep.id).await.unwrap(),
        PreparationOutcome::Prepared
    );

    let prepared = world.store.get_deployment(&dep.id).await.unwrap().unwrap();
    assert_eq!(
        prepared.previous_state.as_ref().unwrap().hash.as_deref(),
        Some("old-hash")
    );
    assert_eq!(
        prepared.new_state.auto_scaling_group_name.as_deref(),
        Some("search-poke-v024")
    );

    world.executor.start_deployment(&dep.id).await.unwrap();
    let finished = wait_for_terminal_phase(&world, &dep.id).await;
    assert_eq!(finished.phase, Phase::Completed);

    assert_eq!(
        world.asgard.calls(),
        vec![
            "create-next-asg:search-poke-v024",
            "enable-asg:search-poke-v024",
            "disable-asg:search-poke-v023",
            "delete-asg:search-poke-v023"
        ]
    );
}

#[tokio::test]
async fn unhealthy_instances_time_the_deployment_out() {
    let world = world();
    world.asgard.seed_image("ami-123", "search-1.0.3", "paravirtual");
    world.tyranitar.seed_deployment_params(
        "poke",
        "search",
        "abc123",
        serde_json::json!({"instance-healthy-attempts": 2}),
    );
    world.asgard.seed_instances(
        "search-poke-v001",
        vec![AsgInstance {
            instance_id: "i-1".to_string(),
            private_ip: "10.0.0.1".to_string(),
        }],
    );
    // 10.0.0.1 never becomes healthy

    let dep = request_deployment(&world, "ami-123").await;
    world.runner.prepare(&dep.id).await.unwrap();
    world.executor.start_deployment(&dep.id).await.unwrap();

    let finished = wait_for_terminal_phase(&world, &dep.id).await;
    assert_eq!(finished.phase, Phase::Failed);
    assert_eq!(finished.status, DeploymentStatus::Failed);

    let health_task = finished
        .tasks
        .iter()
        .find(|task| task.action == TaskAction::WaitForInstanceHealth)
        .unwrap();
    assert_eq!(health_task.status, TaskStatus::Failed);
    assert!(health_task.end.is_some());

    // nothing after the failed task ran
    let enable_task = finished
        .tasks
        .iter()
        .find(|task| task.action == TaskAction::EnableAsg)
        .unwrap();
    assert_eq!(enable_task.status, TaskStatus::Pending);
}

#[tokio::test]
async fn pause_gate_suspends_between_tasks_and_resume_continues() {
    let world = world();
    world.asgard.seed_image("ami-123", "search-1.0.3", "paravirtual");
    world.asgard.seed_instances(
        "search-poke-v001",
        vec![AsgInstance {
            instance_id: "i-1".to_string(),
            private_ip: "10.0.0.1".to_string(),
        }],
    );
    world.health.set_healthy("10.0.0.1");

    let triple = Triple::new("search", "poke", "eu-west-1");
    let dep = request_deployment(&world, "ami-123").await;
    world.runner.prepare(&dep.id).await.unwrap();

    world.registry.register_pause(&triple).await;
    world.executor.start_deployment(&dep.id).await.unwrap();

    wait_until_paused(&world, &triple).await;
    let paused = world.store.get_deployment(&dep.id).await.unwrap().unwrap();
    assert_eq!(paused.phase, Phase::Deployment);
    assert_eq!(paused.tasks[0].status, TaskStatus::Completed);
    assert!(paused.tasks[1..]
        .iter()
        .all(|task| task.status == TaskStatus::Pending));

    world.executor.resume_deployment(&dep.id).await.unwrap();
    let finished = wait_for_terminal_phase(&world, &dep.id).await;
    assert_eq!(finished.phase, Phase::Completed);
    assert!(!world.registry.is_paused(&triple).await);
}
