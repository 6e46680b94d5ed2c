//! Health waiters
//!
//! Two synchronization tasks share a shape: a fixed-period poll over an
//! enumerated target set with a shared attempt budget. All targets must be
//! healthy in the same cycle; a flap consumes budget like any other failed
//! attempt.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::executor::TaskCallbacks;
use maestro_cloud::{AsgardClient, InstanceHealthClient};
use maestro_store::DeploymentStore;
use maestro_types::{Deployment, DeploymentId, Task, TaskStatus};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

const DEFAULT_SERVICE_PORT: u16 = 8080;
const DEFAULT_HEALTHCHECK_PATH: &str = "/healthcheck";

pub struct HealthWaiters {
    asgard: Arc<dyn AsgardClient>,
    health: Arc<dyn InstanceHealthClient>,
    store: Arc<dyn DeploymentStore>,
    config: EngineConfig,
}

/// `service.port` from the application-properties document.
fn service_port(properties: Option<&serde_json::Value>) -> u16 {
    properties
        .and_then(|document| document.get("service.port"))
        .and_then(|value| {
            value
                .as_u64()
                .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        })
        .and_then(|port| u16::try_from(port).ok())
        .unwrap_or(DEFAULT_SERVICE_PORT)
}

/// `service.healthcheck.path` from the application-properties document.
fn healthcheck_path(properties: Option<&serde_json::Value>) -> String {
    properties
        .and_then(|document| document.get("service.healthcheck.path"))
        .and_then(|value| value.as_str())
        .unwrap_or(DEFAULT_HEALTHCHECK_PATH)
        .to_string()
}

impl HealthWaiters {
    pub fn new(
        asgard: Arc<dyn AsgardClient>,
        health: Arc<dyn InstanceHealthClient>,
        store: Arc<dyn DeploymentStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            asgard,
            health,
            store,
            config,
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

    /// Poll every instance of the new ASG on its application healthcheck
    /// until all answer 200 in the same cycle.
    #[instrument(skip(self, deployment, task, callbacks), fields(deployment_id = %deployment.id))]
    pub async fn wait_for_instance_health(
        &self,
        deployment: &Deployment,
        mut task: Task,
        attempts: u32,
        callbacks: Arc<dyn TaskCallbacks>,
    ) -> EngineResult<()> {
        let asg_name = Self::new_asg_name(deployment)?;
        let properties = deployment.new_state.tyranitar.application_properties.clone();
        let port = service_port(properties.as_ref());
        let path = healthcheck_path(properties.as_ref());

        for attempt in 1..=attempts {
            let instances = match self.asgard.asg_instances(&deployment.region, &asg_name).await {
                Ok(instances) => instances,
                Err(error) if error.is_transient() => {
                    warn!(error = %error, "Transient fault listing instances");
                    Vec::new()
                }
                Err(error) => return Err(error.into()),
            };

            let mut healthy = 0usize;
            for instance in &instances {
                match self.health.healthy(&instance.private_ip, port, &path).await {
                    Ok(true) => healthy += 1,
                    Ok(false) => {}
                    Err(_) => {}
                }
            }

            if !instances.is_empty() && healthy == instances.len() {
                task.append_log(format!("All {healthy} instances are healthy"));
                task.status = TaskStatus::Completed;
                self.store.store_task(&deployment.id, &task).await?;
                callbacks.on_complete(&deployment.id, task).await;
                return Ok(());
            }

            debug!(
                attempt,
                healthy,
                total = instances.len(),
                "Instances not yet healthy"
            );
            task.append_log(format!(
                "{healthy} of {} instances healthy (attempt {attempt}/{attempts})",
                instances.len()
            ));
            self.store.store_task(&deployment.id, &task).await?;
            tokio::time::sleep(self.config.poll_interval).await;
        }

        callbacks.on_timeout(&deployment.id, task).await;
        Ok(())
    }

    /// Poll the named load balancers until every instance of the new ASG
    /// is in service with all of them.
    #[instrument(skip(self, deployment, task, callbacks), fields(deployment_id = %deployment.id))]
    pub async fn wait_for_elb_health(
        &self,
        deployment: &Deployment,
        mut task: Task,
        attempts: u32,
        callbacks: Arc<dyn TaskCallbacks>,
    ) -> EngineResult<()> {
        let asg_name = Self::new_asg_name(deployment)?;
        let load_balancers = deployment.new_state.selected_load_balancers.clone();

        for attempt in 1..=attempts {
            let instances = match self.asgard.asg_instances(&deployment.region, &asg_name).await {
                Ok(instances) => instances,
                Err(error) if error.is_transient() => Vec::new(),
                Err(error) => return Err(error.into()),
            };
            let instance_ids: Vec<&str> =
                instances.iter().map(|i| i.instance_id.as_str()).collect();

            let mut all_in_service = !instance_ids.is_empty();
            for name in &load_balancers {
                let states = match self
                    .asgard
                    .load_balancer_instance_states(&deployment.region, name)
                    .await
                {
                    Ok(states) => states,
                    Err(error) if error.is_transient() => {
                        all_in_service = false;
                        continue;
                    }
                    Err(error) => return Err(error.into()),
                };
                let in_service = instance_ids.iter().all(|id| {
                    states
                        .iter()
                        .any(|state| state.instance_id == *id && state.in_service())
                });
                if !in_service {
                    all_in_service = false;
                }
            }

            if all_in_service {
                task.append_log(format!(
                    "All instances in service with {}",
                    load_balancers.join(", ")
                ));
                task.status = TaskStatus::Completed;
                self.store.store_task(&deployment.id, &task).await?;
                callbacks.on_complete(&deployment.id, task).await;
                return Ok(());
            }

            debug!(attempt, "Load balancers not yet reporting all healthy");
            task.append_log(format!(
                "Waiting for load balancers (attempt {attempt}/{attempts})"
            ));
            self.store.store_task(&deployment.id, &task).await?;
            tokio::time::sleep(self.config.poll_interval).await;
        }

        callbacks.on_timeout(&deployment.id, task).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use maestro_cloud::fake::{FakeAsgard, FakeInstanceHealth};
    use maestro_cloud::{AsgInstance, InstanceState};
    use maestro_store::InMemoryDeploymentStore;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingCallbacks {
        completed: Mutex<Vec<Task>>,
        timed_out: Mutex<Vec<Task>>,
    }

    #[async_trait]
    impl TaskCallbacks for RecordingCallbacks {
        async fn on_complete(&self, _deployment_id: &DeploymentId, task: Task) {
            self.completed.lock().unwrap().push(task);
        }

        async fn on_timeout(&self, _deployment_id: &DeploymentId, task: Task) {
            self.timed_out.lock().unwrap().push(task);
        }
    }

    struct Harness {
        waiters: HealthWaiters,
        asgard: Arc<FakeAsgard>,
        health: Arc<FakeInstanceHealth>,
        callbacks: Arc<RecordingCallbacks>,
        deployment: Deployment,
    }

    async fn harness() -> Harness {
        let asgard = Arc::new(FakeAsgard::new());
        let health = Arc::new(FakeInstanceHealth::new());
        let store = Arc::new(InMemoryDeploymentStore::new());
        let mut deployment = Deployment::skeleton("search", "poke", "eu-west-1", "alice", "m");
        deployment.new_state.auto_scaling_group_name = Some("search-poke-v001".to_string());
        store.store_deployment(&deployment).await.unwrap();

        Harness {
            waiters: HealthWaiters::new(
                asgard.clone(),
                health.clone(),
                store,
                EngineConfig::fast(),
            ),
            asgard,
            health,
            callbacks: Arc::new(RecordingCallbacks::default()),
            deployment,
        }
    }

    #[tokio::test]
    async fn test_all_instances_healthy_completes() {
        let h = harness().await;
        h.asgard.seed_instances(
            "search-poke-v001",
            vec![
                AsgInstance {
                    instance_id: "i-1".to_string(),
                    private_ip: "10.0.0.1".to_string(),
                },
                AsgInstance {
                    instance_id: "i-2".to_string(),
                    private_ip: "10.0.0.2".to_string(),
                },
            ],
        );
        h.health.set_healthy("10.0.0.1");
        h.health.script("10.0.0.2", vec![false, true]);

        let task = h.deployment.tasks[1].clone();
        h.waiters
            .wait_for_instance_health(&h.deployment, task, 5, h.callbacks.clone())
            .await
            .unwrap();

        let completed = h.callbacks.completed.lock().unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_stubborn_instance_exhausts_budget() {
        let h = harness().await;
        h.asgard.seed_instances(
            "search-poke-v001",
            vec![AsgInstance {
                instance_id: "i-1".to_string(),
                private_ip: "10.0.0.1".to_string(),
            }],
        );
        // never healthy

        let task = h.deployment.tasks[1].clone();
        h.waiters
            .wait_for_instance_health(&h.deployment, task, 3, h.callbacks.clone())
            .await
            .unwrap();

        assert!(h.callbacks.completed.lock().unwrap().is_empty());
        assert_eq!(h.callbacks.timed_out.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_elb_health_requires_all_members() {
        let mut h = harness().await;
        h.deployment.new_state.selected_load_balancers = vec!["search-frontend".to_string()];
        h.asgard.seed_instances(
            "search-poke-v001",
            vec![
                AsgInstance {
                    instance_id: "i-1".to_string(),
                    private_ip: "10.0.0.1".to_string(),
                },
                AsgInstance {
                    instance_id: "i-2".to_string(),
                    private_ip: "10.0.0.2".to_string(),
                },
            ],
        );
        h.asgard.set_lb_instance_states(
            "search-frontend",
            vec![
                InstanceState {
                    instance_id: "i-1".to_string(),
                    state: "InService".to_string(),
                },
                InstanceState {
                    instance_id: "i-2".to_string(),
                    state: "OutOfService".to_string(),
                },
            ],
        );

        let task = h.deployment.tasks[3].clone();
        h.waiters
            .wait_for_elb_health(&h.deployment, task, 2, h.callbacks.clone())
            .await
            .unwrap();
        assert_eq!(h.callbacks.timed_out.lock().unwrap().len(), 1);

        // now the second instance joins
        h.asgard.set_lb_instance_states(
            "search-frontend",
            vec![
                InstanceState {
                    instance_id: "i-1".to_string(),
                    state: "InService".to_string(),
                },
                InstanceState {
                    instance_id: "i-2".to_string(),
                    state: "InService".to_string(),
                },
            ],
        );
        let task = h.deployment.tasks[3].clone();
        h.waiters
            .wait_for_elb_health(&h.deployment, task, 2, h.callbacks.clone())
            .await
            .unwrap();
        assert_eq!(h.callbacks.completed.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_service_port_and_path_defaults() {
        assert_eq!(service_port(None), 8080);
        assert_eq!(healthcheck_path(None), "/healthcheck");

        let properties = serde_json::json!({
            "service.port": "7001",
            "service.healthcheck.path": "/ping"
        });
        assert_eq!(service_port(Some(&properties)), 7001);
        assert_eq!(healthcheck_path(Some(&properties)), "/ping");
    }
}
