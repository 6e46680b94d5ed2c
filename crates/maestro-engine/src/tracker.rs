//! External-task tracker
//!
//! Mirrors a remote task's status into the store until terminal. One
//! observation per tick; the budget decrements by one each tick. Transport
//! and store faults are hidden (the observation is rescheduled); anything
//! else is fatal and propagates. The remote task is presumed safe to
//! observe any number of times.

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::executor::TaskCallbacks;
use maestro_cloud::remote::parse_update_time;
use maestro_cloud::{AsgardClient, RemoteTaskStatus};
use maestro_store::DeploymentStore;
use maestro_types::{DeploymentId, Task, TaskStatus};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub struct TaskTracker {
    asgard: Arc<dyn AsgardClient>,
    store: Arc<dyn DeploymentStore>,
    config: EngineConfig,
}

fn task_status(remote: RemoteTaskStatus) -> TaskStatus {
    match remote {
        RemoteTaskStatus::Running => TaskStatus::Running,
        RemoteTaskStatus::Completed => TaskStatus::Completed,
        RemoteTaskStatus::Failed => TaskStatus::Failed,
        RemoteTaskStatus::Terminated => TaskStatus::Terminated,
    }
}

impl TaskTracker {
    pub fn new(
        asgard: Arc<dyn AsgardClient>,
        store: Arc<dyn DeploymentStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            asgard,
            store,
            config,
        }
    }

    /// Poll the task's remote url until terminal or until the tick budget
    /// runs out, then hand the task back through the callbacks.
    #[instrument(skip(self, task, callbacks), fields(deployment_id = %deployment_id, task_id = %task.id))]
    pub async fn track(
        &self,
        deployment_id: DeploymentId,
        mut task: Task,
        max_ticks: u64,
        callbacks: Arc<dyn TaskCallbacks>,
    ) -> EngineResult<()> {
        let url = match task.remote.as_ref() {
            Some(remote) => remote.url.clone(),
            None => {
                // nothing to track; treat as immediately complete
                task.status = TaskStatus::Completed;
                callbacks.on_complete(&deployment_id, task).await;
                return Ok(());
            }
        };

        let mut remaining = max_ticks;
        loop {
            if remaining == 0 {
                warn!(url = %url, "Remote task exhausted its budget");
                callbacks.on_timeout(&deployment_id, task).await;
                return Ok(());
            }
            remaining -= 1;

            match self.asgard.task(&url).await {
                Ok(remote) => {
                    task.log = remote.normalized_log();
                    let observed_at = remote.update_time.as_deref().and_then(parse_update_time);
                    debug!(status = ?remote.status, observed_at = ?observed_at, "Observed remote task");
                    if let Err(error) = self.store.store_task(&deployment_id, &task).await {
                        // persistence faults reschedule, they never fail the task
                        warn!(error = %error, "Could not persist task observation");
                    } else if remote.status.is_finished() {
                        debug!(status = ?remote.status, "Remote task finished");
                        task.status = task_status(remote.status);
                        callbacks.on_complete(&deployment_id, task).await;
                        return Ok(());
                    }
                }
                Err(error) if error.is_transient() => {
                    warn!(error = %error, "Transient fault observing remote task");
                }
                Err(error) => return Err(error.into()),
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use maestro_cloud::fake::FakeAsgard;
    use maestro_cloud::RemoteTask;
    use maestro_store::InMemoryDeploymentStore;
    use maestro_types::{Deployment, RemoteRef, TaskAction};
    use std::collections::BTreeMap;
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

    fn remote_observation(status: RemoteTaskStatus, log: &[&str]) -> RemoteTask {
        RemoteTask {
            status,
            log: log.iter().map(|l| l.to_string()).collect(),
            update_time: Some("2014-05-02 16:21:05 UTC".to_string()),
            operation: None,
            duration_string: None,
        }
    }

    struct Harness {
        tracker: TaskTracker,
        asgard: Arc<FakeAsgard>,
        store: Arc<InMemoryDeploymentStore>,
        callbacks: Arc<RecordingCallbacks>,
        deployment: Deployment,
        task: Task,
    }

    async fn harness(url: &str) -> Harness {
        let asgard = Arc::new(FakeAsgard::new());
        let store = Arc::new(InMemoryDeploymentStore::new());
        let deployment = Deployment::skeleton("search", "poke", "eu-west-1", "alice", "m");
        store.store_deployment(&deployment).await.unwrap();

        let mut task = deployment.tasks[0].clone();
        task.action = TaskAction::CreateAsg;
        task.status = TaskStatus::Running;
        task.remote = Some(RemoteRef {
            id: "1".to_string(),
            url: url.to_string(),
            parameters: BTreeMap::new(),
        });

        Harness {
            tracker: TaskTracker::new(asgard.clone(), store.clone(), EngineConfig::fast()),
            asgard,
            store,
            callbacks: Arc::new(RecordingCallbacks::default()),
            deployment,
            task,
        }
    }

    #[tokio::test]
    async fn test_tracks_until_terminal_and_normalizes_log() {
        let url = "http://asgard/eu-west-1/task/show/1";
        let h = harness(url).await;
        h.asgard.script_task(
            url,
            vec![
                remote_observation(RemoteTaskStatus::Running, &["2014-05-02_16:20:42 Started"]),
                remote_observation(
                    RemoteTaskStatus::Completed,
                    &[
                        "2014-05-02_16:20:42 Started",
                        "2014-05-02_16:20:44 Finished",
                    ],
                ),
            ],
        );

        h.tracker
            .track(h.deployment.id.clone(), h.task.clone(), 10, h.callbacks.clone())
            .await
            .unwrap();

        let completed = h.callbacks.completed.lock().unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].status, TaskStatus::Completed);

        let stored = h
            .store
            .get_deployment(&h.deployment.id)
            .await
            .unwrap()
            .unwrap();
        let stored_task = stored.task(&h.task.id).unwrap();
        assert_eq!(stored_task.log.len(), 2);
        assert_eq!(stored_task.log[1].message, "Finished");
    }

    #[tokio::test]
    async fn test_budget_exhaustion_times_out() {
        let url = "http://asgard/eu-west-1/task/show/2";
        let h = harness(url).await;
        h.asgard.script_task(
            url,
            vec![remote_observation(RemoteTaskStatus::Running, &[])],
        );

        h.tracker
            .track(h.deployment.id.clone(), h.task.clone(), 3, h.callbacks.clone())
            .await
            .unwrap();

        assert!(h.callbacks.completed.lock().unwrap().is_empty());
        assert_eq!(h.callbacks.timed_out.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remote_failure_is_surfaced_through_on_complete() {
        let url = "http://asgard/eu-west-1/task/show/3";
        let h = harness(url).await;
        h.asgard.script_task(
            url,
            vec![remote_observation(RemoteTaskStatus::Failed, &[])],
        );

        h.tracker
            .track(h.deployment.id.clone(), h.task.clone(), 10, h.callbacks.clone())
            .await
            .unwrap();

        let completed = h.callbacks.completed.lock().unwrap();
        assert_eq!(completed[0].status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn test_unknown_task_url_is_fatal() {
        let h = harness("http://asgard/eu-west-1/task/show/unknown").await;
        let result = h
            .tracker
            .track(h.deployment.id.clone(), h.task.clone(), 10, h.callbacks.clone())
            .await;
        assert!(result.is_err());
    }
}
