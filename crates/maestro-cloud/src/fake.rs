//! Scriptable in-memory fakes for the collaborator traits
//!
//! Tests seed these with the world they want (clusters, images, subnets,
//! scripted shuppet answers) and assert on the calls the engine made.

use crate::asgard::{
    AsgInstance, AsgSummary, AsgardClient, FormParams, Image, InstanceState, LaunchConfiguration,
    LoadBalancer, SecurityGroup, Subnet,
};
use crate::error::{CloudError, CloudResult};
use crate::healthcheck::InstanceHealthClient;
use crate::onix::{OnixApplication, OnixClient};
use crate::remote::{RemoteTask, RemoteTaskStatus};
use crate::shuppet::ShuppetClient;
use crate::tyranitar::TyranitarClient;
use async_trait::async_trait;
use maestro_types::OnixMetadata;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

/// In-memory Asgard. State-changing calls are recorded and answered with a
/// completed remote task.
#[derive(Default)]
pub struct FakeAsgard {
    security_groups: RwLock<Vec<SecurityGroup>>,
    subnets: RwLock<Vec<Subnet>>,
    images: RwLock<HashMap<String, Image>>,
    load_balancers: RwLock<HashMap<String, LoadBalancer>>,
    lb_instance_states: RwLock<HashMap<String, Vec<InstanceState>>>,
    clusters: RwLock<HashMap<(String, String), AsgSummary>>,
    launch_configurations: RwLock<HashMap<String, LaunchConfiguration>>,
    instances: RwLock<HashMap<String, Vec<AsgInstance>>>,
    existing_asgs: RwLock<HashSet<String>>,
    next_asg_name: RwLock<Option<String>>,
    tasks: RwLock<HashMap<String, VecDeque<RemoteTask>>>,
    calls: Mutex<Vec<String>>,
    task_seq: AtomicU64,
}

impl FakeAsgard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_security_group(&self, id: &str, name: &str) {
        self.security_groups.write().unwrap().push(SecurityGroup {
            id: id.to_string(),
            name: name.to_string(),
        });
    }

    pub fn seed_subnet(&self, id: &str, zone: &str, purpose: &str, vpc_id: &str) {
        self.subnets.write().unwrap().push(Subnet {
            id: id.to_string(),
            availability_zone: zone.to_string(),
            purpose: purpose.to_string(),
            vpc_id: vpc_id.to_string(),
        });
    }

    pub fn seed_image(&self, id: &str, name: &str, virtualization_type: &str) {
        self.images.write().unwrap().insert(
            id.to_string(),
            Image {
                id: id.to_string(),
                name: name.to_string(),
                virtualization_type: virtualization_type.to_string(),
            },
        );
    }

    pub fn seed_load_balancer(&self, name: &str, vpc_id: Option<&str>) {
        self.load_balancers.write().unwrap().insert(
            name.to_string(),
            LoadBalancer {
                name: name.to_string(),
                vpc_id: vpc_id.map(str::to_string),
            },
        );
    }

    pub fn set_lb_instance_states(&self, name: &str, states: Vec<InstanceState>) {
        self.lb_instance_states
            .write()
            .unwrap()
            .insert(name.to_string(), states);
    }

    /// Seed an existing cluster: its last ASG and that ASG's launch
    /// configuration.
    pub fn seed_cluster(
        &self,
        application: &str,
        environment: &str,
        summary: AsgSummary,
        launch_configuration: LaunchConfiguration,
    ) {
        self.existing_asgs
            .write()
            .unwrap()
            .insert(summary.auto_scaling_group_name.clone());
        self.launch_configurations
            .write()
            .unwrap()
            .insert(launch_configuration.name.clone(), launch_configuration);
        self.clusters.write().unwrap().insert(
            (application.to_string(), environment.to_string()),
            summary,
        );
    }

    pub fn seed_instances(&self, asg_name: &str, instances: Vec<AsgInstance>) {
        self.instances
            .write()
            .unwrap()
            .insert(asg_name.to_string(), instances);
    }

    /// The name the fake reports for the next successor creation.
    pub fn set_next_asg_name(&self, name: &str) {
        *self.next_asg_name.write().unwrap() = Some(name.to_string());
    }

    /// Override the observations returned for a task url, in order. The
    /// last observation repeats once the queue drains.
    pub fn script_task(&self, url: &str, observations: Vec<RemoteTask>) {
        self.tasks
            .write()
            .unwrap()
            .insert(url.to_string(), observations.into());
    }

    /// Every state-changing call made so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn completed_task(log: Vec<String>) -> RemoteTask {
        RemoteTask {
            status: RemoteTaskStatus::Completed,
            log,
            update_time: Some("2014-05-02 16:21:05 UTC".to_string()),
            operation: None,
            duration_string: Some("5s".to_string()),
        }
    }

    fn register_task(&self, region: &str, task: RemoteTask) -> String {
        let seq = self.task_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let url = format!("http://asgard/{region}/task/show/{seq}");
        self.tasks
            .write()
            .unwrap()
            .insert(url.clone(), VecDeque::from(vec![task]));
        url
    }

    fn param(params: &FormParams, key: &str) -> Option<String> {
        params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }
}

#[async_trait]
impl AsgardClient for FakeAsgard {
    async fn last_auto_scaling_group(
        &self,
        _region: &str,
        application: &str,
        environment: &str,
    ) -> CloudResult<Option<AsgSummary>> {
        Ok(self
            .clusters
            .read()
            .unwrap()
            .get(&(application.to_string(), environment.to_string()))
            .cloned())
    }

    async fn launch_configuration(
        &self,
        _region: &str,
        name: &str,
    ) -> CloudResult<Option<LaunchConfiguration>> {
        Ok(self.launch_configurations.read().unwrap().get(name).cloned())
    }

    async fn security_groups(&self, _region: &str) -> CloudResult<Vec<SecurityGroup>> {
        Ok(self.security_groups.read().unwrap().clone())
    }

    async fn subnets(&self, _region: &str) -> CloudResult<Vec<Subnet>> {
        Ok(self.subnets.read().unwrap().clone())
    }

    async fn image(&self, _region: &str, image_id: &str) -> CloudResult<Option<Image>> {
        Ok(self.images.read().unwrap().get(image_id).cloned())
    }

    async fn load_balancer(&self, _region: &str, name: &str) -> CloudResult<Option<LoadBalancer>> {
        Ok(self.load_balancers.read().unwrap().get(name).cloned())
    }

    async fn load_balancer_instance_states(
        &self,
        _region: &str,
        name: &str,
    ) -> CloudResult<Vec<InstanceState>> {
        Ok(self
            .lb_instance_states
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_default())
    }

    async fn asg_instances(&self, _region: &str, asg_name: &str) -> CloudResult<Vec<AsgInstance>> {
        Ok(self
            .instances
            .read()
            .unwrap()
            .get(asg_name)
            .cloned()
            .unwrap_or_default())
    }

    async fn asg_exists(&self, _region: &str, asg_name: &str) -> CloudResult<bool> {
        Ok(self.existing_asgs.read().unwrap().contains(asg_name))
    }

    async fn create_auto_scaling_group(
        &self,
        region: &str,
        params: &FormParams,
    ) -> CloudResult<String> {
        let name = Self::param(params, "name").unwrap_or_else(|| "unnamed".to_string());
        self.record(format!("create-asg:{name}"));
        self.existing_asgs.write().unwrap().insert(name.clone());
        let task =
            Self::completed_task(vec![format!("2014-05-02_16:20:42 Creating auto scaling group '{name}'")]);
        Ok(self.register_task(region, task))
    }

    async fn create_next_auto_scaling_group(
        &self,
        region: &str,
        _params: &FormParams,
    ) -> CloudResult<String> {
        let name = self
            .next_asg_name
            .read()
            .unwrap()
            .clone()
            .unwrap_or_else(|| "unnamed".to_string());
        self.record(format!("create-next-asg:{name}"));
        self.existing_asgs.write().unwrap().insert(name.clone());
        let task =
            Self::completed_task(vec![format!("2014-05-02_16:20:42 Creating auto scaling group '{name}'")]);
        Ok(self.register_task(region, task))
    }

    async fn enable_asg(&self, region: &str, asg_name: &str) -> CloudResult<String> {
        if !self.existing_asgs.read().unwrap().contains(asg_name) {
            return Err(CloudError::AsgNotFound);
        }
        self.record(format!("enable-asg:{asg_name}"));
        let task = Self::completed_task(vec![format!(
            "2014-05-02_16:20:42 Enabling traffic to {asg_name}"
        )]);
        Ok(self.register_task(region, task))
    }

    async fn disable_asg(&self, region: &str, asg_name: &str) -> CloudResult<String> {
        if !self.existing_asgs.read().unwrap().contains(asg_name) {
            return Err(CloudError::AsgNotFound);
        }
        self.record(format!("disable-asg:{asg_name}"));
        let task = Self::completed_task(vec![format!(
            "2014-05-02_16:20:42 Disabling traffic to {asg_name}"
        )]);
        Ok(self.register_task(region, task))
    }

    async fn delete_asg(&self, region: &str, asg_name: &str) -> CloudResult<String> {
        if !self.existing_asgs.read().unwrap().contains(asg_name) {
            return Err(CloudError::AsgNotFound);
        }
        self.record(format!("delete-asg:{asg_name}"));
        self.existing_asgs.write().unwrap().remove(asg_name);
        let task =
            Self::completed_task(vec![format!("2014-05-02_16:20:42 Deleting {asg_name}")]);
        Ok(self.register_task(region, task))
    }

    async fn task(&self, url: &str) -> CloudResult<RemoteTask> {
        let mut tasks = self.tasks.write().unwrap();
        let queue = tasks
            .get_mut(url)
            .ok_or_else(|| CloudError::NotFound(format!("task {url}")))?;
        let observation = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        observation.ok_or_else(|| CloudError::NotFound(format!("task {url}")))
    }
}

/// In-memory application registry.
#[derive(Default)]
pub struct FakeOnix {
    applications: RwLock<HashMap<String, OnixApplication>>,
    environments: RwLock<Vec<String>>,
}

impl FakeOnix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_application(&self, name: &str, metadata: OnixMetadata) {
        self.applications.write().unwrap().insert(
            name.to_string(),
            OnixApplication {
                name: name.to_string(),
                metadata,
            },
        );
    }

    pub fn seed_environments(&self, environments: &[&str]) {
        *self.environments.write().unwrap() =
            environments.iter().map(|e| e.to_string()).collect();
    }
}

#[async_trait]
impl OnixClient for FakeOnix {
    async fn application(&self, name: &str) -> CloudResult<Option<OnixApplication>> {
        Ok(self.applications.read().unwrap().get(name).cloned())
    }

    async fn applications(&self) -> CloudResult<Vec<String>> {
        let mut names: Vec<String> = self.applications.read().unwrap().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn upsert_application(
        &self,
        name: &str,
        metadata: OnixMetadata,
    ) -> CloudResult<OnixApplication> {
        let application = OnixApplication {
            name: name.to_string(),
            metadata,
        };
        self.applications
            .write()
            .unwrap()
            .insert(name.to_string(), application.clone());
        Ok(application)
    }

    async fn environments(&self) -> CloudResult<Vec<String>> {
        Ok(self.environments.read().unwrap().clone())
    }
}

/// In-memory configuration service.
#[derive(Default)]
pub struct FakeTyranitar {
    latest: RwLock<HashMap<(String, String), String>>,
    hashes: RwLock<HashSet<(String, String, String)>>,
    properties: RwLock<HashMap<(String, String, String), serde_json::Value>>,
    params: RwLock<HashMap<(String, String, String), serde_json::Value>>,
    launch_data: RwLock<HashMap<(String, String, String), Vec<String>>>,
}

impl FakeTyranitar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hash as the latest for (environment, application) with
    /// empty documents; tests overlay specifics afterwards.
    pub fn seed_hash(&self, environment: &str, application: &str, hash: &str) {
        let key = (
            environment.to_string(),
            application.to_string(),
            hash.to_string(),
        );
        self.latest.write().unwrap().insert(
            (environment.to_string(), application.to_string()),
            hash.to_string(),
        );
        self.hashes.write().unwrap().insert(key.clone());
        self.properties
            .write()
            .unwrap()
            .insert(key.clone(), serde_json::json!({}));
        self.params
            .write()
            .unwrap()
            .insert(key.clone(), serde_json::json!({}));
        self.launch_data.write().unwrap().insert(key, Vec::new());
    }

    pub fn seed_properties(
        &self,
        environment: &str,
        application: &str,
        hash: &str,
        document: serde_json::Value,
    ) {
        self.properties.write().unwrap().insert(
            (
                environment.to_string(),
                application.to_string(),
                hash.to_string(),
            ),
            document,
        );
    }

    pub fn seed_deployment_params(
        &self,
        environment: &str,
        application: &str,
        hash: &str,
        document: serde_json::Value,
    ) {
        self.params.write().unwrap().insert(
            (
                environment.to_string(),
                application.to_string(),
                hash.to_string(),
            ),
            document,
        );
    }

    pub fn seed_launch_data(
        &self,
        environment: &str,
        application: &str,
        hash: &str,
        lines: Vec<String>,
    ) {
        self.launch_data.write().unwrap().insert(
            (
                environment.to_string(),
                application.to_string(),
                hash.to_string(),
            ),
            lines,
        );
    }
}

#[async_trait]
impl TyranitarClient for FakeTyranitar {
    async fn latest_hash(
        &self,
        environment: &str,
        application: &str,
    ) -> CloudResult<Option<String>> {
        Ok(self
            .latest
            .read()
            .unwrap()
            .get(&(environment.to_string(), application.to_string()))
            .cloned())
    }

    async fn hash_exists(
        &self,
        environment: &str,
        application: &str,
        hash: &str,
    ) -> CloudResult<bool> {
        Ok(self.hashes.read().unwrap().contains(&(
            environment.to_string(),
            application.to_string(),
            hash.to_string(),
        )))
    }

    async fn application_properties(
        &self,
        environment: &str,
        application: &str,
        hash: &str,
    ) -> CloudResult<Option<serde_json::Value>> {
        Ok(self
            .properties
            .read()
            .unwrap()
            .get(&(
                environment.to_string(),
                application.to_string(),
                hash.to_string(),
            ))
            .cloned())
    }

    async fn deployment_params(
        &self,
        environment: &str,
        application: &str,
        hash: &str,
    ) -> CloudResult<Option<serde_json::Value>> {
        Ok(self
            .params
            .read()
            .unwrap()
            .get(&(
                environment.to_string(),
                application.to_string(),
                hash.to_string(),
            ))
            .cloned())
    }

    async fn launch_data(
        &self,
        environment: &str,
        application: &str,
        hash: &str,
    ) -> CloudResult<Option<Vec<String>>> {
        Ok(self
            .launch_data
            .read()
            .unwrap()
            .get(&(
                environment.to_string(),
                application.to_string(),
                hash.to_string(),
            ))
            .cloned())
    }
}

/// Scriptable policy-configuration service. Answers `Ok(Some({}))` unless a
/// queue of responses has been scripted.
#[derive(Default)]
pub struct FakeShuppet {
    responses: Mutex<VecDeque<CloudResult<Option<serde_json::Value>>>>,
}

impl FakeShuppet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, response: CloudResult<Option<serde_json::Value>>) {
        self.responses.lock().unwrap().push_back(response);
    }
}

#[async_trait]
impl ShuppetClient for FakeShuppet {
    async fn configuration(
        &self,
        _environment: &str,
        _application: &str,
    ) -> CloudResult<Option<serde_json::Value>> {
        match self.responses.lock().unwrap().pop_front() {
            Some(response) => response,
            None => Ok(Some(serde_json::json!({}))),
        }
    }
}

/// Scriptable instance health probe. Scripted answers pop in order; once
/// drained the probe reports the standing healthy set.
#[derive(Default)]
pub struct FakeInstanceHealth {
    healthy: RwLock<HashSet<String>>,
    scripts: Mutex<HashMap<String, VecDeque<bool>>>,
}

impl FakeInstanceHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_healthy(&self, host: &str) {
        self.healthy.write().unwrap().insert(host.to_string());
    }

    pub fn set_unhealthy(&self, host: &str) {
        self.healthy.write().unwrap().remove(host);
    }

    pub fn script(&self, host: &str, answers: Vec<bool>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(host.to_string(), answers.into());
    }
}

#[async_trait]
impl InstanceHealthClient for FakeInstanceHealth {
    async fn healthy(&self, host: &str, _port: u16, _path: &str) -> CloudResult<bool> {
        if let Some(queue) = self.scripts.lock().unwrap().get_mut(host) {
            if let Some(answer) = queue.pop_front() {
                return Ok(answer);
            }
        }
        Ok(self.healthy.read().unwrap().contains(host))
    }
}
