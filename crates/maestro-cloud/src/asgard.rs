//! The cloud-provider facade
//!
//! Asgard fronts the autoscaling environment. State-changing operations are
//! form-encoded POSTs whose only success shape is a 302 redirect; the
//! returned `Location` is handed back to the caller, which derives a remote
//! task handle from it. Parameter maps are "exploded": a list value becomes
//! multiple form fields of the same name.

use crate::error::CloudResult;
use crate::remote::RemoteTask;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A security group visible in a region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub id: String,
    pub name: String,
}

/// A subnet with its placement attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: String,
    pub availability_zone: String,
    pub purpose: String,
    pub vpc_id: String,
}

/// A machine image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    pub name: String,
    pub virtualization_type: String,
}

/// A load balancer descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
}

/// Health state of one instance as reported by a load balancer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceState {
    pub instance_id: String,
    pub state: String,
}

impl InstanceState {
    pub fn in_service(&self) -> bool {
        self.state == "InService"
    }
}

/// An instance that belongs to an ASG, with its reachable address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsgInstance {
    pub instance_id: String,
    pub private_ip: String,
}

/// Summary of an existing auto scaling group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsgSummary {
    pub auto_scaling_group_name: String,
    pub min: u32,
    pub max: u32,
    pub desired_capacity: u32,
    pub health_check_type: String,
    #[serde(default)]
    pub load_balancer_names: Vec<String>,
    pub launch_configuration_name: String,
}

/// A launch configuration, with its user-data still base64-encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchConfiguration {
    pub name: String,
    pub image_id: String,
    pub instance_type: String,
    #[serde(default)]
    pub security_groups: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
}

/// Exploded form parameters for a state-changing call.
pub type FormParams = Vec<(String, String)>;

/// Append a list value as repeated fields of the same name.
pub fn explode(params: &mut FormParams, key: &str, values: &[String]) {
    for value in values {
        params.push((key.to_string(), value.clone()));
    }
}

/// The cloud-provider facade the engine and pipeline consume.
#[async_trait]
pub trait AsgardClient: Send + Sync {
    /// The most recent ASG for an application in an environment, if any.
    async fn last_auto_scaling_group(
        &self,
        region: &str,
        application: &str,
        environment: &str,
    ) -> CloudResult<Option<AsgSummary>>;

    /// Fetch a launch configuration by name.
    async fn launch_configuration(
        &self,
        region: &str,
        name: &str,
    ) -> CloudResult<Option<LaunchConfiguration>>;

    /// All security groups in a region.
    async fn security_groups(&self, region: &str) -> CloudResult<Vec<SecurityGroup>>;

    /// All subnets in a region.
    async fn subnets(&self, region: &str) -> CloudResult<Vec<Subnet>>;

    /// Fetch an image by id.
    async fn image(&self, region: &str, image_id: &str) -> CloudResult<Option<Image>>;

    /// Fetch a load balancer by name.
    async fn load_balancer(&self, region: &str, name: &str) -> CloudResult<Option<LoadBalancer>>;

    /// Per-instance health as reported by a load balancer.
    async fn load_balancer_instance_states(
        &self,
        region: &str,
        name: &str,
    ) -> CloudResult<Vec<InstanceState>>;

    /// The instances currently in an ASG.
    async fn asg_instances(&self, region: &str, asg_name: &str) -> CloudResult<Vec<AsgInstance>>;

    /// Whether an ASG currently exists.
    async fn asg_exists(&self, region: &str, asg_name: &str) -> CloudResult<bool>;

    /// Create a fresh ASG. Returns the redirect location.
    async fn create_auto_scaling_group(
        &self,
        region: &str,
        params: &FormParams,
    ) -> CloudResult<String>;

    /// Create the successor ASG of an existing cluster. Returns the
    /// redirect location.
    async fn create_next_auto_scaling_group(
        &self,
        region: &str,
        params: &FormParams,
    ) -> CloudResult<String>;

    /// Enable traffic to an ASG. Returns the redirect location.
    async fn enable_asg(&self, region: &str, asg_name: &str) -> CloudResult<String>;

    /// Disable traffic to an ASG. Returns the redirect location.
    async fn disable_asg(&self, region: &str, asg_name: &str) -> CloudResult<String>;

    /// Delete an ASG. Returns the redirect location.
    async fn delete_asg(&self, region: &str, asg_name: &str) -> CloudResult<String>;

    /// Poll a remote task's JSON representation.
    async fn task(&self, url: &str) -> CloudResult<RemoteTask>;
}
