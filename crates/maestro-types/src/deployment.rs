//! The deployment record
//!
//! A deployment is created by begin/undo/rollback, mutated by the
//! preparation pipeline and then the task executor, and is terminal once
//! its last task finishes or any task fails.

use crate::ids::{DeploymentId, TaskId};
use crate::params::{BlockDeviceMapping, DeploymentParams};
use crate::task::{AsgTag, Task, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Which stage of the workflow the deployment is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Preparation,
    Deployment,
    Completed,
    Failed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed)
    }

    /// Phases counted as "in flight" for the at-most-one invariant.
    pub fn in_flight(&self) -> bool {
        matches!(self, Phase::Preparation | Phase::Deployment)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Preparation => "preparation",
            Phase::Deployment => "deployment",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Overall deployment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentStatus {
    Running,
    Completed,
    Failed,
    Terminated,
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeploymentStatus::Running => "running",
            DeploymentStatus::Completed => "completed",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Hardware virtualisation flavour of a machine image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VirtualisationType {
    Paravirtual,
    Hvm,
}

impl fmt::Display for VirtualisationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VirtualisationType::Paravirtual => f.write_str("paravirtual"),
            VirtualisationType::Hvm => f.write_str("hvm"),
        }
    }
}

/// Details of a machine image. Only the id is known at request time; the
/// name, the application/version parsed from it and the virtualisation
/// type are resolved during preparation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ImageDetails {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub virt_type: Option<VirtualisationType>,
}

impl ImageDetails {
    /// Details known from the id alone.
    pub fn from_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            application: None,
            version: None,
            virt_type: None,
        }
    }
}

/// Owner/contact metadata from the application registry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OnixMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// The three per-hash documents from the configuration service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TyranitarBundle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_properties: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_params: Option<DeploymentParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch_data: Option<Vec<String>>,
}

/// A fully-resolved target (or predecessor) configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StateSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_details: Option<ImageDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onix: Option<OnixMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch_configuration_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_scaling_group_name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub selected_security_group_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub selected_load_balancers: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub selected_subnets: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub availability_zones: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_zone_identifier: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub block_device_mappings: Vec<BlockDeviceMapping>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub auto_scaling_group_tags: Vec<AsgTag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
    pub tyranitar: TyranitarBundle,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub termination_policies: Vec<String>,
}

impl StateSnapshot {
    /// The deployment parameters, falling back to pure defaults when the
    /// configuration document has not been fetched yet.
    pub fn params(&self) -> DeploymentParams {
        self.tyranitar
            .deployment_params
            .clone()
            .unwrap_or_default()
    }
}

/// One attempt to move (application, environment, region) onto a new image.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Deployment {
    pub id: DeploymentId,
    pub application: String,
    pub environment: String,
    pub region: String,
    pub user: String,
    pub message: String,
    pub created: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    pub phase: Phase,
    pub status: DeploymentStatus,
    pub new_state: StateSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_state: Option<StateSnapshot>,
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub rollback: bool,
    #[serde(default)]
    pub silent: bool,
    #[serde(default)]
    pub undo: bool,
    /// Free-form parameters merged in during preparation.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl Deployment {
    /// A skeleton deployment as persisted by `begin`, before preparation.
    pub fn skeleton(
        application: impl Into<String>,
        environment: impl Into<String>,
        region: impl Into<String>,
        user: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: DeploymentId::generate(),
            application: application.into(),
            environment: environment.into(),
            region: region.into(),
            user: user.into(),
            message: message.into(),
            created: Utc::now(),
            start: None,
            end: None,
            phase: Phase::Preparation,
            status: DeploymentStatus::Running,
            new_state: StateSnapshot::default(),
            previous_state: None,
            tasks: Task::sequence(),
            rollback: false,
            silent: false,
            undo: false,
            parameters: BTreeMap::new(),
        }
    }

    pub fn task(&self, task_id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == task_id)
    }

    pub fn task_mut(&mut self, task_id: &TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| &t.id == task_id)
    }

    /// The task immediately after the given one, located by id.
    pub fn task_after(&self, task_id: &TaskId) -> Option<&Task> {
        let index = self.tasks.iter().position(|t| &t.id == task_id)?;
        self.tasks.get(index + 1)
    }

    /// The first task that has not started yet.
    pub fn first_pending_task(&self) -> Option<&Task> {
        self.tasks.iter().find(|t| t.status == TaskStatus::Pending)
    }

    /// The deployment parameters resolved during preparation.
    pub fn params(&self) -> DeploymentParams {
        self.new_state.params()
    }
}
