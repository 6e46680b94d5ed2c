//! Event stream types
//!
//! The engine and control plane publish these over a broadcast channel so
//! observers (the daemon's event logger, tests) can follow a deployment
//! without polling the store.

use crate::ids::{DeploymentId, TaskId};
use crate::task::TaskAction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which subsystem produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventSource {
    ControlPlane,
    Pipeline,
    Executor,
    Tracker,
}

/// Something observable happened to a deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MaestroEvent {
    DeploymentCreated {
        deployment_id: DeploymentId,
        application: String,
        environment: String,
        region: String,
    },
    PreparationCompleted {
        deployment_id: DeploymentId,
    },
    TaskStarted {
        deployment_id: DeploymentId,
        task_id: TaskId,
        action: TaskAction,
    },
    TaskCompleted {
        deployment_id: DeploymentId,
        task_id: TaskId,
        action: TaskAction,
    },
    TaskFailed {
        deployment_id: DeploymentId,
        task_id: TaskId,
        action: TaskAction,
        reason: String,
    },
    DeploymentPaused {
        deployment_id: DeploymentId,
    },
    DeploymentResumed {
        deployment_id: DeploymentId,
    },
    DeploymentCompleted {
        deployment_id: DeploymentId,
    },
    DeploymentFailed {
        deployment_id: DeploymentId,
        reason: String,
    },
}

/// An event with its source and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaestroEventEnvelope {
    pub event: MaestroEvent,
    pub source: EventSource,
    pub timestamp: DateTime<Utc>,
}

impl MaestroEventEnvelope {
    pub fn new(event: MaestroEvent, source: EventSource) -> Self {
        Self {
            event,
            source,
            timestamp: Utc::now(),
        }
    }
}
