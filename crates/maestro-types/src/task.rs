//! Task records - the ordered steps of a deployment
//!
//! Every deployment carries exactly the same six tasks, created up front
//! and immutable in order. Tasks move `Pending -> Running -> terminal`,
//! never backwards, and their logs are append-only.

use crate::ids::TaskId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The fixed actions a deployment performs, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskAction {
    CreateAsg,
    WaitForInstanceHealth,
    EnableAsg,
    WaitForElbHealth,
    DisableAsg,
    DeleteAsg,
}

impl TaskAction {
    /// The prescribed task sequence for every deployment.
    pub const SEQUENCE: [TaskAction; 6] = [
        TaskAction::CreateAsg,
        TaskAction::WaitForInstanceHealth,
        TaskAction::EnableAsg,
        TaskAction::WaitForElbHealth,
        TaskAction::DisableAsg,
        TaskAction::DeleteAsg,
    ];
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskAction::CreateAsg => "create-asg",
            TaskAction::WaitForInstanceHealth => "wait-for-instance-health",
            TaskAction::EnableAsg => "enable-asg",
            TaskAction::WaitForElbHealth => "wait-for-elb-health",
            TaskAction::DisableAsg => "disable-asg",
            TaskAction::DeleteAsg => "delete-asg",
        };
        f.write_str(s)
    }
}

/// Task status, monotone over the lifetime of the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Terminated,
}

impl TaskStatus {
    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Terminated
        )
    }

    /// Ordering rank used to enforce monotone transitions.
    pub fn rank(&self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Running => 1,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Terminated => 2,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// A single timestamped log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub date: DateTime<Utc>,
    pub message: String,
}

impl LogEntry {
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            date: Utc::now(),
            message: message.into(),
        }
    }
}

/// Handle to a long-running remote task on the cloud facade, polled by the
/// tracker until terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRef {
    pub id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

/// One step of a deployment's fixed sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub action: TaskAction,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteRef>,
    #[serde(default)]
    pub log: Vec<LogEntry>,
}

impl Task {
    /// A fresh pending task for the given action.
    pub fn pending(action: TaskAction) -> Self {
        Self {
            id: TaskId::generate(),
            action,
            status: TaskStatus::Pending,
            start: None,
            end: None,
            remote: None,
            log: Vec::new(),
        }
    }

    /// The full pending sequence for a new deployment.
    pub fn sequence() -> Vec<Task> {
        TaskAction::SEQUENCE.iter().copied().map(Task::pending).collect()
    }

    pub fn append_log(&mut self, message: impl Into<String>) {
        self.log.push(LogEntry::now(message));
    }
}

/// A tag applied to the new auto scaling group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AsgTag {
    pub key: String,
    pub value: String,
    pub propagate_at_launch: bool,
    pub resource_type: String,
    pub resource_id: String,
}

impl AsgTag {
    /// An auto-scaling-group tag propagated to launched instances.
    pub fn propagated(asg_name: &str, key: &str, value: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            value: value.into(),
            propagate_at_launch: true,
            resource_type: "auto-scaling-group".to_string(),
            resource_id: asg_name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_order_is_fixed() {
        let tasks = Task::sequence();
        let actions: Vec<TaskAction> = tasks.iter().map(|t| t.action).collect();
        assert_eq!(actions, TaskAction::SEQUENCE);
        assert!(tasks.iter().all(|t| t.status == TaskStatus::Pending));
    }

    #[test]
    fn test_status_ranks_are_monotone() {
        assert!(TaskStatus::Pending.rank() < TaskStatus::Running.rank());
        assert!(TaskStatus::Running.rank() < TaskStatus::Completed.rank());
        assert_eq!(TaskStatus::Completed.rank(), TaskStatus::Failed.rank());
    }

    #[test]
    fn test_action_serializes_kebab_case() {
        let json = serde_json::to_string(&TaskAction::WaitForInstanceHealth).unwrap();
        assert_eq!(json, "\"wait-for-instance-health\"");
    }
}
