//! Maestro Types - Core types for deployment orchestration
//!
//! Maestro drives applications through a prescribed multi-stage deployment
//! workflow against an Asgard-fronted autoscaling environment. This crate
//! holds the shared vocabulary: typed identifiers, the deployment record
//! and its ordered task list, deployment parameters with their defaults,
//! and the event stream types.
//!
//! ## Key Concepts
//!
//! - **Deployment**: one attempt to move an application/environment/region
//!   onto a new machine image, via a fixed six-task sequence
//! - **Task**: a single step of that sequence, with its own status and log
//! - **StateSnapshot**: the fully-resolved target (or predecessor)
//!   configuration - ASG name, launch configuration, security groups,
//!   subnets, tags, user-data
//! - **DeploymentParams**: the per-hash tuning knobs, fully defaulted

pub mod deployment;
pub mod events;
pub mod ids;
pub mod params;
pub mod task;

pub use deployment::{
    Deployment, DeploymentStatus, ImageDetails, OnixMetadata, Phase, StateSnapshot,
    TyranitarBundle, VirtualisationType,
};
pub use events::{EventSource, MaestroEvent, MaestroEventEnvelope};
pub use ids::{DeploymentId, TaskId};
pub use params::{BlockDeviceMapping, DeploymentParams, Ebs};
pub use task::{AsgTag, LogEntry, RemoteRef, Task, TaskAction, TaskStatus};
