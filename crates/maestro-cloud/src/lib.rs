//! Maestro Cloud - collaborator interfaces
//!
//! The core consumes its external collaborators only through the traits
//! defined here:
//!
//! - [`AsgardClient`]: the cloud-provider facade (security groups, subnets,
//!   images, load balancers, ASG lifecycle, remote tasks)
//! - [`OnixClient`]: the application metadata registry
//! - [`TyranitarClient`]: the per-hash configuration service
//! - [`ShuppetClient`]: the policy-configuration service
//! - [`InstanceHealthClient`]: direct HTTP probe of an instance healthcheck
//!
//! HTTP-backed implementations live in [`http`]; scriptable in-memory fakes
//! for tests live in [`fake`].

pub mod asgard;
pub mod error;
pub mod fake;
pub mod healthcheck;
pub mod http;
pub mod onix;
pub mod remote;
pub mod shuppet;
pub mod tyranitar;

pub use asgard::{
    AsgInstance, AsgSummary, AsgardClient, Image, InstanceState, LaunchConfiguration,
    LoadBalancer, SecurityGroup, Subnet,
};
pub use error::{CloudError, CloudResult};
pub use healthcheck::InstanceHealthClient;
pub use onix::{OnixApplication, OnixClient};
pub use remote::{RemoteTask, RemoteTaskStatus};
pub use shuppet::ShuppetClient;
pub use tyranitar::TyranitarClient;
