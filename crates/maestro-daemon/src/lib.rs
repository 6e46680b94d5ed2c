//! Maestro Daemon - deployment orchestration service
//!
//! Hosts the REST API over the control plane, the preparation pipeline and
//! the task executor, wired against HTTP collaborators (Asgard, Onix,
//! Tyranitar, Shuppet) configured per deployment environment.

pub mod api;
pub mod config;
pub mod error;
pub mod server;

pub use config::DaemonConfig;
pub use error::{ApiError, ApiResult, DaemonError, DaemonResult};
pub use server::Server;
