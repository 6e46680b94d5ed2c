//! Maestro Pipeline - deployment preparation
//!
//! Preparation turns a minimal deployment request into a fully-resolved
//! record the executor can act on. It is an ordered chain of steps, each a
//! function of the current record returning success, a terminating error,
//! or (for one known-flaky collaborator) a retry. The record is persisted
//! between any two steps so a restart resumes observably.
//!
//! Deterministic helpers live alongside the steps: successor naming for
//! ASGs and launch configurations, user-data assembly with the embedded
//! hash marker, and block-device mapping synthesis.

pub mod blockdevices;
pub mod context;
pub mod error;
pub mod naming;
pub mod runner;
pub mod steps;
pub mod userdata;

pub use context::Services;
pub use error::{ErrorKind, PipelineError};
pub use runner::{PreparationOutcome, PreparationRunner};
pub use steps::{Step, StepOutcome};
