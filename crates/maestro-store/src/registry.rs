//! Coordination registry
//!
//! Holds the process-wide coordination state: the global lock flag, the
//! in-progress slots enforcing at-most-one deployment per
//! (application, environment, region), and the pause flags. All writes use
//! compare-and-set semantics so two concurrent `begin` calls for the same
//! triple cannot both win.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use maestro_types::DeploymentId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// The key a deployment occupies while in flight.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub application: String,
    pub environment: String,
    pub region: String,
}

impl Triple {
    pub fn new(
        application: impl Into<String>,
        environment: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            application: application.into(),
            environment: environment.into(),
            region: region.into(),
        }
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.application, self.environment, self.region)
    }
}

/// Shared coordination state for the control plane and the executor.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Set the global lock. While locked, new work is refused.
    async fn lock(&self);

    /// Clear the global lock.
    async fn unlock(&self);

    async fn is_locked(&self) -> bool;

    /// Claim the in-progress slot for a triple. Returns false when another
    /// deployment already holds it.
    async fn acquire_in_progress(&self, triple: &Triple, deployment_id: &DeploymentId) -> bool;

    /// Release the slot. A no-op when the triple holds nothing.
    async fn release_in_progress(&self, triple: &Triple);

    /// All triples currently owning a deployment.
    async fn in_progress(&self) -> Vec<(Triple, DeploymentId)>;

    /// Flag a triple so the executor suspends at the next task boundary.
    async fn register_pause(&self, triple: &Triple);

    /// Clear a pause flag that has not been honoured yet.
    async fn unregister_pause(&self, triple: &Triple);

    /// Whether a pause is registered but not yet honoured.
    async fn awaiting_pause(&self, triple: &Triple) -> bool;

    async fn awaiting_pause_list(&self) -> Vec<Triple>;

    /// Record that the executor honoured the pause flag; moves the triple
    /// from awaiting to paused.
    async fn mark_paused(&self, triple: &Triple);

    /// Clear the paused marker on resume.
    async fn clear_paused(&self, triple: &Triple);

    async fn is_paused(&self, triple: &Triple) -> bool;

    async fn paused_list(&self) -> Vec<Triple>;
}

/// In-memory registry for development and testing.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    locked: AtomicBool,
    in_progress: DashMap<Triple, DeploymentId>,
    awaiting_pause: DashSet<Triple>,
    paused: DashSet<Triple>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn lock(&self) {
        self.locked.store(true, Ordering::SeqCst);
    }

    async fn unlock(&self) {
        self.locked.store(false, Ordering::SeqCst);
    }

    async fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    async fn acquire_in_progress(&self, triple: &Triple, deployment_id: &DeploymentId) -> bool {
        // entry() gives us the CAS: first writer wins, the loser sees the
        // occupied entry and backs off
        let entry = self.in_progress.entry(triple.clone());
        match entry {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(deployment_id.clone());
                true
            }
        }
    }

    async fn release_in_progress(&self, triple: &Triple) {
        self.in_progress.remove(triple);
    }

    async fn in_progress(&self) -> Vec<(Triple, DeploymentId)> {
        self.in_progress
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }

    async fn register_pause(&self, triple: &Triple) {
        self.awaiting_pause.insert(triple.clone());
    }

    async fn unregister_pause(&self, triple: &Triple) {
        self.awaiting_pause.remove(triple);
    }

    async fn awaiting_pause(&self, triple: &Triple) -> bool {
        self.awaiting_pause.contains(triple)
    }

    async fn awaiting_pause_list(&self) -> Vec<Triple> {
        self.awaiting_pause.iter().map(|r| r.key().clone()).collect()
    }

    async fn mark_paused(&self, triple: &Triple) {
        self.awaiting_pause.remove(triple);
        self.paused.insert(triple.clone());
    }

    async fn clear_paused(&self, triple: &Triple) {
        self.paused.remove(triple);
    }

    async fn is_paused(&self, triple: &Triple) -> bool {
        self.paused.contains(triple)
    }

    async fn paused_list(&self) -> Vec<Triple> {
        self.paused.iter().map(|r| r.key().clone()).collect()
    }
}
