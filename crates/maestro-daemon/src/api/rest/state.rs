//! Shared API state

use chrono::{DateTime, Utc};
use maestro_cloud::OnixClient;
use maestro_control::ControlPlane;
use maestro_store::DeploymentStore;
use std::sync::Arc;

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub control: Arc<ControlPlane>,
    pub store: Arc<dyn DeploymentStore>,
    pub onix: Arc<dyn OnixClient>,
    /// Region used when a deployment request names none.
    pub default_region: String,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        control: Arc<ControlPlane>,
        store: Arc<dyn DeploymentStore>,
        onix: Arc<dyn OnixClient>,
        default_region: String,
    ) -> Self {
        Self {
            control,
            store,
            onix,
            default_region,
            started_at: Utc::now(),
        }
    }
}
