//! Server wiring
//!
//! Builds the HTTP collaborators from configuration, assembles the store,
//! registry, pipeline, executor and control plane, and serves the REST API
//! until shutdown.

use crate::api::rest::{create_router, AppState};
use crate::config::DaemonConfig;
use crate::error::{DaemonError, DaemonResult};
use maestro_cloud::http::{
    HttpAsgardClient, HttpInstanceHealthClient, HttpOnixClient, HttpShuppetClient,
    HttpTyranitarClient,
};
use maestro_cloud::OnixClient;
use maestro_control::ControlPlane;
use maestro_engine::TaskExecutor;
use maestro_pipeline::{PreparationRunner, Services};
use maestro_store::{InMemoryDeploymentStore, InMemoryRegistry};
use std::sync::Arc;
use tracing::info;

pub struct Server {
    config: DaemonConfig,
    state: AppState,
}

impl Server {
    pub fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let asgard = Arc::new(
            HttpAsgardClient::new(config.collaborators.asgard.clone())
                .map_err(|e| DaemonError::Collaborator(e.to_string()))?,
        );
        let onix: Arc<dyn OnixClient> = Arc::new(
            HttpOnixClient::new(config.collaborators.onix_url.clone())
                .map_err(|e| DaemonError::Collaborator(e.to_string()))?,
        );
        let tyranitar = Arc::new(
            HttpTyranitarClient::new(config.collaborators.tyranitar_url.clone())
                .map_err(|e| DaemonError::Collaborator(e.to_string()))?,
        );
        let shuppet = Arc::new(
            HttpShuppetClient::new(config.collaborators.shuppet_url.clone())
                .map_err(|e| DaemonError::Collaborator(e.to_string()))?,
        );
        let health = Arc::new(
            HttpInstanceHealthClient::new()
                .map_err(|e| DaemonError::Collaborator(e.to_string()))?,
        );

        let store = Arc::new(InMemoryDeploymentStore::new());
        let registry = Arc::new(InMemoryRegistry::new());
        let services = Services::new(asgard.clone(), onix.clone(), tyranitar, shuppet);
        let runner = Arc::new(PreparationRunner::new(services, store.clone()));
        let executor = TaskExecutor::new(
            store.clone(),
            registry.clone(),
            asgard,
            health,
            config.engine_config(),
        );

        // surface engine events in the daemon log
        let mut events = executor.subscribe();
        tokio::spawn(async move {
            while let Ok(envelope) = events.recv().await {
                info!(source = ?envelope.source, event = ?envelope.event, "Deployment event");
            }
        });

        let control = Arc::new(ControlPlane::new(
            store.clone(),
            registry,
            runner,
            executor,
        ));
        let mut control_events = control.subscribe();
        tokio::spawn(async move {
            while let Ok(envelope) = control_events.recv().await {
                info!(source = ?envelope.source, event = ?envelope.event, "Deployment event");
            }
        });
        let state = AppState::new(control, store, onix, config.defaults.region.clone());

        Ok(Self { config, state })
    }

    /// Serve the REST API until ctrl-c.
    pub async fn run(self) -> DaemonResult<()> {
        let router = create_router(self.state);
        let listener = tokio::net::TcpListener::bind(self.config.server.listen_addr).await?;
        info!(addr = %self.config.server.listen_addr, "Maestro listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("Shutting down");
            })
            .await?;
        Ok(())
    }
}
