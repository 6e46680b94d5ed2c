//! Collaborator bundle the preparation steps run against

use maestro_cloud::{AsgardClient, OnixClient, ShuppetClient, TyranitarClient};
use std::sync::Arc;

/// Handles to every external collaborator preparation consults.
#[derive(Clone)]
pub struct Services {
    pub asgard: Arc<dyn AsgardClient>,
    pub onix: Arc<dyn OnixClient>,
    pub tyranitar: Arc<dyn TyranitarClient>,
    pub shuppet: Arc<dyn ShuppetClient>,
}

impl Services {
    pub fn new(
        asgard: Arc<dyn AsgardClient>,
        onix: Arc<dyn OnixClient>,
        tyranitar: Arc<dyn TyranitarClient>,
        shuppet: Arc<dyn ShuppetClient>,
    ) -> Self {
        Self {
            asgard,
            onix,
            tyranitar,
            shuppet,
        }
    }
}
