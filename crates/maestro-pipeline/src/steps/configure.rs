//! Configuration-service steps: hash resolution and document fetches

use super::{StepResult, Verdict};
use crate::context::Services;
use crate::error::{ErrorKind, PipelineError};
use maestro_cloud::TyranitarClient;
use maestro_types::{Deployment, DeploymentParams};

/// Key under which the raw deployment-params document is parked between
/// the fetch step and populate-defaults.
const RAW_PARAMS_KEY: &str = "deployment-params-document";

fn required_hash(deployment: &Deployment) -> Result<String, PipelineError> {
    deployment
        .new_state
        .hash
        .clone()
        .ok_or_else(|| PipelineError::missing_field("hash"))
}

pub(crate) async fn ensure_hash(services: &Services, deployment: &mut Deployment) -> StepResult {
    if deployment.new_state.hash.is_some() {
        return Ok(Verdict::Continue);
    }
    let latest = services
        .tyranitar
        .latest_hash(&deployment.environment, &deployment.application)
        .await?;
    match latest {
        Some(hash) => {
            deployment.new_state.hash = Some(hash);
            Ok(Verdict::Continue)
        }
        None => Err(PipelineError::new(
            ErrorKind::UpstreamNotFound,
            format!(
                "No configuration exists for {} in {}",
                deployment.application, deployment.environment
            ),
        )),
    }
}

pub(crate) async fn verify_hash(services: &Services, deployment: &mut Deployment) -> StepResult {
    let hash = required_hash(deployment)?;
    let known = services
        .tyranitar
        .hash_exists(&deployment.environment, &deployment.application, &hash)
        .await?;
    if known {
        Ok(Verdict::Continue)
    } else {
        Err(PipelineError::new(
            ErrorKind::UpstreamNotFound,
            format!(
                "Hash {hash} is not known for {} in {}",
                deployment.application, deployment.environment
            ),
        ))
    }
}

pub(crate) async fn get_application_properties(
    services: &Services,
    deployment: &mut Deployment,
) -> StepResult {
    let hash = required_hash(deployment)?;
    let properties = services
        .tyranitar
        .application_properties(&deployment.environment, &deployment.application, &hash)
        .await?;
    match properties {
        Some(document) => {
            deployment.new_state.tyranitar.application_properties = Some(document);
            Ok(Verdict::Continue)
        }
        None => Err(PipelineError::new(
            ErrorKind::UpstreamNotFound,
            format!("No application-properties at {hash}"),
        )),
    }
}

pub(crate) async fn get_deployment_params(
    services: &Services,
    deployment: &mut Deployment,
) -> StepResult {
    let hash = required_hash(deployment)?;
    let document = services
        .tyranitar
        .deployment_params(&deployment.environment, &deployment.application, &hash)
        .await?;
    match document {
        Some(document) => {
            deployment
                .parameters
                .insert(RAW_PARAMS_KEY.to_string(), document);
            Ok(Verdict::Continue)
        }
        None => Err(PipelineError::new(
            ErrorKind::UpstreamNotFound,
            format!("No deployment-params at {hash}"),
        )),
    }
}

pub(crate) async fn get_launch_data(
    services: &Services,
    deployment: &mut Deployment,
) -> StepResult {
    let hash = required_hash(deployment)?;
    let launch_data = services
        .tyranitar
        .launch_data(&deployment.environment, &deployment.application, &hash)
        .await?;
    match launch_data {
        Some(lines) => {
            deployment.new_state.tyranitar.launch_data = Some(lines);
            Ok(Verdict::Continue)
        }
        None => Err(PipelineError::new(
            ErrorKind::UpstreamNotFound,
            format!("No launch-data at {hash}"),
        )),
    }
}

pub(crate) fn populate_defaults(deployment: &mut Deployment) -> StepResult {
    let document = deployment
        .parameters
        .remove(RAW_PARAMS_KEY)
        .unwrap_or_else(|| serde_json::json!({}));
    let params = DeploymentParams::from_document(&document).map_err(|error| {
        PipelineError::new(
            ErrorKind::UpstreamFault,
            format!("Invalid deployment-params document: {error}"),
        )
    })?;
    deployment.new_state.selected_load_balancers = params.selected_load_balancers.clone();
    deployment.new_state.tyranitar.deployment_params = Some(params);
    Ok(Verdict::Continue)
}
