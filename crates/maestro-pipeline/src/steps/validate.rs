//! Request validation, metadata and governance checks

use super::{StepResult, Verdict};
use crate::context::Services;
use crate::error::{ErrorKind, PipelineError};
use maestro_cloud::{CloudError, OnixClient, ShuppetClient};
use maestro_types::{Deployment, Phase};

/// Environments whose deployments must pass the policy-configuration
/// check.
const GOVERNED_ENVIRONMENTS: [&str; 2] = ["poke", "prod"];

pub(crate) fn start_deployment_preparation(deployment: &mut Deployment) -> StepResult {
    deployment.phase = Phase::Preparation;
    Ok(Verdict::Continue)
}

fn require(value: &str, field: &str) -> StepResult {
    if value.trim().is_empty() {
        Err(PipelineError::missing_field(field))
    } else {
        Ok(Verdict::Continue)
    }
}

pub(crate) fn validate_region(deployment: &mut Deployment) -> StepResult {
    require(&deployment.region, "region")
}

pub(crate) fn validate_environment(deployment: &mut Deployment) -> StepResult {
    require(&deployment.environment, "environment")
}

pub(crate) fn validate_application(deployment: &mut Deployment) -> StepResult {
    require(&deployment.application, "application")
}

pub(crate) fn validate_user(deployment: &mut Deployment) -> StepResult {
    require(&deployment.user, "user")
}

pub(crate) fn validate_image(deployment: &mut Deployment) -> StepResult {
    match &deployment.new_state.image_details {
        Some(details) if !details.id.trim().is_empty() => Ok(Verdict::Continue),
        _ => Err(PipelineError::missing_field("image")),
    }
}

pub(crate) fn validate_message(deployment: &mut Deployment) -> StepResult {
    require(&deployment.message, "message")
}

pub(crate) async fn get_metadata(
    services: &Services,
    deployment: &mut Deployment,
) -> StepResult {
    let application = services.onix.application(&deployment.application).await?;
    match application {
        Some(application) => {
            deployment.new_state.onix = Some(application.metadata);
            Ok(Verdict::Continue)
        }
        None => Err(PipelineError::new(
            ErrorKind::UpstreamNotFound,
            format!("Application {} is not registered", deployment.application),
        )),
    }
}

pub(crate) fn check_contact_property(deployment: &mut Deployment) -> StepResult {
    let contact = deployment
        .new_state
        .onix
        .as_ref()
        .and_then(|metadata| metadata.contact.as_deref());
    match contact {
        Some(contact) if !contact.trim().is_empty() => Ok(Verdict::Continue),
        _ => Err(PipelineError::missing_field("contact")),
    }
}

pub(crate) async fn check_configuration(
    services: &Services,
    deployment: &mut Deployment,
) -> StepResult {
    if !GOVERNED_ENVIRONMENTS.contains(&deployment.environment.as_str()) {
        return Ok(Verdict::Continue);
    }
    match services
        .shuppet
        .configuration(&deployment.environment, &deployment.application)
        .await
    {
        Ok(Some(_)) => Ok(Verdict::Continue),
        Ok(None) => Err(PipelineError::new(
            ErrorKind::ConfigurationMissing,
            format!(
                "No policy configuration for {} in {}",
                deployment.application, deployment.environment
            ),
        )),
        Err(CloudError::UnexpectedResponse { message, .. }) => Ok(Verdict::Retry(format!(
            "Policy configuration could not be parsed: {message}"
        ))),
        Err(error) => Err(error.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::test_support::{deployment, services};
    use maestro_cloud::fake::FakeShuppet;
    use maestro_types::OnixMetadata;
    use std::sync::Arc;

    #[test]
    fn test_validation_names_the_missing_field() {
        let mut dep = deployment();
        dep.user = String::new();
        let error = validate_user(&mut dep).err().unwrap();
        assert_eq!(error.kind, ErrorKind::MissingField);
        assert!(error.message.contains("user"));
    }

    #[test]
    fn test_validate_image_requires_an_id() {
        let mut dep = deployment();
        dep.new_state.image_details = None;
        assert!(validate_image(&mut dep).is_err());
    }

    #[tokio::test]
    async fn test_get_metadata_populates_onix() {
        let (services, fakes) = services();
        fakes.onix.seed_application(
            "search",
            OnixMetadata {
                owner: Some("search-team".to_string()),
                contact: Some("search@example.com".to_string()),
                email: Some("search@example.com".to_string()),
            },
        );
        let mut dep = deployment();
        get_metadata(&services, &mut dep).await.unwrap();
        assert_eq!(
            dep.new_state.onix.as_ref().unwrap().contact.as_deref(),
            Some("search@example.com")
        );
    }

    #[tokio::test]
    async fn test_get_metadata_errors_for_unknown_application() {
        let (services, _fakes) = services();
        let mut dep = deployment();
        let error = get_metadata(&services, &mut dep).await.err().unwrap();
        assert_eq!(error.kind, ErrorKind::UpstreamNotFound);
    }

    #[test]
    fn test_contact_is_required() {
        let mut dep = deployment();
        dep.new_state.onix = Some(OnixMetadata::default());
        assert!(check_contact_property(&mut dep).is_err());
    }

    #[tokio::test]
    async fn test_check_configuration_skips_ungoverned_environments() {
        let (mut services, _fakes) = services();
        // a shuppet that always faults proves it is never consulted
        let shuppet = Arc::new(FakeShuppet::new());
        shuppet.script(Err(CloudError::http("shuppet", "boom")));
        services.shuppet = shuppet;
        let mut dep = deployment();
        dep.environment = "dev".to_string();
        assert!(matches!(
            check_configuration(&services, &mut dep).await,
            Ok(Verdict::Continue)
        ));
    }

    #[tokio::test]
    async fn test_check_configuration_retries_on_parse_fault() {
        let (mut services, _fakes) = services();
        let shuppet = Arc::new(FakeShuppet::new());
        shuppet.script(Err(CloudError::UnexpectedResponse {
            service: "shuppet".to_string(),
            message: "truncated body".to_string(),
        }));
        services.shuppet = shuppet;
        let mut dep = deployment();
        dep.environment = "prod".to_string();
        assert!(matches!(
            check_configuration(&services, &mut dep).await,
            Ok(Verdict::Retry(_))
        ));
    }

    #[tokio::test]
    async fn test_check_configuration_errors_on_definite_absence() {
        let (mut services, _fakes) = services();
        let shuppet = Arc::new(FakeShuppet::new());
        shuppet.script(Ok(None));
        services.shuppet = shuppet;
        let mut dep = deployment();
        dep.environment = "prod".to_string();
        let error = check_configuration(&services, &mut dep).await.err().unwrap();
        assert_eq!(error.kind, ErrorKind::ConfigurationMissing);
    }
}
