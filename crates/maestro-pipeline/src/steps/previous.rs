//! Predecessor capture
//!
//! When a last ASG exists for the triple, its configuration is captured
//! into `previous_state` so the executor can disable and delete it, and so
//! undo can swap orientations. The predecessor's configuration hash is
//! recovered from the hash marker in its base64-encoded user-data.

use super::{StepResult, Verdict};
use crate::context::Services;
use crate::userdata;
use maestro_cloud::{AsgardClient, TyranitarClient};
use maestro_types::{Deployment, DeploymentParams, ImageDetails, StateSnapshot};

use super::image::parse_image_name;

pub(crate) async fn populate_previous_state(
    services: &Services,
    deployment: &mut Deployment,
) -> StepResult {
    let summary = services
        .asgard
        .last_auto_scaling_group(
            &deployment.region,
            &deployment.application,
            &deployment.environment,
        )
        .await?;
    let Some(summary) = summary else {
        return Ok(Verdict::Continue);
    };

    let launch_configuration = services
        .asgard
        .launch_configuration(&deployment.region, &summary.launch_configuration_name)
        .await?;

    let mut previous = StateSnapshot {
        auto_scaling_group_name: Some(summary.auto_scaling_group_name.clone()),
        launch_configuration_name: Some(summary.launch_configuration_name.clone()),
        selected_load_balancers: summary.load_balancer_names.clone(),
        ..Default::default()
    };
    previous.tyranitar.deployment_params = Some(DeploymentParams {
        min: summary.min,
        max: summary.max,
        desired_capacity: summary.desired_capacity,
        health_check_type: summary.health_check_type.clone(),
        selected_load_balancers: summary.load_balancer_names.clone(),
        ..Default::default()
    });

    if let Some(lc) = launch_configuration {
        previous.image_details = Some(ImageDetails::from_id(&lc.image_id));
        if let Some(user_data) = &lc.user_data {
            previous.hash = userdata::extract_hash(user_data);
            previous.user_data = Some(user_data.clone());
        }
    }

    deployment.previous_state = Some(previous);
    Ok(Verdict::Continue)
}

pub(crate) async fn populate_previous_application_properties(
    services: &Services,
    deployment: &mut Deployment,
) -> StepResult {
    // silently skipped when there is no previous state or no recovered hash
    let Some(hash) = deployment
        .previous_state
        .as_ref()
        .and_then(|previous| previous.hash.clone())
    else {
        return Ok(Verdict::Continue);
    };
    let properties = services
        .tyranitar
        .application_properties(&deployment.environment, &deployment.application, &hash)
        .await?;
    if let (Some(previous), Some(document)) = (deployment.previous_state.as_mut(), properties) {
        previous.tyranitar.application_properties = Some(document);
    }
    Ok(Verdict::Continue)
}

pub(crate) async fn get_previous_image_details(
    services: &Services,
    deployment: &mut Deployment,
) -> StepResult {
    let Some(image_id) = deployment
        .previous_state
        .as_ref()
        .and_then(|previous| previous.image_details.as_ref())
        .map(|details| details.id.clone())
    else {
        return Ok(Verdict::Continue);
    };
    let image = services.asgard.image(&deployment.region, &image_id).await?;
    if let (Some(previous), Some(image)) = (deployment.previous_state.as_mut(), image) {
        let parsed = parse_image_name(&image.name);
        previous.image_details = Some(ImageDetails {
            id: image.id,
            name: Some(image.name.clone()),
            application: parsed.as_ref().map(|(application, _)| application.clone()),
            version: parsed.map(|(_, version)| version),
            virt_type: super::image::parse_virtualisation(&image.virtualization_type),
        });
    }
    Ok(Verdict::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::test_support::{deployment, services};
    use maestro_cloud::{AsgSummary, LaunchConfiguration};

    fn seed_predecessor(fakes: &crate::steps::test_support::Fakes, user_data: Option<String>) {
        fakes.asgard.seed_cluster(
            "search",
            "poke",
            AsgSummary {
                auto_scaling_group_name: "search-poke-v023".to_string(),
                min: 1,
                max: 2,
                desired_capacity: 2,
                health_check_type: "ELB".to_string(),
                load_balancer_names: vec!["search-frontend".to_string()],
                launch_configuration_name: "search-poke-v023-20140101000000".to_string(),
            },
            LaunchConfiguration {
                name: "search-poke-v023-20140101000000".to_string(),
                image_id: "ami-000".to_string(),
                instance_type: "t1.micro".to_string(),
                security_groups: vec![],
                user_data,
            },
        );
    }

    #[tokio::test]
    async fn test_no_predecessor_leaves_previous_state_unset() {
        let (services, _fakes) = services();
        let mut dep = deployment();
        populate_previous_state(&services, &mut dep).await.unwrap();
        assert!(dep.previous_state.is_none());
    }

    #[tokio::test]
    async fn test_predecessor_captured_with_hash() {
        let (services, fakes) = services();
        let user_data = userdata::encode("#!/bin/bash\nexport HASH=old-hash\n");
        seed_predecessor(&fakes, Some(user_data));

        let mut dep = deployment();
        populate_previous_state(&services, &mut dep).await.unwrap();

        let previous = dep.previous_state.unwrap();
        assert_eq!(
            previous.auto_scaling_group_name.as_deref(),
            Some("search-poke-v023")
        );
        assert_eq!(previous.hash.as_deref(), Some("old-hash"));
        assert_eq!(previous.selected_load_balancers, vec!["search-frontend"]);
        let params = previous.tyranitar.deployment_params.unwrap();
        assert_eq!(params.desired_capacity, 2);
        assert_eq!(params.health_check_type, "ELB");
    }

    #[tokio::test]
    async fn test_previous_image_details_filled_in() {
        let (services, fakes) = services();
        seed_predecessor(&fakes, None);
        fakes.asgard.seed_image("ami-000", "search-1.3.0", "paravirtual");

        let mut dep = deployment();
        populate_previous_state(&services, &mut dep).await.unwrap();
        get_previous_image_details(&services, &mut dep).await.unwrap();

        let details = dep.previous_state.unwrap().image_details.unwrap();
        assert_eq!(details.version.as_deref(), Some("1.3.0"));
        assert_eq!(details.application.as_deref(), Some("search"));
    }
}
