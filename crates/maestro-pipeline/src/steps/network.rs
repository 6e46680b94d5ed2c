//! Security groups, load balancers, subnets and zones

use super::{StepResult, Verdict};
use crate::context::Services;
use crate::error::{ErrorKind, PipelineError};
use maestro_cloud::AsgardClient;
use maestro_types::Deployment;

/// Security groups every instance carries, regardless of what the
/// deployment parameters ask for.
const REQUIRED_SECURITY_GROUPS: [&str; 2] = ["healthcheck", "nrpe"];

pub(crate) fn add_required_security_groups(deployment: &mut Deployment) -> StepResult {
    let mut params = deployment.params();
    for required in REQUIRED_SECURITY_GROUPS {
        if !params.selected_security_groups.iter().any(|g| g == required) {
            params.selected_security_groups.push(required.to_string());
        }
    }
    deployment.new_state.tyranitar.deployment_params = Some(params);
    Ok(Verdict::Continue)
}

pub(crate) async fn map_security_group_ids(
    services: &Services,
    deployment: &mut Deployment,
) -> StepResult {
    let known = services.asgard.security_groups(&deployment.region).await?;
    let mut ids = Vec::new();
    let mut unresolved = Vec::new();
    for requested in deployment.params().selected_security_groups {
        if requested.starts_with("sg-") {
            ids.push(requested);
            continue;
        }
        match known.iter().find(|group| group.name == requested) {
            Some(group) => ids.push(group.id.clone()),
            None => unresolved.push(requested),
        }
    }
    if !unresolved.is_empty() {
        return Err(PipelineError::with_details(
            ErrorKind::UnknownSecurityGroups,
            format!("Unknown security groups: {}", unresolved.join(", ")),
            serde_json::json!(unresolved),
        ));
    }
    deployment.new_state.selected_security_group_ids = ids;
    Ok(Verdict::Continue)
}

pub(crate) async fn verify_load_balancers(
    services: &Services,
    deployment: &mut Deployment,
) -> StepResult {
    let requested = deployment.params().selected_load_balancers;
    if !requested.is_empty() {
        let mut missing = Vec::new();
        for name in &requested {
            if services
                .asgard
                .load_balancer(&deployment.region, name)
                .await?
                .is_none()
            {
                missing.push(name.clone());
            }
        }
        if !missing.is_empty() {
            return Err(PipelineError::with_details(
                ErrorKind::MissingLoadBalancers,
                format!("Load balancers not found: {}", missing.join(", ")),
                serde_json::json!(missing),
            ));
        }
    }

    // drop load balancers that no longer exist from the previous state, so
    // disabling the predecessor does not trip over them
    if let Some(previous) = deployment.previous_state.clone() {
        let mut surviving = Vec::new();
        for name in &previous.selected_load_balancers {
            if services
                .asgard
                .load_balancer(&deployment.region, name)
                .await?
                .is_some()
            {
                surviving.push(name.clone());
            }
        }
        if let Some(previous) = deployment.previous_state.as_mut() {
            previous.selected_load_balancers = surviving;
        }
    }
    Ok(Verdict::Continue)
}

pub(crate) async fn populate_subnets(
    services: &Services,
    deployment: &mut Deployment,
) -> StepResult {
    let params = deployment.params();
    let purpose = params.subnet_purpose;
    let subnets: Vec<_> = services
        .asgard
        .subnets(&deployment.region)
        .await?
        .into_iter()
        .filter(|subnet| subnet.purpose == purpose)
        .collect();
    if subnets.is_empty() {
        return Err(PipelineError::new(
            ErrorKind::NoSubnets,
            format!("No subnets with purpose {purpose} in {}", deployment.region),
        ));
    }

    let mut selected = Vec::new();
    let mut unmatched_zones = Vec::new();
    for zone in &params.selected_zones {
        let availability_zone = format!("{}{zone}", deployment.region);
        let matching: Vec<_> = subnets
            .iter()
            .filter(|subnet| subnet.availability_zone == availability_zone)
            .collect();
        if matching.is_empty() {
            unmatched_zones.push(zone.clone());
        } else {
            selected.extend(matching.iter().map(|subnet| subnet.id.clone()));
        }
    }
    if !unmatched_zones.is_empty() {
        return Err(PipelineError::with_details(
            ErrorKind::NoMatchingZones,
            format!(
                "No {purpose} subnets in zones: {}",
                unmatched_zones.join(", ")
            ),
            serde_json::json!(unmatched_zones),
        ));
    }

    if let Some(vpc_id) = subnets.first().map(|subnet| subnet.vpc_id.clone()) {
        deployment
            .parameters
            .insert("vpc-id".to_string(), serde_json::json!(vpc_id));
    }
    deployment.new_state.selected_subnets = selected;
    Ok(Verdict::Continue)
}

pub(crate) fn populate_vpc_zone_identifier(deployment: &mut Deployment) -> StepResult {
    deployment.new_state.vpc_zone_identifier =
        Some(deployment.new_state.selected_subnets.join(","));
    Ok(Verdict::Continue)
}

pub(crate) fn populate_availability_zones(deployment: &mut Deployment) -> StepResult {
    let region = deployment.region.clone();
    deployment.new_state.availability_zones = deployment
        .params()
        .selected_zones
        .iter()
        .map(|zone| format!("{region}{zone}"))
        .collect();
    Ok(Verdict::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::test_support::{deployment, services};
    use maestro_types::DeploymentParams;

    fn with_security_groups(dep: &mut Deployment, groups: &[&str]) {
        dep.new_state.tyranitar.deployment_params = Some(DeploymentParams {
            selected_security_groups: groups.iter().map(|g| g.to_string()).collect(),
            ..Default::default()
        });
    }

    #[test]
    fn test_required_groups_are_appended_idempotently() {
        let mut dep = deployment();
        with_security_groups(&mut dep, &["web", "healthcheck"]);
        add_required_security_groups(&mut dep).unwrap();
        add_required_security_groups(&mut dep).unwrap();
        assert_eq!(
            dep.params().selected_security_groups,
            vec!["web", "healthcheck", "nrpe"]
        );
    }

    #[tokio::test]
    async fn test_unknown_security_group_fails_with_the_full_list() {
        let (services, fakes) = services();
        fakes.asgard.seed_security_group("sg-1", "web");
        let mut dep = deployment();
        with_security_groups(&mut dep, &["web", "nogroup"]);

        let error = map_security_group_ids(&services, &mut dep)
            .await
            .err()
            .unwrap();
        assert_eq!(error.kind, ErrorKind::UnknownSecurityGroups);
        assert_eq!(error.details, Some(serde_json::json!(["nogroup"])));
    }

    #[tokio::test]
    async fn test_sg_ids_pass_through_unresolved() {
        let (services, fakes) = services();
        fakes.asgard.seed_security_group("sg-1", "web");
        let mut dep = deployment();
        with_security_groups(&mut dep, &["web", "sg-already"]);

        map_security_group_ids(&services, &mut dep).await.unwrap();
        assert_eq!(
            dep.new_state.selected_security_group_ids,
            vec!["sg-1", "sg-already"]
        );
    }

    #[tokio::test]
    async fn test_missing_load_balancer_is_named() {
        let (services, fakes) = services();
        fakes.asgard.seed_load_balancer("search-frontend", None);
        let mut dep = deployment();
        dep.new_state.tyranitar.deployment_params = Some(DeploymentParams {
            selected_load_balancers: vec![
                "search-frontend".to_string(),
                "gone".to_string(),
            ],
            ..Default::default()
        });

        let error = verify_load_balancers(&services, &mut dep).await.err().unwrap();
        assert_eq!(error.kind, ErrorKind::MissingLoadBalancers);
        assert_eq!(error.details, Some(serde_json::json!(["gone"])));
    }

    #[tokio::test]
    async fn test_deleted_previous_load_balancers_are_pruned() {
        let (services, fakes) = services();
        fakes.asgard.seed_load_balancer("still-there", None);
        let mut dep = deployment();
        let mut previous = maestro_types::StateSnapshot::default();
        previous.selected_load_balancers =
            vec!["still-there".to_string(), "long-gone".to_string()];
        dep.previous_state = Some(previous);

        verify_load_balancers(&services, &mut dep).await.unwrap();
        assert_eq!(
            dep.previous_state.unwrap().selected_load_balancers,
            vec!["still-there"]
        );
    }

    #[tokio::test]
    async fn test_subnets_selected_by_purpose_and_zone() {
        let (services, fakes) = services();
        fakes.asgard.seed_subnet("subnet-a", "eu-west-1a", "internal", "vpc-1");
        fakes.asgard.seed_subnet("subnet-b", "eu-west-1b", "internal", "vpc-1");
        fakes.asgard.seed_subnet("subnet-x", "eu-west-1a", "external", "vpc-1");
        let mut dep = deployment();
        dep.new_state.tyranitar.deployment_params = Some(DeploymentParams::default());

        populate_subnets(&services, &mut dep).await.unwrap();
        assert_eq!(dep.new_state.selected_subnets, vec!["subnet-a", "subnet-b"]);
        assert_eq!(dep.parameters.get("vpc-id"), Some(&serde_json::json!("vpc-1")));

        populate_vpc_zone_identifier(&mut dep).unwrap();
        assert_eq!(
            dep.new_state.vpc_zone_identifier.as_deref(),
            Some("subnet-a,subnet-b")
        );
    }

    #[tokio::test]
    async fn test_zone_without_subnet_fails() {
        let (services, fakes) = services();
        fakes.asgard.seed_subnet("subnet-a", "eu-west-1a", "internal", "vpc-1");
        let mut dep = deployment();
        dep.new_state.tyranitar.deployment_params = Some(DeploymentParams::default());

        let error = populate_subnets(&services, &mut dep).await.err().unwrap();
        assert_eq!(error.kind, ErrorKind::NoMatchingZones);
        assert_eq!(error.details, Some(serde_json::json!(["b"])));
    }

    #[tokio::test]
    async fn test_no_subnets_for_purpose_fails() {
        let (services, _fakes) = services();
        let mut dep = deployment();
        let error = populate_subnets(&services, &mut dep).await.err().unwrap();
        assert_eq!(error.kind, ErrorKind::NoSubnets);
    }

    #[test]
    fn test_availability_zones_are_region_prefixed() {
        let mut dep = deployment();
        populate_availability_zones(&mut dep).unwrap();
        assert_eq!(
            dep.new_state.availability_zones,
            vec!["eu-west-1a", "eu-west-1b"]
        );
    }
}
