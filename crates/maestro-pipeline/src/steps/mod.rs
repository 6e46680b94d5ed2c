//! The ordered preparation steps
//!
//! Each step is a function of the current deployment record. Steps may
//! succeed, terminate the deployment with a classified error, or (only for
//! the policy-configuration check) ask to be retried. The runner persists
//! the record between any two steps.

mod configure;
mod image;
mod launch;
mod network;
mod previous;
mod validate;

#[cfg(test)]
pub(crate) mod test_support {
    use crate::context::Services;
    use maestro_cloud::fake::{FakeAsgard, FakeOnix, FakeShuppet, FakeTyranitar};
    use maestro_types::{Deployment, ImageDetails};
    use std::sync::Arc;

    pub(crate) struct Fakes {
        pub asgard: Arc<FakeAsgard>,
        pub onix: Arc<FakeOnix>,
        pub tyranitar: Arc<FakeTyranitar>,
        pub shuppet: Arc<FakeShuppet>,
    }

    pub(crate) fn services() -> (Services, Fakes) {
        let fakes = Fakes {
            asgard: Arc::new(FakeAsgard::new()),
            onix: Arc::new(FakeOnix::new()),
            tyranitar: Arc::new(FakeTyranitar::new()),
            shuppet: Arc::new(FakeShuppet::new()),
        };
        let services = Services::new(
            fakes.asgard.clone(),
            fakes.onix.clone(),
            fakes.tyranitar.clone(),
            fakes.shuppet.clone(),
        );
        (services, fakes)
    }

    pub(crate) fn deployment() -> Deployment {
        let mut dep = Deployment::skeleton("search", "poke", "eu-west-1", "alice", "initial");
        dep.new_state.image_details = Some(ImageDetails::from_id("ami-123"));
        dep
    }
}

use crate::context::Services;
use crate::error::PipelineError;
use maestro_types::Deployment;

/// What a step asks the runner to do next.
#[derive(Debug)]
pub enum StepOutcome {
    /// Continue with the updated record.
    Success,
    /// Requeue the same step after a backoff.
    Retry(String),
    /// Terminate the deployment as failed.
    Error(PipelineError),
}

/// Internal verdict steps return; errors flow through `?`.
pub(crate) enum Verdict {
    Continue,
    Retry(String),
}

pub(crate) type StepResult = Result<Verdict, PipelineError>;

/// One step of the preparation pipeline, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    StartDeploymentPreparation,
    ValidateRegion,
    ValidateEnvironment,
    ValidateApplication,
    ValidateUser,
    ValidateImage,
    ValidateMessage,
    GetMetadata,
    EnsureHash,
    VerifyHash,
    GetApplicationProperties,
    GetDeploymentParams,
    GetLaunchData,
    PopulateDefaults,
    PopulatePreviousState,
    PopulatePreviousApplicationProperties,
    GetPreviousImageDetails,
    CreateNames,
    GetImageDetails,
    VerifyImage,
    CheckInstanceTypeCompatibility,
    CheckContactProperty,
    CheckConfiguration,
    AddRequiredSecurityGroups,
    MapSecurityGroupIds,
    VerifyLoadBalancers,
    PopulateSubnets,
    PopulateVpcZoneIdentifier,
    PopulateAvailabilityZones,
    PopulateTerminationPolicies,
    CreateBlockDeviceMappings,
    CreateAutoScalingGroupTags,
    GenerateUserData,
    CompleteDeploymentPreparation,
}

impl Step {
    /// The full pipeline, in execution order.
    pub const SEQUENCE: [Step; 34] = [
        Step::StartDeploymentPreparation,
        Step::ValidateRegion,
        Step::ValidateEnvironment,
        Step::ValidateApplication,
        Step::ValidateUser,
        Step::ValidateImage,
        Step::ValidateMessage,
        Step::GetMetadata,
        Step::EnsureHash,
        Step::VerifyHash,
        Step::GetApplicationProperties,
        Step::GetDeploymentParams,
        Step::GetLaunchData,
        Step::PopulateDefaults,
        Step::PopulatePreviousState,
        Step::PopulatePreviousApplicationProperties,
        Step::GetPreviousImageDetails,
        Step::CreateNames,
        Step::GetImageDetails,
        Step::VerifyImage,
        Step::CheckInstanceTypeCompatibility,
        Step::CheckContactProperty,
        Step::CheckConfiguration,
        Step::AddRequiredSecurityGroups,
        Step::MapSecurityGroupIds,
        Step::VerifyLoadBalancers,
        Step::PopulateSubnets,
        Step::PopulateVpcZoneIdentifier,
        Step::PopulateAvailabilityZones,
        Step::PopulateTerminationPolicies,
        Step::CreateBlockDeviceMappings,
        Step::CreateAutoScalingGroupTags,
        Step::GenerateUserData,
        Step::CompleteDeploymentPreparation,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Step::StartDeploymentPreparation => "start-deployment-preparation",
            Step::ValidateRegion => "validate-region",
            Step::ValidateEnvironment => "validate-environment",
            Step::ValidateApplication => "validate-application",
            Step::ValidateUser => "validate-user",
            Step::ValidateImage => "validate-image",
            Step::ValidateMessage => "validate-message",
            Step::GetMetadata => "get-metadata",
            Step::EnsureHash => "ensure-hash",
            Step::VerifyHash => "verify-hash",
            Step::GetApplicationProperties => "get-application-properties",
            Step::GetDeploymentParams => "get-deployment-params",
            Step::GetLaunchData => "get-launch-data",
            Step::PopulateDefaults => "populate-defaults",
            Step::PopulatePreviousState => "populate-previous-state",
            Step::PopulatePreviousApplicationProperties => {
                "populate-previous-application-properties"
            }
            Step::GetPreviousImageDetails => "get-previous-image-details",
            Step::CreateNames => "create-names",
            Step::GetImageDetails => "get-image-details",
            Step::VerifyImage => "verify-image",
            Step::CheckInstanceTypeCompatibility => "check-instance-type-compatibility",
            Step::CheckContactProperty => "check-contact-property",
            Step::CheckConfiguration => "check-configuration",
            Step::AddRequiredSecurityGroups => "add-required-security-groups",
            Step::MapSecurityGroupIds => "map-security-group-ids",
            Step::VerifyLoadBalancers => "verify-load-balancers",
            Step::PopulateSubnets => "populate-subnets",
            Step::PopulateVpcZoneIdentifier => "populate-vpc-zone-identifier",
            Step::PopulateAvailabilityZones => "populate-availability-zones",
            Step::PopulateTerminationPolicies => "populate-termination-policies",
            Step::CreateBlockDeviceMappings => "create-block-device-mappings",
            Step::CreateAutoScalingGroupTags => "create-auto-scaling-group-tags",
            Step::GenerateUserData => "generate-user-data",
            Step::CompleteDeploymentPreparation => "complete-deployment-preparation",
        }
    }

    /// Run this step against the record.
    pub async fn run(&self, services: &Services, deployment: &mut Deployment) -> StepOutcome {
        let result = match self {
            Step::StartDeploymentPreparation => validate::start_deployment_preparation(deployment),
            Step::ValidateRegion => validate::validate_region(deployment),
            Step::ValidateEnvironment => validate::validate_environment(deployment),
            Step::ValidateApplication => validate::validate_application(deployment),
            Step::ValidateUser => validate::validate_user(deployment),
            Step::ValidateImage => validate::validate_image(deployment),
            Step::ValidateMessage => validate::validate_message(deployment),
            Step::GetMetadata => validate::get_metadata(services, deployment).await,
            Step::EnsureHash => configure::ensure_hash(services, deployment).await,
            Step::VerifyHash => configure::verify_hash(services, deployment).await,
            Step::GetApplicationProperties => {
                configure::get_application_properties(services, deployment).await
            }
            Step::GetDeploymentParams => configure::get_deployment_params(services, deployment).await,
            Step::GetLaunchData => configure::get_launch_data(services, deployment).await,
            Step::PopulateDefaults => configure::populate_defaults(deployment),
            Step::PopulatePreviousState => previous::populate_previous_state(services, deployment).await,
            Step::PopulatePreviousApplicationProperties => {
                previous::populate_previous_application_properties(services, deployment).await
            }
            Step::GetPreviousImageDetails => {
                previous::get_previous_image_details(services, deployment).await
            }
            Step::CreateNames => launch::create_names(deployment),
            Step::GetImageDetails => image::get_image_details(services, deployment).await,
            Step::VerifyImage => image::verify_image(deployment),
            Step::CheckInstanceTypeCompatibility => {
                image::check_instance_type_compatibility(deployment)
            }
            Step::CheckContactProperty => validate::check_contact_property(deployment),
            Step::CheckConfiguration => validate::check_configuration(services, deployment).await,
            Step::AddRequiredSecurityGroups => network::add_required_security_groups(deployment),
            Step::MapSecurityGroupIds => network::map_security_group_ids(services, deployment).await,
            Step::VerifyLoadBalancers => network::verify_load_balancers(services, deployment).await,
            Step::PopulateSubnets => network::populate_subnets(services, deployment).await,
            Step::PopulateVpcZoneIdentifier => network::populate_vpc_zone_identifier(deployment),
            Step::PopulateAvailabilityZones => network::populate_availability_zones(deployment),
            Step::PopulateTerminationPolicies => launch::populate_termination_policies(deployment),
            Step::CreateBlockDeviceMappings => launch::create_block_device_mappings(deployment),
            Step::CreateAutoScalingGroupTags => launch::create_auto_scaling_group_tags(deployment),
            Step::GenerateUserData => launch::generate_user_data(deployment),
            Step::CompleteDeploymentPreparation => {
                launch::complete_deployment_preparation(deployment)
            }
        };
        match result {
            Ok(Verdict::Continue) => StepOutcome::Success,
            Ok(Verdict::Retry(reason)) => StepOutcome::Retry(reason),
            Err(error) => StepOutcome::Error(error),
        }
    }
}
