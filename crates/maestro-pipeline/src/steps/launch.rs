//! Naming, launch assets and preparation completion

use super::{StepResult, Verdict};
use crate::blockdevices;
use crate::error::PipelineError;
use crate::naming;
use crate::userdata;
use chrono::Utc;
use maestro_types::{AsgTag, Deployment, VirtualisationType};

pub(crate) fn create_names(deployment: &mut Deployment) -> StepResult {
    let previous_name = deployment
        .previous_state
        .as_ref()
        .and_then(|previous| previous.auto_scaling_group_name.as_deref());
    let asg_name = naming::next_asg_name(
        &deployment.application,
        &deployment.environment,
        previous_name,
    );
    deployment.new_state.launch_configuration_name =
        Some(naming::launch_configuration_name(&asg_name, Utc::now()));
    deployment.new_state.auto_scaling_group_name = Some(asg_name);
    Ok(Verdict::Continue)
}

pub(crate) fn populate_termination_policies(deployment: &mut Deployment) -> StepResult {
    deployment.new_state.termination_policies = vec![deployment.params().termination_policy];
    Ok(Verdict::Continue)
}

pub(crate) fn create_block_device_mappings(deployment: &mut Deployment) -> StepResult {
    let virt_type = deployment
        .new_state
        .image_details
        .as_ref()
        .and_then(|details| details.virt_type)
        .unwrap_or(VirtualisationType::Paravirtual);
    deployment.new_state.block_device_mappings =
        blockdevices::create_mappings(&deployment.params(), virt_type);
    Ok(Verdict::Continue)
}

pub(crate) fn create_auto_scaling_group_tags(deployment: &mut Deployment) -> StepResult {
    let asg_name = deployment
        .new_state
        .auto_scaling_group_name
        .clone()
        .ok_or_else(|| PipelineError::missing_field("auto-scaling-group-name"))?;
    let version = deployment
        .new_state
        .image_details
        .as_ref()
        .and_then(|details| details.version.clone())
        .ok_or_else(|| PipelineError::missing_field("image-version"))?;
    let contact = deployment
        .new_state
        .onix
        .as_ref()
        .and_then(|metadata| metadata.contact.clone())
        .unwrap_or_default();

    deployment.new_state.auto_scaling_group_tags = vec![
        AsgTag::propagated(&asg_name, "Application", deployment.application.clone()),
        AsgTag::propagated(&asg_name, "Contact", contact),
        AsgTag::propagated(&asg_name, "DeployedBy", deployment.user.clone()),
        AsgTag::propagated(&asg_name, "DeployedOn", Utc::now().to_rfc3339()),
        AsgTag::propagated(&asg_name, "Environment", deployment.environment.clone()),
        AsgTag::propagated(
            &asg_name,
            "Name",
            format!("{}-{version}", deployment.application),
        ),
        AsgTag::propagated(&asg_name, "Version", version),
    ];
    Ok(Verdict::Continue)
}

pub(crate) fn generate_user_data(deployment: &mut Deployment) -> StepResult {
    let script = userdata::generate(deployment);
    deployment.new_state.user_data = Some(script);
    Ok(Verdict::Continue)
}

/// The completeness gate before the executor takes over.
pub(crate) fn complete_deployment_preparation(deployment: &mut Deployment) -> StepResult {
    for (value, field) in [
        (
            deployment.new_state.auto_scaling_group_name.is_some(),
            "auto-scaling-group-name",
        ),
        (
            deployment.new_state.launch_configuration_name.is_some(),
            "launch-configuration-name",
        ),
        (deployment.new_state.user_data.is_some(), "user-data"),
        (deployment.new_state.hash.is_some(), "hash"),
    ] {
        if !value {
            return Err(PipelineError::missing_field(field));
        }
    }
    Ok(Verdict::Continue)
}
