//! Image resolution and compatibility checks

use super::{StepResult, Verdict};
use crate::context::Services;
use crate::error::{ErrorKind, PipelineError};
use maestro_cloud::AsgardClient;
use maestro_types::{Deployment, ImageDetails, VirtualisationType};
use regex::Regex;
use std::sync::OnceLock;

/// Instance families that only run paravirtual images.
const PARAVIRTUAL_ONLY_FAMILIES: [&str; 4] = ["c1", "m1", "m2", "t1"];

/// Instance families that only run HVM images.
const HVM_ONLY_FAMILIES: [&str; 6] = ["c4", "g2", "i2", "m4", "r3", "t2"];

fn image_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // e.g. search-1.0.3, search-1.0.3-hvm-20140502
    PATTERN.get_or_init(|| Regex::new(r"^([a-z]+)-([0-9][^-]*)(?:-.*)?$").unwrap())
}

/// Parse an image display name into (application, version).
pub(crate) fn parse_image_name(name: &str) -> Option<(String, String)> {
    let captures = image_name_pattern().captures(name)?;
    Some((captures[1].to_string(), captures[2].to_string()))
}

pub(crate) fn parse_virtualisation(value: &str) -> Option<VirtualisationType> {
    match value {
        "hvm" => Some(VirtualisationType::Hvm),
        "paravirtual" => Some(VirtualisationType::Paravirtual),
        _ => None,
    }
}

pub(crate) async fn get_image_details(
    services: &Services,
    deployment: &mut Deployment,
) -> StepResult {
    let image_id = deployment
        .new_state
        .image_details
        .as_ref()
        .map(|details| details.id.clone())
        .ok_or_else(|| PipelineError::missing_field("image"))?;

    let image = services
        .asgard
        .image(&deployment.region, &image_id)
        .await?
        .ok_or_else(|| {
            PipelineError::new(
                ErrorKind::UpstreamNotFound,
                format!("Image {image_id} not found"),
            )
        })?;

    let virt_type = parse_virtualisation(&image.virtualization_type).ok_or_else(|| {
        PipelineError::new(
            ErrorKind::UpstreamFault,
            format!(
                "Image {image_id} has unrecognised virtualisation type {}",
                image.virtualization_type
            ),
        )
    })?;

    let parsed = parse_image_name(&image.name);
    deployment.new_state.image_details = Some(ImageDetails {
        id: image.id,
        name: Some(image.name.clone()),
        application: parsed.as_ref().map(|(application, _)| application.clone()),
        version: parsed.map(|(_, version)| version),
        virt_type: Some(virt_type),
    });
    Ok(Verdict::Continue)
}

pub(crate) fn verify_image(deployment: &mut Deployment) -> StepResult {
    let details = deployment
        .new_state
        .image_details
        .as_ref()
        .ok_or_else(|| PipelineError::missing_field("image"))?;
    match details.application.as_deref() {
        Some(application) if application == deployment.application => Ok(Verdict::Continue),
        other => Err(PipelineError::new(
            ErrorKind::MismatchedImage,
            format!(
                "Image {} is for application {}, not {}",
                details.id,
                other.unwrap_or("(unparseable)"),
                deployment.application
            ),
        )),
    }
}

pub(crate) fn check_instance_type_compatibility(deployment: &mut Deployment) -> StepResult {
    let instance_type = deployment.params().instance_type;
    let family = instance_type.split('.').next().unwrap_or(&instance_type).to_string();
    let virt_type = deployment
        .new_state
        .image_details
        .as_ref()
        .and_then(|details| details.virt_type)
        .ok_or_else(|| PipelineError::missing_field("image-virtualisation-type"))?;

    let incompatible = match virt_type {
        VirtualisationType::Hvm => PARAVIRTUAL_ONLY_FAMILIES.contains(&family.as_str()),
        VirtualisationType::Paravirtual => HVM_ONLY_FAMILIES.contains(&family.as_str()),
    };
    if incompatible {
        return Err(PipelineError::new(
            ErrorKind::IncompatibleInstanceType,
            format!(
                "A {virt_type} image cannot run on instance type {instance_type}"
            ),
        ));
    }
    Ok(Verdict::Continue)
}
