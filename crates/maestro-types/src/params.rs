//! Deployment parameters and their defaults
//!
//! Parameters arrive from the configuration service as a loosely-shaped
//! JSON document keyed by commit hash. Deserializing into
//! [`DeploymentParams`] overlays the user's values onto the fixed defaults,
//! so after the populate-defaults preparation step every knob has a value.

use serde::{Deserialize, Deserializer, Serialize};

/// Fully-defaulted per-deployment tuning parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DeploymentParams {
    pub default_cooldown: u32,
    pub desired_capacity: u32,
    pub health_check_grace_period: u32,
    pub health_check_type: String,
    pub instance_healthy_attempts: u32,
    pub instance_type: String,
    pub load_balancer_healthy_attempts: u32,
    pub max: u32,
    pub min: u32,
    pub pause_after_instances_healthy: bool,
    pub pause_after_load_balancers_healthy: bool,
    pub selected_zones: Vec<String>,
    pub subnet_purpose: String,
    pub termination_policy: String,

    /// Load balancers may arrive as a single string or a list; nil is
    /// dropped and a single string becomes a one-element list.
    #[serde(deserialize_with = "string_or_seq")]
    pub selected_load_balancers: Vec<String>,
    #[serde(deserialize_with = "string_or_seq")]
    pub selected_security_groups: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_volume: Option<RootVolume>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_stores: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_block_devices: Vec<ExtraBlockDevice>,
}

impl Default for DeploymentParams {
    fn default() -> Self {
        Self {
            default_cooldown: 10,
            desired_capacity: 1,
            health_check_grace_period: 600,
            health_check_type: "EC2".to_string(),
            instance_healthy_attempts: 50,
            instance_type: "t1.micro".to_string(),
            load_balancer_healthy_attempts: 50,
            max: 1,
            min: 1,
            pause_after_instances_healthy: false,
            pause_after_load_balancers_healthy: false,
            selected_zones: vec!["a".to_string(), "b".to_string()],
            subnet_purpose: "internal".to_string(),
            termination_policy: "Default".to_string(),
            selected_load_balancers: Vec::new(),
            selected_security_groups: Vec::new(),
            root_volume: None,
            instance_stores: None,
            extra_block_devices: Vec::new(),
        }
    }
}

impl DeploymentParams {
    /// Overlay a raw parameters document from the configuration service
    /// onto the defaults.
    pub fn from_document(document: &serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(document.clone())
    }
}

/// Requested root volume size, in gigabytes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RootVolume(pub u32);

/// An additional block device requested alongside the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExtraBlockDevice {
    pub device_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub virtual_name: Option<String>,
}

/// A block device mapping handed to the launch configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BlockDeviceMapping {
    pub device_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ebs: Option<Ebs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub virtual_name: Option<String>,
}

/// EBS volume settings for a block device mapping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Ebs {
    pub volume_size: u32,
}

fn string_or_seq<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrSeq {
        Single(String),
        Seq(Vec<String>),
    }

    match Option::<StringOrSeq>::deserialize(deserializer)? {
        None => Ok(Vec::new()),
        Some(StringOrSeq::Single(s)) => Ok(vec![s]),
        Some(StringOrSeq::Seq(seq)) => Ok(seq),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_cover_every_key() {
        let params = DeploymentParams::from_document(&json!({})).unwrap();
        assert_eq!(params, DeploymentParams::default());
        assert_eq!(params.default_cooldown, 10);
        assert_eq!(params.health_check_type, "EC2");
        assert_eq!(params.instance_type, "t1.micro");
        assert_eq!(params.selected_zones, vec!["a", "b"]);
        assert_eq!(params.subnet_purpose, "internal");
    }

    #[test]
    fn test_overlay_keeps_user_values() {
        let params = DeploymentParams::from_document(&json!({
            "min": 2,
            "max": 4,
            "desired-capacity": 3,
            "health-check-type": "ELB",
            "instance-type": "m1.small"
        }))
        .unwrap();
        assert_eq!(params.min, 2);
        assert_eq!(params.max, 4);
        assert_eq!(params.desired_capacity, 3);
        assert_eq!(params.health_check_type, "ELB");
        // untouched keys still carry defaults
        assert_eq!(params.default_cooldown, 10);
    }

    #[test]
    fn test_single_load_balancer_becomes_list() {
        let params = DeploymentParams::from_document(&json!({
            "selected-load-balancers": "search-frontend"
        }))
        .unwrap();
        assert_eq!(params.selected_load_balancers, vec!["search-frontend"]);
    }

    #[test]
    fn test_nil_load_balancers_dropped() {
        let params = DeploymentParams::from_document(&json!({
            "selected-load-balancers": null
        }))
        .unwrap();
        assert!(params.selected_load_balancers.is_empty());
    }
}
