//! Block-device mapping synthesis
//!
//! The launch configuration needs an explicit mapping for the root EBS
//! volume, the ephemeral instance stores and any extra devices the
//! deployment parameters request. The number of instance stores defaults
//! per instance type; an explicit `instance-stores` parameter overrides
//! the table.

use maestro_types::{BlockDeviceMapping, DeploymentParams, Ebs, VirtualisationType};

const DEFAULT_ROOT_VOLUME_SIZE: u32 = 8;

/// Instance stores available per instance type. Types not listed have
/// none.
fn default_instance_stores(instance_type: &str) -> u32 {
    match instance_type {
        "m1.small" | "m1.medium" | "c1.medium" | "m2.xlarge" => 1,
        "m1.large" | "m2.2xlarge" | "m3.xlarge" => 2,
        "m1.xlarge" | "c1.xlarge" | "m2.4xlarge" | "m3.2xlarge" => 4,
        _ => 0,
    }
}

/// Device names /dev/sdb onwards for the ephemeral stores.
fn store_device_name(index: u32) -> String {
    let letter = (b'b' + index as u8) as char;
    format!("/dev/sd{letter}")
}

/// Compute the full block-device mapping list for a launch configuration.
pub fn create_mappings(
    params: &DeploymentParams,
    virt_type: VirtualisationType,
) -> Vec<BlockDeviceMapping> {
    let mut mappings = Vec::new();

    let root_size = params.root_volume.map(|v| v.0).unwrap_or(DEFAULT_ROOT_VOLUME_SIZE);
    let root_device = match virt_type {
        VirtualisationType::Paravirtual => "/dev/sda1",
        VirtualisationType::Hvm => "/dev/xvda",
    };
    mappings.push(BlockDeviceMapping {
        device_name: root_device.to_string(),
        ebs: Some(Ebs {
            volume_size: root_size,
        }),
        virtual_name: None,
    });

    let stores = params
        .instance_stores
        .unwrap_or_else(|| default_instance_stores(&params.instance_type));
    for index in 0..stores {
        mappings.push(BlockDeviceMapping {
            device_name: store_device_name(index),
            ebs: None,
            virtual_name: Some(format!("ephemeral{index}")),
        });
    }

    for (offset, extra) in params.extra_block_devices.iter().enumerate() {
        mappings.push(BlockDeviceMapping {
            device_name: if extra.device_name.is_empty() {
                store_device_name(stores + offset as u32)
            } else {
                extra.device_name.clone()
            },
            ebs: extra.size.map(|size| Ebs { volume_size: size }),
            virtual_name: extra.virtual_name.clone(),
        });
    }

    mappings
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_types::params::{ExtraBlockDevice, RootVolume};

    #[test]
    fn test_default_root_volume_only() {
        let params = DeploymentParams::default(); // t1.micro has no stores
        let mappings = create_mappings(&params, VirtualisationType::Paravirtual);
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].device_name, "/dev/sda1");
        assert_eq!(mappings[0].ebs, Some(Ebs { volume_size: 8 }));
    }

    #[test]
    fn test_hvm_root_device_name() {
        let params = DeploymentParams::default();
        let mappings = create_mappings(&params, VirtualisationType::Hvm);
        assert_eq!(mappings[0].device_name, "/dev/xvda");
    }

    #[test]
    fn test_instance_stores_from_table() {
        let params = DeploymentParams {
            instance_type: "m1.xlarge".to_string(),
            ..Default::default()
        };
        let mappings = create_mappings(&params, VirtualisationType::Paravirtual);
        assert_eq!(mappings.len(), 5);
        assert_eq!(mappings[1].device_name, "/dev/sdb");
        assert_eq!(mappings[1].virtual_name.as_deref(), Some("ephemeral0"));
        assert_eq!(mappings[4].device_name, "/dev/sde");
    }

    #[test]
    fn test_explicit_stores_override_table() {
        let params = DeploymentParams {
            instance_type: "m1.xlarge".to_string(),
            instance_stores: Some(1),
            ..Default::default()
        };
        let mappings = create_mappings(&params, VirtualisationType::Paravirtual);
        assert_eq!(mappings.len(), 2);
    }

    #[test]
    fn test_root_volume_and_extra_devices() {
        let params = DeploymentParams {
            root_volume: Some(RootVolume(20)),
            extra_block_devices: vec![ExtraBlockDevice {
                device_name: "/dev/sdf".to_string(),
                size: Some(100),
                virtual_name: None,
            }],
            ..Default::default()
        };
        let mappings = create_mappings(&params, VirtualisationType::Paravirtual);
        assert_eq!(mappings[0].ebs, Some(Ebs { volume_size: 20 }));
        assert_eq!(mappings[1].device_name, "/dev/sdf");
        assert_eq!(mappings[1].ebs, Some(Ebs { volume_size: 100 }));
    }
}
