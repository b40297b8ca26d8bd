use k8s_openapi::{api::core::v1::ObjectReference, apimachinery::pkg::api::resource::Quantity};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A block device discovered by the node disk manager.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[kube(
    group = "openebs.io",
    version = "v1alpha1",
    kind = "BlockDevice",
    plural = "blockdevices",
    namespaced,
    status = "BlockDeviceStatus",
    shortname = "bd",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct BlockDeviceSpec {
    /// The device path, eg: /dev/sdb.
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub capacity: DeviceCapacity,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devlinks: Vec<DeviceDevLink>,
    /// The claim which holds the device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_ref: Option<ObjectReference>,
    #[serde(default)]
    pub node_attributes: NodeAttribute,
}

#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCapacity {
    /// Size in bytes.
    #[serde(default)]
    pub storage: u64,
    #[serde(default)]
    pub physical_sector_size: u32,
    #[serde(default)]
    pub logical_sector_size: u32,
}

/// Symlinks of the device of a given kind, eg: by-id.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
pub struct DeviceDevLink {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub links: Vec<String>,
}

#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeAttribute {
    #[serde(default)]
    pub node_name: String,
}

#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BlockDeviceStatus {
    #[serde(default)]
    pub claim_state: String,
    /// Active when the device is attached to its node.
    #[serde(default)]
    pub state: String,
}

impl BlockDevice {
    /// Whether the device is attached to its node.
    pub fn is_active(&self) -> bool {
        self.status.as_ref().map(|s| s.state.as_str()) == Some(BLOCK_DEVICE_ACTIVE)
    }
    /// Whether the device is known by the given devlink, either by its path or by its links.
    pub fn matches_devlink(&self, devlink: &str) -> bool {
        (!self.spec.path.is_empty() && devlink.contains(&self.spec.path))
            || self
                .spec
                .devlinks
                .iter()
                .flat_map(|d| d.links.iter())
                .any(|link| !link.is_empty() && devlink.contains(link.as_str()))
    }
}

/// State of an attached block device.
pub const BLOCK_DEVICE_ACTIVE: &str = "Active";
/// Phase of a claim which holds its block device.
pub const BLOCK_DEVICE_CLAIM_BOUND: &str = "Bound";

/// A claim on a block device.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[kube(
    group = "openebs.io",
    version = "v1alpha1",
    kind = "BlockDeviceClaim",
    plural = "blockdeviceclaims",
    namespaced,
    status = "BlockDeviceClaimStatus",
    shortname = "bdc",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct BlockDeviceClaimSpec {
    #[serde(default)]
    pub resources: DeviceClaimResources,
    #[serde(default)]
    pub block_device_name: String,
    #[serde(default)]
    pub block_device_node_attributes: BlockDeviceNodeAttributes,
}

#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
pub struct DeviceClaimResources {
    #[serde(default)]
    pub requests: BTreeMap<String, Quantity>,
}

#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BlockDeviceNodeAttributes {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_name: String,
    #[serde(default)]
    pub host_name: String,
}

#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
pub struct BlockDeviceClaimStatus {
    #[serde(default)]
    pub phase: String,
}

impl BlockDeviceClaim {
    /// Whether the claim holds its block device.
    pub fn is_bound(&self) -> bool {
        self.status.as_ref().map(|s| s.phase.as_str()) == Some(BLOCK_DEVICE_CLAIM_BOUND)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(path: &str, links: &[&str]) -> BlockDevice {
        BlockDevice::new(
            "blockdevice-1",
            BlockDeviceSpec {
                path: path.to_string(),
                devlinks: vec![DeviceDevLink {
                    kind: "by-id".to_string(),
                    links: links.iter().map(|l| l.to_string()).collect(),
                }],
                ..Default::default()
            },
        )
    }

    #[test]
    fn devlink_matching() {
        let bd = device("/dev/sdb", &["/dev/disk/by-id/ata-QEMU_HARDDISK_QM00002"]);
        assert!(bd.matches_devlink("/dev/sdb1"));
        assert!(bd.matches_devlink("/dev/disk/by-id/ata-QEMU_HARDDISK_QM00002-part1"));
        assert!(!bd.matches_devlink("/dev/sdc1"));

        let no_path = device("", &["/dev/disk/by-path/pci-0000:00:05.0"]);
        assert!(no_path.matches_devlink("/dev/disk/by-path/pci-0000:00:05.0-part1"));
        assert!(!no_path.matches_devlink("/dev/sdb"));
    }
}
