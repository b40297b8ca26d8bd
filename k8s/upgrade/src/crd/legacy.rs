use k8s_openapi::{api::core::v1::ObjectReference, apimachinery::pkg::api::resource::Quantity};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The legacy pool claim, which provisions one CStorPool per node.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[kube(
    group = "openebs.io",
    version = "v1alpha1",
    kind = "StoragePoolClaim",
    plural = "storagepoolclaims",
    status = "StoragePoolClaimStatus",
    shortname = "spc",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct StoragePoolClaimSpec {
    #[serde(default)]
    pub name: String,
    /// The device type of the pool, eg: disk or sparse.
    #[serde(default, rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pools: Option<i64>,
    #[serde(default)]
    pub block_devices: BlockDeviceAttr,
    #[serde(default)]
    pub pool_spec: CStorPoolAttr,
}

/// The block devices of a pool claim.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BlockDeviceAttr {
    /// None for claims which select the block devices on their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_device_list: Option<Vec<String>>,
}

/// The pool configuration of a claim and of its pools.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CStorPoolAttr {
    /// One of striped, mirrored, raidz or raidz2.
    #[serde(default)]
    pub pool_type: String,
    #[serde(default)]
    pub over_provisioning: bool,
    #[serde(default)]
    pub thick_provisioning: bool,
    #[serde(default)]
    pub ro_threshold_limit: i64,
}

#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
pub struct StoragePoolClaimStatus {
    #[serde(default)]
    pub phase: String,
}

/// A legacy pool on a single node.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[kube(
    group = "openebs.io",
    version = "v1alpha1",
    kind = "CStorPool",
    plural = "cstorpools",
    status = "CStorPoolStatus",
    shortname = "csp",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct CStorPoolSpec {
    #[serde(default)]
    pub group: Vec<BlockDeviceGroup>,
    #[serde(default, rename = "poolConfig")]
    pub pool_spec: CStorPoolAttr,
}

/// A raid group of a legacy pool.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
pub struct BlockDeviceGroup {
    #[serde(default, rename = "blockDevice")]
    pub item: Vec<CspBlockDevice>,
}

/// A block device of a legacy pool.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CspBlockDevice {
    pub name: String,
    #[serde(default, rename = "deviceID")]
    pub device_id: String,
    #[serde(default)]
    pub in_use_by_pool: bool,
}

#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
pub struct CStorPoolStatus {
    #[serde(default)]
    pub phase: String,
}

/// A legacy cStor volume, living in the namespace of its target.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[kube(
    group = "openebs.io",
    version = "v1alpha1",
    kind = "CStorVolume",
    plural = "cstorvolumes",
    namespaced,
    status = "CStorVolumeStatus",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct CStorVolumeSpec {
    #[serde(default)]
    pub capacity: String,
    #[serde(default, rename = "targetIP")]
    pub target_ip: String,
    #[serde(default)]
    pub replication_factor: i32,
    #[serde(default)]
    pub consistency_factor: i32,
}

#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
pub struct CStorVolumeStatus {
    #[serde(default)]
    pub phase: String,
}

/// A legacy replica of a cStor volume on a CStorPool.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[kube(
    group = "openebs.io",
    version = "v1alpha1",
    kind = "CStorVolumeReplica",
    plural = "cstorvolumereplicas",
    namespaced,
    status = "CStorVolumeReplicaStatus",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct CStorVolumeReplicaSpec {
    #[serde(default, rename = "targetIP")]
    pub target_ip: String,
    #[serde(default)]
    pub capacity: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub zvol_workers: String,
}

#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
pub struct CStorVolumeReplicaStatus {
    #[serde(default)]
    pub phase: String,
}

/// A legacy backup of a cStor volume snapshot.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[kube(
    group = "openebs.io",
    version = "v1alpha1",
    kind = "CStorBackup",
    plural = "cstorbackups",
    namespaced,
    status = "String"
)]
#[serde(rename_all = "camelCase")]
pub struct CStorBackupSpec {
    #[serde(default)]
    pub backup_name: String,
    #[serde(default)]
    pub volume_name: String,
    #[serde(default)]
    pub snap_name: String,
    #[serde(default)]
    pub prev_snap_name: String,
    #[serde(default)]
    pub backup_dest: String,
    #[serde(default)]
    pub local_snap: bool,
}

/// A legacy restore of a cStor volume backup.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[kube(
    group = "openebs.io",
    version = "v1alpha1",
    kind = "CStorRestore",
    plural = "cstorrestores",
    namespaced,
    status = "String"
)]
#[serde(rename_all = "camelCase")]
pub struct CStorRestoreSpec {
    #[serde(default)]
    pub restore_name: String,
    #[serde(default)]
    pub volume_name: String,
    #[serde(default)]
    pub restore_src: String,
    #[serde(default, rename = "maxretrycount")]
    pub max_retry_count: i32,
    #[serde(default, rename = "retrycount")]
    pub retry_count: i32,
    #[serde(default)]
    pub storage_class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Quantity>,
    #[serde(default)]
    pub local: bool,
}

/// The legacy record of the last two snapshots of a completed backup.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[kube(
    group = "openebs.io",
    version = "v1alpha1",
    kind = "CStorCompletedBackup",
    plural = "cstorcompletedbackups",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct CStorCompletedBackupSpec {
    #[serde(default)]
    pub backup_name: String,
    #[serde(default)]
    pub volume_name: String,
    #[serde(default)]
    pub prev_snap_name: String,
    #[serde(default)]
    pub snap_name: String,
}

/// A snapshot of the external-storage snapshot controller.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[kube(
    group = "volumesnapshot.external-storage.k8s.io",
    version = "v1",
    kind = "VolumeSnapshot",
    plural = "volumesnapshots",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotSpec {
    /// The VolumeSnapshotData holding the snapshot details.
    #[serde(default)]
    pub snapshot_data_name: String,
    #[serde(default)]
    pub persistent_volume_claim_name: String,
}

/// The cluster scoped data of an external-storage snapshot.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[kube(
    group = "volumesnapshot.external-storage.k8s.io",
    version = "v1",
    kind = "VolumeSnapshotData",
    plural = "volumesnapshotdatas"
)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotDataSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_ref: Option<ObjectReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openebs_volume: Option<OpenEbsVolumeSnapshotSource>,
}

#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpenEbsVolumeSnapshotSource {
    #[serde(default)]
    pub snapshot_id: String,
}
