use super::custom_resource;
use k8s_openapi::{
    api::core::v1::{ObjectReference, PodAffinity, ResourceRequirements, Toleration},
    apimachinery::pkg::{api::resource::Quantity, apis::meta::v1::Time},
    NamespaceResourceScope,
};
use kube::{api::ObjectMeta, core::TypeMeta, CustomResource};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The version of a resource as desired by the user and as reconciled by its controller.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VersionDetails {
    /// Whether the controller upgrades the resource on its own.
    #[serde(default)]
    pub auto_upgrade: bool,
    /// The version the resource should be in.
    #[serde(default)]
    pub desired: String,
    /// The version the resource is in.
    #[serde(default)]
    pub status: VersionStatus,
}

/// The reconciled version of a resource.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VersionStatus {
    /// Whether the dependents of the resource are upgraded.
    #[serde(default)]
    pub dependents_upgraded: bool,
    /// The version the resource is in.
    #[serde(default)]
    pub current: String,
    /// The reconcile state.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state: String,
    /// Human readable reconcile message.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// The reason of a failed reconcile.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<Time>,
}

/// A cStor pool cluster: the set of pools which can serve cStor volumes.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CStorPoolCluster {
    #[serde(flatten, default)]
    pub types: Option<TypeMeta>,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: CStorPoolClusterSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CStorPoolClusterStatus>,
    #[serde(default)]
    pub version_details: VersionDetails,
}
custom_resource!(
    CStorPoolCluster,
    "cstor.openebs.io",
    "v1",
    "cstorpoolclusters",
    NamespaceResourceScope
);

/// The pools of the cluster and their shared defaults.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CStorPoolClusterSpec {
    #[serde(default)]
    pub pools: Vec<PoolSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aux_resources: Option<ResourceRequirements>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub priority_class_name: String,
}

/// A single pool of the cluster.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PoolSpec {
    /// Selects the node the pool is placed on.
    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default)]
    pub data_raid_groups: Vec<RaidGroup>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub write_cache_raid_groups: Vec<RaidGroup>,
    #[serde(default)]
    pub pool_config: PoolConfig,
}

/// A raid group of block devices.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RaidGroup {
    #[serde(default)]
    pub block_devices: Vec<PoolBlockDevice>,
}

/// A block device of a raid group.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PoolBlockDevice {
    pub block_device_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_link: Option<String>,
}

impl PoolBlockDevice {
    /// A block device referenced by name only.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            block_device_name: name.into(),
            ..Default::default()
        }
    }
}

/// The configuration of a pool.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PoolConfig {
    /// One of stripe, mirror, raidz or raidz2.
    #[serde(default)]
    pub data_raid_group_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub write_cache_group_type: String,
    #[serde(default)]
    pub thick_provision: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub compression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aux_resources: Option<ResourceRequirements>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ro_threshold_limit: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CStorPoolClusterStatus {
    #[serde(default)]
    pub provisioned_instances: i32,
    #[serde(default)]
    pub desired_instances: i32,
    #[serde(default)]
    pub healthy_instances: i32,
}

/// A cStor pool on a single node, created by the pool cluster.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CStorPoolInstance {
    #[serde(flatten, default)]
    pub types: Option<TypeMeta>,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: CStorPoolInstanceSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CStorPoolInstanceStatus>,
    #[serde(default)]
    pub version_details: VersionDetails,
}
custom_resource!(
    CStorPoolInstance,
    "cstor.openebs.io",
    "v1",
    "cstorpoolinstances",
    NamespaceResourceScope
);

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CStorPoolInstanceSpec {
    #[serde(default)]
    pub host_name: String,
    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default)]
    pub pool_config: PoolConfig,
    #[serde(default)]
    pub data_raid_groups: Vec<RaidGroup>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CStorPoolInstanceStatus {
    /// The pool phase, eg: ONLINE or OFFLINE.
    #[serde(default)]
    pub phase: String,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub provisioned_replicas: i32,
    #[serde(default)]
    pub healthy_replicas: i32,
}

impl CStorPoolInstance {
    /// The pool phase, empty if not reported yet.
    pub fn phase(&self) -> &str {
        self.status
            .as_ref()
            .map(|s| s.phase.as_str())
            .unwrap_or_default()
    }
}

/// The claim of a cStor volume, reconciled into the volume, its target and its replicas.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CStorVolumeConfig {
    #[serde(flatten, default)]
    pub types: Option<TypeMeta>,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: CStorVolumeConfigSpec,
    #[serde(default)]
    pub status: CStorVolumeConfigStatus,
    #[serde(default)]
    pub version_details: VersionDetails,
}
custom_resource!(
    CStorVolumeConfig,
    "cstor.openebs.io",
    "v1",
    "cstorvolumeconfigs",
    NamespaceResourceScope
);

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CStorVolumeConfigSpec {
    #[serde(default)]
    pub capacity: BTreeMap<String, Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cstor_volume_ref: Option<ObjectReference>,
    /// The `<source-volume>@<snapshot>` a cloned volume is created from.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cstor_volume_source: String,
    #[serde(default)]
    pub provision: VolumeProvision,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeProvision {
    #[serde(default)]
    pub capacity: BTreeMap<String, Quantity>,
    #[serde(default)]
    pub replica_count: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CStorVolumeConfigStatus {
    /// The claim phase, eg: Pending or Bound.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub phase: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pool_info: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub capacity: BTreeMap<String, Quantity>,
}

/// A CSI cStor volume, ie: its target configuration.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CStorVolume {
    #[serde(flatten, default)]
    pub types: Option<TypeMeta>,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: CStorVolumeSpec,
    #[serde(default)]
    pub status: CStorVolumeStatus,
    #[serde(default)]
    pub version_details: VersionDetails,
}
custom_resource!(
    CStorVolume,
    "cstor.openebs.io",
    "v1",
    "cstorvolumes",
    NamespaceResourceScope
);

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CStorVolumeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<Quantity>,
    #[serde(default, rename = "targetIP")]
    pub target_ip: String,
    #[serde(default)]
    pub replication_factor: i32,
    #[serde(default)]
    pub consistency_factor: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CStorVolumeStatus {
    /// The volume phase, eg: Healthy.
    #[serde(default)]
    pub phase: String,
}

/// A replica of a CSI cStor volume on a pool instance.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CStorVolumeReplica {
    #[serde(flatten, default)]
    pub types: Option<TypeMeta>,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: CStorVolumeReplicaSpec,
    #[serde(default)]
    pub status: CStorVolumeReplicaStatus,
    #[serde(default)]
    pub version_details: VersionDetails,
}
custom_resource!(
    CStorVolumeReplica,
    "cstor.openebs.io",
    "v1",
    "cstorvolumereplicas",
    NamespaceResourceScope
);

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CStorVolumeReplicaSpec {
    #[serde(default, rename = "targetIP")]
    pub target_ip: String,
    #[serde(default)]
    pub capacity: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub zvol_workers: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CStorVolumeReplicaStatus {
    #[serde(default)]
    pub phase: String,
}

/// Policy applied to the target and replicas of the cStor volumes which reference it.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[kube(
    group = "cstor.openebs.io",
    version = "v1",
    kind = "CStorVolumePolicy",
    plural = "cstorvolumepolicies",
    namespaced,
    status = "CStorVolumePolicyStatus",
    derive = "Default",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct CStorVolumePolicySpec {
    #[serde(default)]
    pub provision: Provision,
    #[serde(default)]
    pub target: TargetSpec,
    #[serde(default)]
    pub replica: ReplicaSpec,
    /// The pools which host the replicas of the volume.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replica_pool_info: Vec<ReplicaPoolInfo>,
}

#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Provision {
    #[serde(default)]
    pub replica_affinity: bool,
}

/// Tunables of the volume target.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TargetSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub queue_depth: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub lu_workers: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aux_resources: Option<ResourceRequirements>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<PodAffinity>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub priority_class_name: String,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

/// Tunables of the volume replicas.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub zvol_workers: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub compression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<PodAffinity>,
}

#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaPoolInfo {
    pub pool_name: String,
}

#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
pub struct CStorVolumePolicyStatus {
    #[serde(default)]
    pub phase: String,
}

/// A backup of a cStor volume snapshot.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[kube(
    group = "cstor.openebs.io",
    version = "v1",
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

/// A restore of a cStor volume backup.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[kube(
    group = "cstor.openebs.io",
    version = "v1",
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

/// The last two snapshots of a completed incremental backup.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[kube(
    group = "cstor.openebs.io",
    version = "v1",
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
    pub last_snap_name: String,
    #[serde(default)]
    pub second_last_snap_name: String,
}
