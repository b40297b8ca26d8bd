use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Records the migration of a legacy pool or volume.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[kube(
    group = "openebs.io",
    version = "v1alpha1",
    kind = "MigrationTask",
    plural = "migrationtasks",
    namespaced,
    status = "MigrationTaskStatus",
    derive = "Default",
    printcolumn = r#"{ "name":"phase", "type":"string", "jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MigrationTaskSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cstor_pool: Option<MigrateCStorPool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cstor_volume: Option<MigrateCStorVolume>,
}

#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MigrateCStorPool {
    /// The StoragePoolClaim to migrate.
    pub spc_name: String,
    /// The name of the CStorPoolCluster, the SPC name if empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rename: String,
}

#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MigrateCStorVolume {
    /// The PersistentVolume to migrate.
    pub pv_name: String,
}

#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MigrationTaskStatus {
    #[serde(flatten)]
    pub summary: TaskSummary,
    #[serde(default)]
    pub migration_detailed_statuses: Vec<StepStatus>,
}

/// Records the upgrade of a cStor or Jiva resource.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[kube(
    group = "openebs.io",
    version = "v1alpha1",
    kind = "UpgradeTask",
    plural = "upgradetasks",
    namespaced,
    status = "UpgradeTaskStatus",
    derive = "Default",
    printcolumn = r#"{ "name":"phase", "type":"string", "jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeTaskSpec {
    #[serde(default)]
    pub from_version: String,
    #[serde(default)]
    pub to_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_tag: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_prefix: String,
    #[serde(default)]
    pub resource_spec: ResourceSpec,
}

/// The resource to upgrade, only one of them is set.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cstor_pool_instance: Option<CStorPoolInstanceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cstor_pool_cluster: Option<CStorPoolClusterRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cstor_volume: Option<VolumeRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jiva_volume: Option<VolumeRef>,
}

#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CStorPoolInstanceRef {
    pub cspi_name: String,
}

#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CStorPoolClusterRef {
    pub cspc_name: String,
}

#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VolumeRef {
    pub pv_name: String,
}

#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeTaskStatus {
    #[serde(flatten)]
    pub summary: TaskSummary,
    #[serde(default)]
    pub upgrade_detailed_statuses: Vec<StepStatus>,
}

/// The overall progress of a task.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<TaskPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_time: Option<Time>,
    /// Number of failed runs of the task job.
    #[serde(default)]
    pub retries: i32,
}

/// Phase of a task.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq, JsonSchema, strum_macros::Display,
)]
pub enum TaskPhase {
    Started,
    Success,
    Error,
}

impl TaskPhase {
    /// A task in a terminal phase is not run again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

/// The progress of a single step of a task.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StepStatus {
    #[serde(default)]
    pub step: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_time: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<StepPhase>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
}

/// Phase of a task step.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq, JsonSchema, strum_macros::Display,
)]
pub enum StepPhase {
    Waiting,
    Completed,
    Errored,
}
