use super::{cstor::VersionDetails, custom_resource};
use k8s_openapi::NamespaceResourceScope;
use kube::{api::ObjectMeta, core::TypeMeta};
use serde::{Deserialize, Serialize};

/// A Jiva volume, reconciled by the jiva operator into its controller and replicas.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct JivaVolume {
    #[serde(flatten, default)]
    pub types: Option<TypeMeta>,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: JivaVolumeSpec,
    #[serde(default)]
    pub status: JivaVolumeStatus,
    #[serde(default)]
    pub version_details: VersionDetails,
}
custom_resource!(
    JivaVolume,
    "openebs.io",
    "v1alpha1",
    "jivavolumes",
    NamespaceResourceScope
);

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JivaVolumeSpec {
    #[serde(default)]
    pub pv: String,
    #[serde(default)]
    pub capacity: String,
    #[serde(default, rename = "targetIP")]
    pub target_ip: String,
    #[serde(default)]
    pub desired_replication_factor: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JivaVolumeStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub replica_count: i32,
    #[serde(default)]
    pub phase: String,
}
