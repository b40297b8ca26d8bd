use super::MIGRATE;
use crate::{
    common::{
        client::{get_opt, list, selector},
        constants::{CSTOR_CSI_DRIVER, CSTOR_SNAPSHOT_CLASS, SNAPSHOT_PV_LABEL},
        retry::{poll, RetryPolicy},
    },
    crd::{
        legacy,
        snapshot::{
            VolumeSnapshot, VolumeSnapshotClass, VolumeSnapshotContent, VolumeSnapshotContentSource,
            VolumeSnapshotContentSpec, VolumeSnapshotSource, VolumeSnapshotSpec,
        },
    },
    error::{Error, StepContext},
};
use k8s_openapi::api::core::v1::ObjectReference;
use kube::{
    api::{DeleteParams, PostParams},
    Api, Client, ResourceExt,
};
use tracing::info;

/// The CSI snapshot content pre-provisioned from an external-storage snapshot.
pub fn snapshot_content(
    data: &legacy::VolumeSnapshotData,
    old: &legacy::VolumeSnapshot,
) -> VolumeSnapshotContent {
    let volume = data
        .spec
        .persistent_volume_ref
        .as_ref()
        .and_then(|r| r.name.clone())
        .unwrap_or_default();
    let snapshot_id = data
        .spec
        .openebs_volume
        .as_ref()
        .map(|v| v.snapshot_id.as_str())
        .unwrap_or_default();
    VolumeSnapshotContent::new(
        &data.name_any(),
        VolumeSnapshotContentSpec {
            volume_snapshot_ref: ObjectReference {
                api_version: Some("snapshot.storage.k8s.io/v1beta1".to_string()),
                kind: Some("VolumeSnapshot".to_string()),
                name: Some(old.name_any()),
                namespace: old.namespace(),
                ..Default::default()
            },
            source: VolumeSnapshotContentSource {
                snapshot_handle: Some(format!("{volume}@{snapshot_id}")),
                volume_handle: None,
            },
            deletion_policy: "Delete".to_string(),
            driver: CSTOR_CSI_DRIVER.to_string(),
            volume_snapshot_class_name: Some(CSTOR_SNAPSHOT_CLASS.to_string()),
        },
    )
}

/// The CSI snapshot bound to the pre-provisioned content, named after the old snapshot.
pub fn csi_snapshot(content: &VolumeSnapshotContent, old: &legacy::VolumeSnapshot) -> VolumeSnapshot {
    let mut snapshot = VolumeSnapshot::new(
        &old.name_any(),
        VolumeSnapshotSpec {
            source: VolumeSnapshotSource {
                persistent_volume_claim_name: None,
                volume_snapshot_content_name: Some(content.name_any()),
            },
            volume_snapshot_class_name: Some(CSTOR_SNAPSHOT_CLASS.to_string()),
        },
    );
    snapshot.metadata.namespace = old.namespace();
    snapshot
}

/// Converts the external-storage snapshots of a volume into CSI snapshots.
pub(crate) struct SnapshotMigrator<'a> {
    pub(crate) client: &'a Client,
    pub(crate) pv_name: &'a str,
    pub(crate) policy: RetryPolicy,
}

impl<'a> SnapshotMigrator<'a> {
    /// Migrate all the snapshots of the volume, the CSI snapshot class must exist.
    pub(crate) async fn migrate(&self) -> Result<(), Error> {
        let class_api: Api<VolumeSnapshotClass> = Api::all(self.client.clone());
        class_api
            .get(CSTOR_SNAPSHOT_CLASS)
            .await
            .step(MIGRATE, &format!("failed to get snapshotclass {CSTOR_SNAPSHOT_CLASS}"))?;
        let api: Api<legacy::VolumeSnapshot> = Api::all(self.client.clone());
        for snapshot in list(&api, &selector(SNAPSHOT_PV_LABEL, self.pv_name)).await? {
            self.migrate_snapshot(&snapshot).await?;
        }
        Ok(())
    }

    async fn migrate_snapshot(&self, old: &legacy::VolumeSnapshot) -> Result<(), Error> {
        let name = old.name_any();
        let namespace = old.namespace().unwrap_or_default();
        let data_name = &old.spec.snapshot_data_name;
        let data_api: Api<legacy::VolumeSnapshotData> = Api::all(self.client.clone());
        let data = data_api.get(data_name).await.step(
            MIGRATE,
            &format!("failed to get volumesnapshotdata {data_name} for {name}"),
        )?;

        info!(data = %data_name, "Creating equivalent volumesnapshotcontent for volumesnapshotdata");
        let content_api: Api<VolumeSnapshotContent> = Api::all(self.client.clone());
        let content = match get_opt(&content_api, data_name).await? {
            Some(content) => content,
            None => {
                content_api
                    .create(&PostParams::default(), &snapshot_content(&data, old))
                    .await?
            }
        };

        info!(snapshot = %name, "Creating equivalent new csi volumesnapshot for old volumesnapshot");
        let snapshot_api: Api<VolumeSnapshot> = Api::namespaced(self.client.clone(), &namespace);
        let snapshot = match get_opt(&snapshot_api, &name).await? {
            Some(snapshot) => snapshot,
            None => {
                snapshot_api
                    .create(&PostParams::default(), &csi_snapshot(&content, old))
                    .await?
            }
        };

        let content_name = content.name_any();
        poll(
            self.policy,
            &format!("volumesnapshot {name} to be bound"),
            || async {
                let snapshot = snapshot_api.get(&snapshot.name_any()).await?;
                check_binding(&snapshot, &content_name)
            },
        )
        .await?;

        info!(snapshot = %name, "Cleaning up old volumesnapshot");
        let old_api: Api<legacy::VolumeSnapshot> = Api::namespaced(self.client.clone(), &namespace);
        old_api.delete(&name, &DeleteParams::default()).await?;
        Ok(())
    }
}

/// Whether the snapshot is bound, it must be bound to the given content.
pub fn check_binding(snapshot: &VolumeSnapshot, content: &str) -> Result<Option<()>, Error> {
    let bound = snapshot
        .status
        .as_ref()
        .and_then(|s| s.bound_volume_snapshot_content_name.as_deref());
    match bound {
        None => Ok(None),
        Some(bound) if bound == content => Ok(Some(())),
        Some(bound) => Err(Error::Precondition {
            message: format!(
                "volumesnapshot {} is bound to incorrect volumesnapshotcontent: expected {content} got {bound}",
                snapshot.name_any()
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{
        legacy::{OpenEbsVolumeSnapshotSource, VolumeSnapshotDataSpec},
        snapshot::VolumeSnapshotStatus,
    };

    #[test]
    fn csi_snapshot_objects() {
        let data = legacy::VolumeSnapshotData::new(
            "k8s-volume-snapshot-1234",
            VolumeSnapshotDataSpec {
                persistent_volume_ref: Some(ObjectReference {
                    name: Some("pvc-1".to_string()),
                    ..Default::default()
                }),
                openebs_volume: Some(OpenEbsVolumeSnapshotSource {
                    snapshot_id: "snap-1".to_string(),
                }),
            },
        );
        let mut old = legacy::VolumeSnapshot::new("snapshot-demo", Default::default());
        old.metadata.namespace = Some("default".to_string());

        let content = snapshot_content(&data, &old);
        assert_eq!(content.name_any(), "k8s-volume-snapshot-1234");
        assert_eq!(content.spec.source.snapshot_handle.as_deref(), Some("pvc-1@snap-1"));
        assert_eq!(content.spec.volume_snapshot_ref.namespace.as_deref(), Some("default"));

        let mut snapshot = csi_snapshot(&content, &old);
        assert_eq!(snapshot.namespace().as_deref(), Some("default"));
        assert_eq!(check_binding(&snapshot, "k8s-volume-snapshot-1234").unwrap(), None);

        snapshot.status = Some(VolumeSnapshotStatus {
            bound_volume_snapshot_content_name: Some("k8s-volume-snapshot-1234".to_string()),
            ready_to_use: Some(true),
        });
        assert_eq!(check_binding(&snapshot, "k8s-volume-snapshot-1234").unwrap(), Some(()));
        assert!(check_binding(&snapshot, "other").is_err());
    }
}
