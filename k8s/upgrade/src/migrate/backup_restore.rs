use crate::{
    common::{
        client::{create_if_missing, list},
        constants::{CSPI_NAME_LABEL, CSPI_UID_LABEL, CSP_UID_LABEL},
    },
    crd::{cstor, fresh_metadata, legacy},
    error::Error,
};
use kube::{
    api::{DeleteParams, ListParams},
    Api, Client, Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;
use tracing::info;

/// The pool instance which now owns the backups and restores of a legacy pool.
#[derive(Debug, Clone)]
pub struct PoolRelabel {
    /// Name of the CStorPoolInstance.
    pub cspi_name: String,
    /// Uid of the CStorPoolInstance.
    pub cspi_uid: String,
}

impl PoolRelabel {
    fn apply(&self, metadata: &mut kube::api::ObjectMeta) {
        let labels = metadata.labels.get_or_insert_with(Default::default);
        labels.insert(CSPI_NAME_LABEL.to_string(), self.cspi_name.clone());
        labels.insert(CSPI_UID_LABEL.to_string(), self.cspi_uid.clone());
        labels.remove(CSP_UID_LABEL);
    }
}

/// A v1alpha1 backup resource with its cstor.openebs.io/v1 counterpart.
trait LegacyBackup:
    Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>
    + Clone
    + Debug
    + DeserializeOwned
    + Serialize
{
    type V1: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>
        + Clone
        + Debug
        + DeserializeOwned
        + Serialize;

    fn to_v1(&self) -> Self::V1;
}

impl LegacyBackup for legacy::CStorBackup {
    type V1 = cstor::CStorBackup;

    fn to_v1(&self) -> Self::V1 {
        let mut backup = cstor::CStorBackup::new(
            &self.name_any(),
            cstor::CStorBackupSpec {
                backup_name: self.spec.backup_name.clone(),
                volume_name: self.spec.volume_name.clone(),
                snap_name: self.spec.snap_name.clone(),
                prev_snap_name: self.spec.prev_snap_name.clone(),
                backup_dest: self.spec.backup_dest.clone(),
                local_snap: self.spec.local_snap,
            },
        );
        backup.metadata = fresh_metadata(&self.metadata);
        backup.status = self.status.clone();
        backup
    }
}

impl LegacyBackup for legacy::CStorRestore {
    type V1 = cstor::CStorRestore;

    fn to_v1(&self) -> Self::V1 {
        let mut restore = cstor::CStorRestore::new(
            &self.name_any(),
            cstor::CStorRestoreSpec {
                restore_name: self.spec.restore_name.clone(),
                volume_name: self.spec.volume_name.clone(),
                restore_src: self.spec.restore_src.clone(),
                max_retry_count: self.spec.max_retry_count,
                retry_count: self.spec.retry_count,
                storage_class: self.spec.storage_class.clone(),
                size: self.spec.size.clone(),
                local: self.spec.local,
            },
        );
        restore.metadata = fresh_metadata(&self.metadata);
        restore.status = self.status.clone();
        restore
    }
}

impl LegacyBackup for legacy::CStorCompletedBackup {
    type V1 = cstor::CStorCompletedBackup;

    fn to_v1(&self) -> Self::V1 {
        let mut completed = cstor::CStorCompletedBackup::new(
            &self.name_any(),
            cstor::CStorCompletedBackupSpec {
                backup_name: self.spec.backup_name.clone(),
                volume_name: self.spec.volume_name.clone(),
                last_snap_name: self.spec.prev_snap_name.clone(),
                second_last_snap_name: self.spec.snap_name.clone(),
            },
        );
        completed.metadata = fresh_metadata(&self.metadata);
        completed
    }
}

async fn migrate_kind<K: LegacyBackup>(
    client: &Client,
    namespace: &str,
    selector: &str,
    relabel: Option<&PoolRelabel>,
) -> Result<usize, Error> {
    let old_api: Api<K> = Api::namespaced(client.clone(), namespace);
    let new_api: Api<K::V1> = Api::namespaced(client.clone(), namespace);
    let old = list(&old_api, selector).await?;
    for object in &old {
        let mut converted = object.to_v1();
        if let Some(relabel) = relabel {
            relabel.apply(converted.meta_mut());
        }
        create_if_missing(&new_api, &converted).await?;
    }
    if !old.is_empty() {
        old_api
            .delete_collection(&DeleteParams::default(), &ListParams::default().labels(selector))
            .await?;
        info!(
            kind = %K::kind(&()),
            count = old.len(),
            selector,
            "Migrated resources to cstor.openebs.io/v1"
        );
    }
    Ok(old.len())
}

/// Move the v1alpha1 backups, restores and completed backups matching the selector into
/// cstor.openebs.io/v1, optionally relabelling them with their new pool instance.
pub async fn migrate_backups(
    client: &Client,
    namespace: &str,
    selector: &str,
    relabel: Option<&PoolRelabel>,
) -> Result<(), Error> {
    migrate_kind::<legacy::CStorBackup>(client, namespace, selector, relabel).await?;
    migrate_kind::<legacy::CStorRestore>(client, namespace, selector, relabel).await?;
    migrate_kind::<legacy::CStorCompletedBackup>(client, namespace, selector, relabel).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;

    #[test]
    fn completed_backup_snapshots() {
        let mut old = legacy::CStorCompletedBackup::new(
            "backup-pvc-1",
            legacy::CStorCompletedBackupSpec {
                backup_name: "backup".to_string(),
                volume_name: "pvc-1".to_string(),
                prev_snap_name: "snap-1".to_string(),
                snap_name: "snap-2".to_string(),
            },
        );
        old.metadata = ObjectMeta {
            name: Some("backup-pvc-1".to_string()),
            namespace: Some("openebs".to_string()),
            resource_version: Some("7".to_string()),
            uid: Some("1234".to_string()),
            labels: Some(
                [(CSP_UID_LABEL.to_string(), "csp-uid".to_string())]
                    .into_iter()
                    .collect(),
            ),
            ..Default::default()
        };
        let mut new = old.to_v1();
        assert_eq!(new.spec.last_snap_name, "snap-1");
        assert_eq!(new.spec.second_last_snap_name, "snap-2");
        assert_eq!(new.metadata.resource_version, None);
        assert_eq!(new.metadata.uid, None);

        let relabel = PoolRelabel {
            cspi_name: "cstor-pool-abcd".to_string(),
            cspi_uid: "cspi-uid".to_string(),
        };
        relabel.apply(&mut new.metadata);
        let labels = new.labels();
        assert_eq!(labels.get(CSPI_NAME_LABEL).unwrap(), "cstor-pool-abcd");
        assert_eq!(labels.get(CSPI_UID_LABEL).unwrap(), "cspi-uid");
        assert!(!labels.contains_key(CSP_UID_LABEL));
    }
}
