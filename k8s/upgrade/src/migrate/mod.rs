use crate::{
    common::retry::RetryPolicy,
    crd::task::{MigrateCStorPool, MigrateCStorVolume, MigrationTask, MigrationTaskSpec},
    error::Error,
};
use kube::Client;
use tracing::info;

/// Conversion of the v1alpha1 backups, restores and completed backups into cstor.openebs.io/v1.
pub mod backup_restore;
/// Correction of the block devices of the legacy pools whose device names have changed.
pub mod bd_correction;
/// Generation of the CStorPoolCluster equivalent to a StoragePoolClaim.
pub mod cspc_generator;
/// Migration of a StoragePoolClaim and its CStorPools to a CStorPoolCluster.
pub mod pool;
/// Migration of the external-storage snapshots of a volume to CSI snapshots.
pub mod snapshot;
/// Migration of a legacy cStor volume to a CSI cStor volume.
pub mod volume;
/// Generation of the CStorVolumePolicy of a volume from its storage class cas config.
pub mod volume_policy;

/// Step which validates the migration before any resource is changed.
pub const PRE_MIGRATION: &str = "Pre-migration";
/// Step which migrates the resources.
pub const MIGRATE: &str = "Migrate";

/// What a migration job converts.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum MigrationTarget {
    /// A StoragePoolClaim, into the CStorPoolCluster with the given name.
    Pool { spc: String, cspc: String },
    /// A legacy cStor volume by persistent volume name.
    Volume { pv: String },
}

impl MigrationTarget {
    /// A pool migration, the CStorPoolCluster is named after the StoragePoolClaim by default.
    pub fn pool(spc: &str, cspc: Option<&str>) -> Self {
        let cspc = cspc
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(spc);
        Self::Pool {
            spc: spc.to_string(),
            cspc: cspc.to_string(),
        }
    }

    /// Name of the MigrationTask recording the migration.
    pub fn task_name(&self) -> String {
        match self {
            Self::Pool { spc, .. } => format!("migrate-cstor-pool-{spc}"),
            Self::Volume { pv } => format!("migrate-cstor-volume-{pv}"),
        }
    }

    /// The MigrationTask recording the migration.
    pub(crate) fn migration_task(&self, namespace: &str) -> MigrationTask {
        let spec = match self {
            Self::Pool { spc, cspc } => MigrationTaskSpec {
                cstor_pool: Some(MigrateCStorPool {
                    spc_name: spc.clone(),
                    rename: cspc.clone(),
                }),
                cstor_volume: None,
            },
            Self::Volume { pv } => MigrationTaskSpec {
                cstor_pool: None,
                cstor_volume: Some(MigrateCStorVolume { pv_name: pv.clone() }),
            },
        };
        let mut task = MigrationTask::new(&self.task_name(), spec);
        task.metadata.namespace = Some(namespace.to_string());
        task
    }

    /// The resource a MigrationTask refers to.
    pub fn from_task(task: &MigrationTask) -> Option<Self> {
        if let Some(pool) = &task.spec.cstor_pool {
            Some(Self::pool(&pool.spc_name, Some(&pool.rename)))
        } else {
            task.spec
                .cstor_volume
                .as_ref()
                .map(|volume| Self::Volume {
                    pv: volume.pv_name.clone(),
                })
        }
    }

    /// Check that the migration can be attempted.
    pub fn validate(&self) -> Result<(), Error> {
        let (name, what) = match self {
            Self::Pool { spc, .. } => (spc, "cstor spc name"),
            Self::Volume { pv } => (pv, "cstor pv name"),
        };
        if name.trim().is_empty() {
            return Err(Error::Precondition {
                message: format!("Cannot execute migrate job: {what} is missing"),
            });
        }
        Ok(())
    }
}

/// Settings shared by the pool and volume migrations.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Namespace of the OpenEBS control plane.
    pub namespace: String,
    /// Version of this job, the CSI operators must run the same release.
    pub current_version: String,
    /// Whether the run is driven by a MigrationTask, in which case the task must be recorded.
    pub task_job: bool,
    /// How long to wait for workloads to scale or roll out.
    pub rollout: RetryPolicy,
    /// How long to wait for the operators to reconcile the migrated resources.
    pub convergence: RetryPolicy,
}

impl MigrationConfig {
    /// Check that a migration can be attempted.
    pub fn validate(&self) -> Result<(), Error> {
        if self.namespace.trim().is_empty() {
            return Err(Error::Precondition {
                message: "Cannot execute migrate job: openebs namespace is missing".to_string(),
            });
        }
        Ok(())
    }
}

/// Migrate the pool or volume.
pub async fn migrate(
    client: &Client,
    config: &MigrationConfig,
    target: &MigrationTarget,
) -> Result<(), Error> {
    config.validate()?;
    target.validate()?;
    match target {
        MigrationTarget::Pool { spc, cspc } => {
            info!(spc, cspc, "Migrating spc to cspc");
            pool::PoolMigration::new(client, config, spc, cspc)
                .run()
                .await?;
            info!(spc, cspc, "Successfully migrated spc to cspc");
            info!(
                "Make sure to migrate the associated PVs, to list CStorVolumes for the PVs which \
                 are pending migration use `kubectl get cstorvolume.openebs.io -n {ns}`, and to \
                 list CStorVolumes for the migrated/CSI PVs use \
                 `kubectl get cstorvolume.cstor.openebs.io -n {ns}`",
                ns = config.namespace
            );
        }
        MigrationTarget::Volume { pv } => {
            info!(pv, "Migrating volume to csi spec");
            volume::VolumeMigration::new(client, config, pv).run().await?;
            info!(
                pv,
                "Successfully migrated volume, scale up the application to verify the migration"
            );
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn config() -> MigrationConfig {
        MigrationConfig {
            namespace: "openebs".to_string(),
            current_version: "2.0.0".to_string(),
            task_job: false,
            rollout: RetryPolicy::rollout(),
            convergence: RetryPolicy::convergence(),
        }
    }

    #[test]
    fn targets() {
        let pool = MigrationTarget::pool("sparse-claim", Some(" "));
        assert_eq!(
            pool,
            MigrationTarget::Pool {
                spc: "sparse-claim".to_string(),
                cspc: "sparse-claim".to_string()
            }
        );
        assert_eq!(pool.task_name(), "migrate-cstor-pool-sparse-claim");

        let task = MigrationTarget::pool("sparse-claim", Some("cstor-disk")).migration_task("openebs");
        assert_eq!(task.spec.cstor_pool.as_ref().unwrap().rename, "cstor-disk");
        assert_eq!(
            MigrationTarget::from_task(&task),
            Some(MigrationTarget::pool("sparse-claim", Some("cstor-disk")))
        );

        let volume = MigrationTarget::Volume { pv: String::new() };
        assert_eq!(
            volume.validate().unwrap_err().to_string(),
            "Cannot execute migrate job: cstor pv name is missing"
        );
        let mut config = config();
        config.namespace = String::new();
        assert!(config.validate().is_err());
    }
}
