use super::{
    backup_restore::{migrate_backups, PoolRelabel},
    bd_correction::BlockDeviceCorrector,
    cspc_generator::CspcGenerator,
    MigrationConfig, MigrationTarget, MIGRATE, PRE_MIGRATION,
};
use crate::{
    common::{
        client::{controller_ref, get_one, get_opt, list, merge_patch, selector, strategic_patch},
        constants::{
            CSPC_FINALIZER, CSPC_KIND, CSPC_LABEL, CSPC_OPERATOR, CSPI_HOSTNAME_LABEL,
            CSPI_NAME_LABEL, CSPI_UID_LABEL, CSP_DEPLOY_LABEL, CSP_HOSTNAME_LABEL, CSP_NAME_LABEL,
            CSP_UID_LABEL, HOSTNAME_LABEL, IMPORT_POOL_ANNOTATION, MIGRATED_FROM_ANNOTATION,
            RECONCILE_DISABLE_ANNOTATION, SKIP_VALIDATIONS_ANNOTATION, SPC_FINALIZER, SPC_LABEL,
        },
        patch::{diff, strategic_diff},
        retry::{poll, retry_on_conflict, RetryPolicy},
        version::validate_operator_release,
    },
    crd::{
        cstor::{CStorPoolCluster, CStorPoolInstance, CStorPoolInstanceStatus},
        legacy::{CStorPool, CStorVolumeReplica, StoragePoolClaim},
        ndm::BlockDeviceClaim,
    },
    error::{Error, StepContext},
    ledger::Ledger,
};
use k8s_openapi::api::{apps::v1::Deployment, core::v1::Pod};
use kube::{
    api::{DeleteParams, PostParams},
    Api, Client, ResourceExt,
};
use std::collections::BTreeMap;
use tracing::info;

/// Phase of a pool instance which imported its pool.
const CSPI_ONLINE: &str = "ONLINE";
/// Phase a pool instance is set to before it imports the legacy pool.
const CSPI_OFFLINE: &str = "OFFLINE";

/// Check that the existing CSPC, if any, was migrated from the SPC under the requested name.
/// Returns the CSPC name to record on the SPC when it has none yet.
pub fn check_cspc_name(
    spc: &StoragePoolClaim,
    cspc_name: &str,
    cspc: Option<&CStorPoolCluster>,
) -> Result<Option<String>, Error> {
    let spc_name = spc.name_any();
    let recorded = spc
        .annotations()
        .get(CSPC_LABEL)
        .map(String::as_str)
        .unwrap_or_default();
    let conflict = || Error::NamingConflict {
        message: format!(
            "failed to validate migration: the spc {spc_name} is set to be renamed as \
             {recorded}, but got cspc-name {cspc_name} instead"
        ),
    };
    match cspc {
        Some(cspc) => {
            let migrated_from = cspc.annotations().get(MIGRATED_FROM_ANNOTATION);
            if recorded == cspc_name && migrated_from == Some(&spc_name) {
                Ok(None)
            } else {
                Err(conflict())
            }
        }
        None if recorded.is_empty() => Ok(Some(cspc_name.to_string())),
        None if recorded != cspc_name => Err(conflict()),
        None => Ok(None),
    }
}

/// With the SPC gone, a previous run completed the migration: the SPC is deleted last, and
/// only after the CSPC it was migrated into exists.
pub fn check_migrated(
    spc_name: &str,
    cspc_name: &str,
    cspc: Option<&CStorPoolCluster>,
) -> Result<(), Error> {
    let Some(cspc) = cspc else {
        return Err(Error::Precondition {
            message: format!("cspc {cspc_name} not found, and spc {spc_name} no longer exists"),
        });
    };
    match cspc.annotations().get(MIGRATED_FROM_ANNOTATION) {
        Some(migrated_from) if migrated_from == spc_name => Ok(()),
        _ => Err(Error::NamingConflict {
            message: format!("cspc {cspc_name} was not migrated from spc {spc_name}"),
        }),
    }
}

/// Check that the pools of the SPC match its spec: one pool per requested pool when the claim
/// selects its devices on its own, or exactly the listed block devices otherwise.
pub fn validate_spc(spc: &StoragePoolClaim, csps: &[CStorPool]) -> Result<(), Error> {
    let Some(devices) = spc.spec.block_devices.block_device_list.as_ref() else {
        let max_pools = spc.spec.max_pools.ok_or_else(|| Error::Precondition {
            message: format!(
                "invalid spc {} neither has bdc list nor maxpools",
                spc.name_any()
            ),
        })?;
        if max_pools != csps.len() as i64 {
            return Err(Error::Precondition {
                message: format!(
                    "maxpool count does not match csp count expected: {max_pools} got: {}",
                    csps.len()
                ),
            });
        }
        return Ok(());
    };
    let mut counts = BTreeMap::<&str, usize>::new();
    let pool_devices = csps
        .iter()
        .flat_map(|csp| csp.spec.group.iter())
        .flat_map(|group| group.item.iter())
        .map(|bd| bd.name.as_str());
    for name in devices.iter().map(String::as_str).chain(pool_devices) {
        *counts.entry(name).or_default() += 1;
    }
    // Each device is listed once by the claim and once by its pool.
    match counts.into_iter().find(|(_, count)| *count != 2) {
        Some((name, _)) => Err(Error::Precondition {
            message: format!("bd {name} is not configured properly"),
        }),
        None => Ok(()),
    }
}

/// Move the claim from the SPC to the CSPC, returns false if it is not held by the SPC.
pub fn relabel_claim(bdc: &mut BlockDeviceClaim, cspc_name: &str) -> bool {
    if bdc
        .labels()
        .get(SPC_LABEL)
        .map_or(true, |spc| spc.is_empty())
    {
        return false;
    }
    bdc.labels_mut().remove(SPC_LABEL);
    bdc.labels_mut()
        .insert(CSPC_LABEL.to_string(), cspc_name.to_string());
    for finalizer in bdc.finalizers_mut().iter_mut() {
        if finalizer == SPC_FINALIZER {
            *finalizer = CSPC_FINALIZER.to_string();
        }
    }
    true
}

/// Point the replica at the pool instance which imported its pool, returns false if it
/// already was.
pub fn relabel_replica(cvr: &mut CStorVolumeReplica, cspi: &CStorPoolInstance) -> bool {
    if cvr
        .labels()
        .get(CSPI_NAME_LABEL)
        .map_or(false, |name| !name.is_empty())
    {
        return false;
    }
    let labels = cvr.labels_mut();
    labels.remove(CSP_NAME_LABEL);
    labels.remove(CSP_UID_LABEL);
    labels.insert(CSPI_NAME_LABEL.to_string(), cspi.name_any());
    labels.insert(CSPI_UID_LABEL.to_string(), cspi.uid().unwrap_or_default());
    let annotations = cvr.annotations_mut();
    annotations.remove(CSP_HOSTNAME_LABEL);
    annotations.insert(CSPI_HOSTNAME_LABEL.to_string(), cspi.spec.host_name.clone());
    true
}

/// Let the pool instance import the pool of the legacy pool.
fn import_pool(cspi: &mut CStorPoolInstance, csp: &CStorPool) {
    cspi.annotations_mut().insert(
        IMPORT_POOL_ANNOTATION.to_string(),
        format!("cstor-{}", csp.uid().unwrap_or_default()),
    );
    cspi.annotations_mut().remove(RECONCILE_DISABLE_ANNOTATION);
    cspi.status
        .get_or_insert_with(CStorPoolInstanceStatus::default)
        .phase = CSPI_OFFLINE.to_string();
}

/// Migrates a StoragePoolClaim and its CStorPools to a CStorPoolCluster and its
/// CStorPoolInstances, importing the existing pools.
pub struct PoolMigration<'a> {
    client: &'a Client,
    config: &'a MigrationConfig,
    spc_name: String,
    cspc_name: String,
}

impl<'a> PoolMigration<'a> {
    /// A new migration of the SPC to the CSPC with the given name.
    pub fn new(client: &'a Client, config: &'a MigrationConfig, spc: &str, cspc: &str) -> Self {
        Self {
            client,
            config,
            spc_name: spc.to_string(),
            cspc_name: cspc.to_string(),
        }
    }

    fn namespace(&self) -> &str {
        &self.config.namespace
    }

    /// Run the migration, recording it into its MigrationTask.
    #[tracing::instrument(skip(self), fields(spc = %self.spc_name, cspc = %self.cspc_name))]
    pub async fn run(&self) -> Result<(), Error> {
        let target = MigrationTarget::pool(&self.spc_name, Some(&self.cspc_name));
        let mut ledger = Ledger::get_or_create(
            self.client,
            self.namespace(),
            target.migration_task(self.namespace()),
            self.config.task_job,
        )
        .await?;
        ledger
            .run_step(
                PRE_MIGRATION,
                "Pre-migration steps were successful",
                self.pre_migrate(),
            )
            .await?;
        ledger
            .run_step(MIGRATE, "Migration steps were successful", self.migrate())
            .await
    }

    async fn pre_migrate(&self) -> Result<(), Error> {
        validate_operator_release(
            self.client,
            CSPC_OPERATOR,
            self.namespace(),
            &self.config.current_version,
        )
        .await
        .step(PRE_MIGRATION, "error validating cspc operator")?;
        self.check_for_existing_cspc()
            .await
            .step(PRE_MIGRATION, "error while checking for existing cspc")?;
        BlockDeviceCorrector {
            client: self.client,
            namespace: self.namespace(),
            spc_name: &self.spc_name,
            cspc_name: &self.cspc_name,
            policy: self.config.convergence,
        }
        .correct()
        .await
        .step(PRE_MIGRATION, "error while correcting incorrect bds in spc")
    }

    async fn check_for_existing_cspc(&self) -> Result<(), Error> {
        let spc_api: Api<StoragePoolClaim> = Api::all(self.client.clone());
        let Some(spc) = get_opt(&spc_api, &self.spc_name).await? else {
            return Ok(());
        };
        let cspc_api: Api<CStorPoolCluster> = Api::namespaced(self.client.clone(), self.namespace());
        let cspc = get_opt(&cspc_api, &self.cspc_name).await?;
        let Some(name) = check_cspc_name(&spc, &self.cspc_name, cspc.as_ref())? else {
            return Ok(());
        };
        retry_on_conflict(RetryPolicy::conflict(), || async {
            let mut spc = spc_api.get(&self.spc_name).await?;
            spc.annotations_mut()
                .insert(CSPC_LABEL.to_string(), name.clone());
            spc_api
                .replace(&self.spc_name, &PostParams::default(), &spc)
                .await?;
            Ok::<_, Error>(())
        })
        .await
    }

    async fn migrate(&self) -> Result<(), Error> {
        let spc_name = &self.spc_name;
        let spc_api: Api<StoragePoolClaim> = Api::all(self.client.clone());
        let Some(spc) = get_opt(&spc_api, spc_name)
            .await
            .step(MIGRATE, &format!("error checking migration status of spc {spc_name}"))?
        else {
            // The SPC is deleted last, so an existing CSPC means the migration completed.
            let cspc_api: Api<CStorPoolCluster> =
                Api::namespaced(self.client.clone(), self.namespace());
            let message = format!(
                "failed to get equivalent cspc {} for spc {spc_name}",
                self.cspc_name
            );
            let cspc = get_opt(&cspc_api, &self.cspc_name)
                .await
                .step(MIGRATE, &message)?;
            check_migrated(spc_name, &self.cspc_name, cspc.as_ref()).step(MIGRATE, &message)?;
            info!(spc = %spc_name, "spc is already migrated to cspc");
            return Ok(());
        };

        let csp_api: Api<CStorPool> = Api::all(self.client.clone());
        let csps = list(&csp_api, &selector(SPC_LABEL, spc_name))
            .await
            .step(MIGRATE, &format!("failed to validate spc {spc_name}"))?;
        validate_spc(&spc, &csps).step(MIGRATE, &format!("failed to validate spc {spc_name}"))?;
        self.update_bdc_labels(&spc).await.step(
            MIGRATE,
            &format!("failed to update bdc labels for spc {spc_name}"),
        )?;

        info!(cspc = %self.cspc_name, spc = %spc_name, "Creating equivalent cspc for spc");
        let cspc = CspcGenerator {
            client: self.client,
            namespace: self.namespace(),
            spc_name,
            cspc_name: &self.cspc_name,
            policy: self.config.convergence,
        }
        .generate()
        .await
        .step(
            MIGRATE,
            &format!("failed to create equivalent cspc for spc {spc_name}"),
        )?;
        self.update_bdc_owner_ref(&cspc)
            .await
            .step(MIGRATE, "failed to update bdc with cspc ownerReference")?;

        let cspi_api: Api<CStorPoolInstance> = Api::namespaced(self.client.clone(), self.namespace());
        let cspis = list(&cspi_api, &selector(CSPC_LABEL, &cspc.name_any()))
            .await
            .step(MIGRATE, &format!("failed to list cspi for cspc {}", self.cspc_name))?;
        for cspi in cspis {
            let name = cspi.name_any();
            self.csp_to_cspi(cspi)
                .await
                .step(MIGRATE, &format!("failed to migrate cspi {name}"))?;
        }

        retry_on_conflict(RetryPolicy::conflict(), || async {
            let mut spc = spc_api.get(spc_name).await?;
            spc.annotations_mut()
                .insert(SKIP_VALIDATIONS_ANNOTATION.to_string(), "true".to_string());
            spc_api
                .replace(spc_name, &PostParams::default(), &spc)
                .await?;
            Ok::<_, Error>(())
        })
        .await
        .step(
            MIGRATE,
            &format!("failed to add skip-validation annotation to spc {spc_name}"),
        )?;
        spc_api
            .delete(spc_name, &DeleteParams::default())
            .await
            .step(MIGRATE, &format!("failed to clean up spc {spc_name}"))?;
        Ok(())
    }

    async fn update_bdc_labels(&self, spc: &StoragePoolClaim) -> Result<(), Error> {
        let api: Api<BlockDeviceClaim> = Api::namespaced(self.client.clone(), self.namespace());
        for mut bdc in list(&api, &selector(SPC_LABEL, &spc.name_any())).await? {
            if relabel_claim(&mut bdc, &self.cspc_name) {
                let name = bdc.name_any();
                info!(bdc = %name, "Updating bdc with cspc labels & finalizer");
                api.replace(&name, &PostParams::default(), &bdc)
                    .await
                    .step(
                        MIGRATE,
                        &format!("failed to update bdc {name} with cspc label & finalizer"),
                    )?;
            }
        }
        Ok(())
    }

    async fn update_bdc_owner_ref(&self, cspc: &CStorPoolCluster) -> Result<(), Error> {
        let api: Api<BlockDeviceClaim> = Api::namespaced(self.client.clone(), self.namespace());
        let owner = controller_ref(cspc)?;
        for mut bdc in list(&api, &selector(CSPC_LABEL, &cspc.name_any())).await? {
            let owned = bdc
                .owner_references()
                .first()
                .map_or(false, |owner| owner.kind == CSPC_KIND);
            if owned {
                continue;
            }
            let name = bdc.name_any();
            info!(bdc = %name, cspc = %cspc.name_any(), "Updating bdc with cspc ownerRef");
            bdc.metadata.owner_references = Some(vec![owner.clone()]);
            api.replace(&name, &PostParams::default(), &bdc)
                .await
                .step(MIGRATE, &format!("failed to update bdc {name} with cspc onwerRef"))?;
        }
        Ok(())
    }

    /// Hand the pool of the CSP on the node of the CSPI over to the CSPI.
    async fn csp_to_cspi(&self, mut cspi: CStorPoolInstance) -> Result<(), Error> {
        let cspi_api: Api<CStorPoolInstance> = Api::namespaced(self.client.clone(), self.namespace());
        let csp_api: Api<CStorPool> = Api::all(self.client.clone());
        let hostname = cspi
            .labels()
            .get(HOSTNAME_LABEL)
            .cloned()
            .unwrap_or_default();
        let csp_selector = format!(
            "{},{}",
            selector(HOSTNAME_LABEL, &hostname),
            selector(SPC_LABEL, &self.spc_name)
        );
        let csp = get_one(&csp_api, &csp_selector).await?;
        let cspi_name = cspi.name_any();

        if cspi
            .annotations()
            .get(RECONCILE_DISABLE_ANNOTATION)
            .map_or(false, |value| !value.is_empty())
        {
            info!(csp = %csp.name_any(), cspi = %cspi_name, "Migrating csp to cspi");
            self.scale_down_csp(&csp.name_any(), &cspi_name).await?;
            import_pool(&mut cspi, &csp);
            cspi = cspi_api
                .replace(&cspi_name, &PostParams::default(), &cspi)
                .await?;
        }
        let cspi = poll(
            self.config.convergence,
            &format!("cspi {cspi_name} to come to ONLINE state"),
            || cspi_online(&cspi_api, &cspi_name),
        )
        .await?;

        self.update_cvr_labels(&csp, &cspi).await?;
        let relabel = PoolRelabel {
            cspi_name: cspi_name.clone(),
            cspi_uid: cspi.uid().unwrap_or_default(),
        };
        migrate_backups(
            self.client,
            self.namespace(),
            &selector(CSP_UID_LABEL, &csp.uid().unwrap_or_default()),
            Some(&relabel),
        )
        .await?;

        // The legacy pool pod is gone, so nothing else removes the finalizers of the CSP.
        let mut released = csp.clone();
        released.metadata.finalizers = Some(vec![]);
        merge_patch(&csp_api, &csp.name_any(), diff(&csp, &released)?).await?;
        Ok(())
    }

    /// Scale the legacy pool deployment down, sharing the volumes of the pool instance
    /// deployment so that both use the same zrepl lock file.
    async fn scale_down_csp(&self, csp_name: &str, cspi_name: &str) -> Result<(), Error> {
        info!(csp = csp_name, "Scaling down csp deployment");
        let deploy_api: Api<Deployment> = Api::namespaced(self.client.clone(), self.namespace());
        let csp_deploy = get_one(&deploy_api, &selector(CSP_DEPLOY_LABEL, csp_name)).await?;
        let cspi_deploy = deploy_api.get(cspi_name).await?;

        let mut scaled = csp_deploy.clone();
        if let Some(spec) = scaled.spec.as_mut() {
            spec.replicas = Some(0);
            if let Some(pod) = spec.template.spec.as_mut() {
                pod.volumes = cspi_deploy
                    .spec
                    .as_ref()
                    .and_then(|s| s.template.spec.as_ref())
                    .and_then(|s| s.volumes.clone());
            }
        }
        strategic_patch(
            &deploy_api,
            &csp_deploy.name_any(),
            strategic_diff(&csp_deploy, &scaled)?,
        )
        .await?;

        let pod_api: Api<Pod> = Api::namespaced(self.client.clone(), self.namespace());
        let pods = selector(CSP_DEPLOY_LABEL, csp_name);
        poll(
            self.config.rollout,
            &format!("csp {csp_name} deployment to scale down"),
            || async {
                let remaining = list(&pod_api, &pods).await?.len();
                Ok::<_, Error>((remaining == 0).then_some(()))
            },
        )
        .await
    }

    async fn update_cvr_labels(&self, csp: &CStorPool, cspi: &CStorPoolInstance) -> Result<(), Error> {
        let api: Api<CStorVolumeReplica> = Api::namespaced(self.client.clone(), self.namespace());
        for mut cvr in list(&api, &selector(CSP_NAME_LABEL, &csp.name_any())).await? {
            if relabel_replica(&mut cvr, cspi) {
                let name = cvr.name_any();
                info!(cvr = %name, cspi = %cspi.name_any(), "Updating cvr with cspi info");
                api.replace(&name, &PostParams::default(), &cvr)
                    .await
                    .step(MIGRATE, &format!("failed to update cvr {name} with cspc info"))?;
            }
        }
        Ok(())
    }
}

async fn cspi_online(
    api: &Api<CStorPoolInstance>,
    name: &str,
) -> Result<Option<CStorPoolInstance>, Error> {
    let cspi = api.get(name).await?;
    if cspi.phase() == CSPI_ONLINE {
        return Ok(Some(cspi));
    }
    info!(cspi = name, phase = cspi.phase(), "Waiting for cspi to come to ONLINE state");
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{
        legacy::{
            BlockDeviceAttr, BlockDeviceGroup, CStorPoolSpec, CStorVolumeReplicaSpec,
            CspBlockDevice, StoragePoolClaimSpec,
        },
        ndm::BlockDeviceClaimSpec,
    };
    use kube::api::ObjectMeta;

    fn spc(devices: Option<&[&str]>, max_pools: Option<i64>) -> StoragePoolClaim {
        StoragePoolClaim::new(
            "cstor-disk",
            StoragePoolClaimSpec {
                max_pools,
                block_devices: BlockDeviceAttr {
                    block_device_list: devices
                        .map(|names| names.iter().map(ToString::to_string).collect()),
                },
                ..Default::default()
            },
        )
    }

    fn csp(devices: &[&str]) -> CStorPool {
        CStorPool::new(
            "cstor-disk-abcd",
            CStorPoolSpec {
                group: vec![BlockDeviceGroup {
                    item: devices
                        .iter()
                        .map(|name| CspBlockDevice {
                            name: name.to_string(),
                            ..Default::default()
                        })
                        .collect(),
                }],
                ..Default::default()
            },
        )
    }

    #[test]
    fn spc_validation() {
        let pools = [csp(&["bd-1"]), csp(&["bd-2"])];
        assert!(validate_spc(&spc(Some(&["bd-1", "bd-2"]), None), &pools).is_ok());
        assert_eq!(
            validate_spc(&spc(Some(&["bd-1", "bd-3"]), None), &pools)
                .unwrap_err()
                .to_string(),
            "bd bd-2 is not configured properly"
        );

        assert!(validate_spc(&spc(None, Some(2)), &pools).is_ok());
        assert_eq!(
            validate_spc(&spc(None, Some(3)), &pools)
                .unwrap_err()
                .to_string(),
            "maxpool count does not match csp count expected: 3 got: 2"
        );
        assert_eq!(
            validate_spc(&spc(None, None), &pools)
                .unwrap_err()
                .to_string(),
            "invalid spc cstor-disk neither has bdc list nor maxpools"
        );
    }

    #[test]
    fn cspc_naming() {
        let mut claim = spc(None, Some(1));
        assert_eq!(
            check_cspc_name(&claim, "cstor-cspc", None).unwrap(),
            Some("cstor-cspc".to_string())
        );

        claim
            .annotations_mut()
            .insert(CSPC_LABEL.to_string(), "cstor-cspc".to_string());
        assert_eq!(check_cspc_name(&claim, "cstor-cspc", None).unwrap(), None);
        assert_eq!(
            check_cspc_name(&claim, "other", None)
                .unwrap_err()
                .to_string(),
            "failed to validate migration: the spc cstor-disk is set to be renamed as \
             cstor-cspc, but got cspc-name other instead"
        );

        let mut cspc = CStorPoolCluster::default();
        cspc.metadata.name = Some("cstor-cspc".to_string());
        assert!(check_cspc_name(&claim, "cstor-cspc", Some(&cspc)).is_err());
        cspc.annotations_mut()
            .insert(MIGRATED_FROM_ANNOTATION.to_string(), "cstor-disk".to_string());
        assert_eq!(
            check_cspc_name(&claim, "cstor-cspc", Some(&cspc)).unwrap(),
            None
        );
    }

    #[test]
    fn completed_migration() {
        assert!(check_migrated("cstor-disk", "cstor-cspc", None).is_err());

        let mut cspc = CStorPoolCluster::default();
        cspc.metadata.name = Some("cstor-cspc".to_string());
        assert!(matches!(
            check_migrated("cstor-disk", "cstor-cspc", Some(&cspc)),
            Err(Error::NamingConflict { .. })
        ));
        cspc.annotations_mut()
            .insert(MIGRATED_FROM_ANNOTATION.to_string(), "cstor-disk".to_string());
        assert!(check_migrated("cstor-disk", "cstor-cspc", Some(&cspc)).is_ok());
        assert!(check_migrated("cstor-sparse", "cstor-cspc", Some(&cspc)).is_err());
    }

    #[test]
    fn claims_move_to_cspc() {
        let mut bdc = BlockDeviceClaim::new("bdc-1", BlockDeviceClaimSpec::default());
        assert!(!relabel_claim(&mut bdc, "cstor-cspc"));

        bdc.metadata = ObjectMeta {
            name: Some("bdc-1".to_string()),
            labels: Some(
                [(SPC_LABEL.to_string(), "cstor-disk".to_string())]
                    .into_iter()
                    .collect(),
            ),
            finalizers: Some(vec![SPC_FINALIZER.to_string(), "other".to_string()]),
            ..Default::default()
        };
        assert!(relabel_claim(&mut bdc, "cstor-cspc"));
        assert!(!bdc.labels().contains_key(SPC_LABEL));
        assert_eq!(bdc.labels()[CSPC_LABEL], "cstor-cspc");
        assert_eq!(bdc.finalizers(), [CSPC_FINALIZER.to_string(), "other".to_string()]);
    }

    #[test]
    fn replicas_move_to_cspi() {
        let mut cspi = CStorPoolInstance::default();
        cspi.metadata.name = Some("cstor-cspc-xyz".to_string());
        cspi.metadata.uid = Some("cspi-uid".to_string());
        cspi.spec.host_name = "node-1".to_string();

        let mut cvr = CStorVolumeReplica::new("pvc-1-cstor-disk-abcd", CStorVolumeReplicaSpec::default());
        cvr.labels_mut()
            .insert(CSP_NAME_LABEL.to_string(), "cstor-disk-abcd".to_string());
        cvr.labels_mut()
            .insert(CSP_UID_LABEL.to_string(), "csp-uid".to_string());
        cvr.annotations_mut()
            .insert(CSP_HOSTNAME_LABEL.to_string(), "node-1".to_string());

        assert!(relabel_replica(&mut cvr, &cspi));
        assert_eq!(cvr.labels()[CSPI_NAME_LABEL], "cstor-cspc-xyz");
        assert_eq!(cvr.labels()[CSPI_UID_LABEL], "cspi-uid");
        assert!(!cvr.labels().contains_key(CSP_UID_LABEL));
        assert_eq!(cvr.annotations()[CSPI_HOSTNAME_LABEL], "node-1");
        assert!(!relabel_replica(&mut cvr, &cspi));
    }

    #[test]
    fn pool_import() {
        let mut cspi = CStorPoolInstance::default();
        cspi.annotations_mut()
            .insert(RECONCILE_DISABLE_ANNOTATION.to_string(), "true".to_string());
        let mut csp = csp(&["bd-1"]);
        csp.metadata.uid = Some("1234".to_string());
        import_pool(&mut cspi, &csp);
        assert_eq!(cspi.annotations()[IMPORT_POOL_ANNOTATION], "cstor-1234");
        assert!(!cspi.annotations().contains_key(RECONCILE_DISABLE_ANNOTATION));
        assert_eq!(cspi.phase(), CSPI_OFFLINE);
    }
}
