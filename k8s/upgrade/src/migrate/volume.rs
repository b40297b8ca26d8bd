use super::{
    snapshot::SnapshotMigrator, volume_policy::create_policy_for_class, MigrationConfig,
    MigrationTarget, MIGRATE, PRE_MIGRATION,
};
use crate::{
    common::{
        client::{
            controller_ref, create_if_missing, delete_if_exists, get_opt, list, merge_patch,
            selector, strategic_patch,
        },
        constants::{
            CAS_TYPE_LABEL, CSI_PROVISIONER_IDENTITY_KEY, CSPC_LABEL, CSPI_NAME_LABEL,
            CSTOR_CAS_TYPE, CSTOR_CSI_DRIVER, CVC_FINALIZER, CVC_OPERATOR, FS_TYPE_LABEL,
            OPENEBS_VERSION_LABEL, PROVISIONED_BY_ANNOTATION, PVC_LABEL, PV_LABEL,
            SKIP_VALIDATIONS_ANNOTATION, SNAPSHOT_ANNOTATION, SOURCE_VOLUME_ANNOTATION,
            STORAGE_ENGINE_LABEL, STORAGE_PROVISIONER_ANNOTATION, TARGET_SERVICE_LABEL,
            TARGET_SERVICE_VALUE, TMP_SC_PREFIX, TMP_SC_PV_ANNOTATION, VOLUME_ID_ANNOTATION,
            VOLUME_POLICY_LABEL,
        },
        patch::{diff, strategic_diff},
        retry::poll,
        version::validate_operator_release,
    },
    crd::{
        cstor::{self, CStorVolumeConfig, CStorVolumePolicy, ReplicaPoolInfo, TargetSpec},
        legacy,
    },
    error::{is_already_exists, Error, StepContext},
    ledger::Ledger,
};
use chrono::{DateTime, Utc};
use k8s_openapi::{
    api::{
        apps::v1::Deployment,
        core::v1::{
            CSIPersistentVolumeSource, ObjectReference, PersistentVolume,
            PersistentVolumeClaim, PersistentVolumeClaimSpec, PersistentVolumeSpec, Pod,
            ResourceRequirements, Service, ServicePort, ServiceSpec,
        },
        storage::v1::StorageClass,
    },
    apimachinery::pkg::{api::resource::Quantity, util::intstr::IntOrString},
};
use kube::{
    api::{ObjectMeta, PostParams},
    Api, Client, ResourceExt,
};
use std::collections::BTreeMap;
use tracing::info;

/// Container of the legacy target deployment running istgt.
const TARGET_CONTAINER: &str = "cstor-istgt";
/// Phase of a CVC whose volume is provisioned.
const CVC_BOUND: &str = "Bound";
/// Phase of a CV whose replicas are all healthy.
const CV_HEALTHY: &str = "Healthy";
/// Storage class parameter naming the pool cluster of the provisioned volumes.
const CSPC_PARAMETER: &str = "cstorPoolCluster";

/// Name of the target deployment of the volume.
fn target_deployment(pv: &str) -> String {
    format!("{pv}-target")
}

/// The identity the csi provisioner stamps on the volumes it provisions.
pub fn provisioner_identity(now: DateTime<Utc>) -> String {
    format!(
        "{}-{}-{CSTOR_CSI_DRIVER}",
        now.timestamp_millis(),
        now.timestamp_subsec_nanos() % 10000
    )
}

/// The pool cluster of a pool instance, whose name is the cluster name and a suffix.
pub fn cspc_of_cspi(cspi: &str) -> &str {
    cspi.rsplit_once('-').map_or(cspi, |(cspc, _)| cspc)
}

fn storage(quantity: Quantity) -> BTreeMap<String, Quantity> {
    [("storage".to_string(), quantity)].into_iter().collect()
}

fn claim_ref(pvc: &PersistentVolumeClaim) -> ObjectReference {
    ObjectReference {
        api_version: Some("v1".to_string()),
        kind: Some("PersistentVolumeClaim".to_string()),
        name: Some(pvc.name_any()),
        namespace: pvc.namespace(),
        ..Default::default()
    }
}

fn csi_source(volume: &str, fs_type: Option<String>, identity: &str) -> CSIPersistentVolumeSource {
    CSIPersistentVolumeSource {
        driver: CSTOR_CSI_DRIVER.to_string(),
        fs_type,
        volume_handle: volume.to_string(),
        volume_attributes: Some(
            [
                (CAS_TYPE_LABEL.to_string(), CSTOR_CAS_TYPE.to_string()),
                (CSI_PROVISIONER_IDENTITY_KEY.to_string(), identity.to_string()),
            ]
            .into_iter()
            .collect(),
        ),
        ..Default::default()
    }
}

fn reclaim_policy(class: &StorageClass) -> String {
    class
        .reclaim_policy
        .clone()
        .unwrap_or_else(|| "Delete".to_string())
}

/// The CSI claim equivalent to the claim of the legacy volume.
pub fn csi_pvc(pv: &PersistentVolume, name: &str, namespace: &str) -> PersistentVolumeClaim {
    let spec = pv.spec.clone().unwrap_or_default();
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            annotations: Some(
                [(
                    STORAGE_PROVISIONER_ANNOTATION.to_string(),
                    CSTOR_CSI_DRIVER.to_string(),
                )]
                .into_iter()
                .collect(),
            ),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: spec.access_modes,
            resources: Some(ResourceRequirements {
                requests: spec.capacity,
                ..Default::default()
            }),
            storage_class_name: spec.storage_class_name,
            volume_mode: spec.volume_mode,
            volume_name: Some(pv.name_any()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// The CSI volume equivalent to the iSCSI volume.
pub fn csi_pv(
    pv: &PersistentVolume,
    pvc: &PersistentVolumeClaim,
    class: &StorageClass,
    identity: &str,
) -> PersistentVolume {
    let spec = pv.spec.clone().unwrap_or_default();
    let fs_type = spec.iscsi.as_ref().and_then(|iscsi| iscsi.fs_type.clone());
    PersistentVolume {
        metadata: ObjectMeta {
            name: Some(pv.name_any()),
            annotations: Some(
                [(
                    PROVISIONED_BY_ANNOTATION.to_string(),
                    CSTOR_CSI_DRIVER.to_string(),
                )]
                .into_iter()
                .collect(),
            ),
            ..Default::default()
        },
        spec: Some(PersistentVolumeSpec {
            access_modes: spec.access_modes,
            claim_ref: Some(claim_ref(pvc)),
            capacity: spec.capacity,
            csi: Some(csi_source(&pv.name_any(), fs_type, identity)),
            persistent_volume_reclaim_policy: Some(reclaim_policy(class)),
            storage_class_name: spec.storage_class_name,
            volume_mode: spec.volume_mode,
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// The CSI volume of a claim whose volume is gone, rebuilt from its legacy CV.
pub fn csi_pv_from_cv(
    cv: &legacy::CStorVolume,
    pvc: &PersistentVolumeClaim,
    class: &StorageClass,
    identity: &str,
) -> PersistentVolume {
    let pvc_spec = pvc.spec.clone().unwrap_or_default();
    let fs_type = cv.annotations().get(FS_TYPE_LABEL).cloned();
    PersistentVolume {
        metadata: ObjectMeta {
            name: Some(cv.name_any()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeSpec {
            access_modes: pvc_spec.access_modes,
            claim_ref: Some(claim_ref(pvc)),
            capacity: Some(storage(Quantity(cv.spec.capacity.clone()))),
            csi: Some(csi_source(&cv.name_any(), fs_type, identity)),
            persistent_volume_reclaim_policy: Some(reclaim_policy(class)),
            storage_class_name: Some(class.name_any()),
            volume_mode: pvc_spec.volume_mode,
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// The CSI storage class with the name of the legacy class, built from its temporary copy.
pub fn csi_storage_class(
    tmp: &StorageClass,
    name: &str,
    replica_count: i32,
    cspc: &str,
) -> StorageClass {
    let mut annotations = tmp.annotations().clone();
    annotations.remove(TMP_SC_PV_ANNOTATION);
    StorageClass {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            annotations: Some(annotations),
            labels: tmp.metadata.labels.clone(),
            ..Default::default()
        },
        provisioner: CSTOR_CSI_DRIVER.to_string(),
        allow_volume_expansion: Some(true),
        parameters: Some(
            [
                ("cas-type".to_string(), CSTOR_CAS_TYPE.to_string()),
                ("replicaCount".to_string(), replica_count.to_string()),
                (CSPC_PARAMETER.to_string(), cspc.to_string()),
            ]
            .into_iter()
            .collect(),
        ),
        ..tmp.clone()
    }
}

/// The target service of the volume in the OpenEBS namespace.
pub fn target_service(
    pv: &str,
    namespace: &str,
    cv: &legacy::CStorVolume,
    version: &str,
) -> Service {
    let port = |name: &str, port: i32| ServicePort {
        name: Some(name.to_string()),
        port,
        protocol: Some("TCP".to_string()),
        target_port: Some(IntOrString::Int(port)),
        ..Default::default()
    };
    Service {
        metadata: ObjectMeta {
            name: Some(pv.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(
                [
                    (STORAGE_ENGINE_LABEL, CSTOR_CAS_TYPE),
                    (CAS_TYPE_LABEL, CSTOR_CAS_TYPE),
                    (TARGET_SERVICE_LABEL, TARGET_SERVICE_VALUE),
                    (PV_LABEL, pv),
                    (OPENEBS_VERSION_LABEL, version),
                ]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            cluster_ip: Some(cv.spec.target_ip.clone()),
            ports: Some(vec![
                port("cstor-iscsi", 3260),
                port("cstor-grpc", 7777),
                port("mgmt", 6060),
                port("exporter", 9500),
            ]),
            selector: Some(
                [
                    ("app", "cstor-volume-manager"),
                    ("openebs.io/target", "cstor-target"),
                    (PV_LABEL, pv),
                ]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// The volume policy which keeps the target and replica settings of the legacy volume.
pub fn temporary_policy(
    pv: &str,
    namespace: &str,
    target: &Deployment,
    cv: &legacy::CStorVolume,
    replicas: &[legacy::CStorVolumeReplica],
) -> Result<CStorVolumePolicy, Error> {
    let expected = cv.spec.replication_factor;
    if replicas.len() != expected as usize {
        return Err(Error::Precondition {
            message: format!(
                "failed to get cvrs for volume {pv}, expected {expected} got {}",
                replicas.len()
            ),
        });
    }
    let pod = target
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.clone())
        .unwrap_or_default();
    let mut spec = TargetSpec {
        priority_class_name: pod.priority_class_name.unwrap_or_default(),
        tolerations: pod.tolerations.unwrap_or_default(),
        affinity: pod.affinity.and_then(|a| a.pod_affinity),
        node_selector: pod.node_selector.unwrap_or_default(),
        ..Default::default()
    };
    let env = pod
        .containers
        .into_iter()
        .find(|c| c.name == TARGET_CONTAINER)
        .and_then(|c| c.env)
        .unwrap_or_default();
    for var in env {
        let value = var.value.unwrap_or_default();
        match var.name.as_str() {
            "QueueDepth" => spec.queue_depth = value,
            "Luworkers" => {
                spec.lu_workers = value.parse().map_err(|error: std::num::ParseIntError| {
                    Error::CasConfigValue {
                        key: var.name.clone(),
                        value: value.clone(),
                        reason: format!("failed to set Luworkers on cvc: {error}"),
                    }
                })?
            }
            _ => {}
        }
    }

    let mut policy = CStorVolumePolicy::new(pv, Default::default());
    policy.metadata.namespace = Some(namespace.to_string());
    policy.spec.target = spec;
    policy.spec.replica.zvol_workers = replicas
        .first()
        .map(|r| r.spec.zvol_workers.clone())
        .unwrap_or_default();
    policy.spec.replica_pool_info = replicas
        .iter()
        .map(|r| ReplicaPoolInfo {
            pool_name: r.labels().get(CSPI_NAME_LABEL).cloned().unwrap_or_default(),
        })
        .collect();
    Ok(policy)
}

/// The CVC which makes the CSI control plane adopt the legacy volume.
pub fn cvc_for_volume(
    cv: &legacy::CStorVolume,
    replica_capacity: &str,
    claim: &str,
    cspc: &str,
    namespace: &str,
) -> CStorVolumeConfig {
    let pv = cv.name_any();
    let source = cv
        .labels()
        .get(SOURCE_VOLUME_ANNOTATION)
        .filter(|s| !s.is_empty())
        .cloned();
    let mut labels = BTreeMap::from([(CSPC_LABEL.to_string(), cspc.to_string())]);
    let mut volume_source = String::new();
    if let Some(source) = source {
        let snapshot = cv
            .annotations()
            .get(SNAPSHOT_ANNOTATION)
            .cloned()
            .unwrap_or_default();
        volume_source = format!("{source}@{snapshot}");
        labels.insert(SOURCE_VOLUME_ANNOTATION.to_string(), source);
    }
    let mut cvc = CStorVolumeConfig {
        types: Some(CStorVolumeConfig::type_meta()),
        metadata: ObjectMeta {
            name: Some(pv.clone()),
            namespace: Some(namespace.to_string()),
            annotations: Some(
                [
                    (VOLUME_ID_ANNOTATION.to_string(), pv.clone()),
                    (VOLUME_POLICY_LABEL.to_string(), pv.clone()),
                    (PVC_LABEL.to_string(), claim.to_string()),
                ]
                .into_iter()
                .collect(),
            ),
            labels: Some(labels),
            finalizers: Some(vec![CVC_FINALIZER.to_string()]),
            ..Default::default()
        },
        ..Default::default()
    };
    cvc.spec.capacity = storage(Quantity(cv.spec.capacity.clone()));
    cvc.spec.provision.capacity = storage(Quantity(replica_capacity.to_string()));
    cvc.spec.provision.replica_count = cv.spec.replication_factor;
    cvc.spec.cstor_volume_source = volume_source;
    cvc.status.phase = "Pending".to_string();
    cvc
}

/// Check that every pool of the policy hosts one of the replicas.
pub fn check_replica_pools(
    policy: &CStorVolumePolicy,
    replicas: &[cstor::CStorVolumeReplica],
) -> Result<(), Error> {
    let pools = replicas
        .iter()
        .map(|r| r.labels().get(CSPI_NAME_LABEL).cloned().unwrap_or_default())
        .collect::<Vec<_>>();
    match policy
        .spec
        .replica_pool_info
        .iter()
        .find(|info| !pools.contains(&info.pool_name))
    {
        Some(info) => Err(Error::Precondition {
            message: format!(
                "cvr expected to be scheduled {} pool, but cvrs scheduled on pools {pools:?}",
                info.pool_name
            ),
        }),
        None => Ok(()),
    }
}

/// Whether the claim was already recreated for the csi driver by a previous run.
pub fn is_csi_claim(pvc: &PersistentVolumeClaim) -> bool {
    pvc.annotations()
        .get(STORAGE_PROVISIONER_ANNOTATION)
        .map(String::as_str)
        == Some(CSTOR_CSI_DRIVER)
}

/// Whether the volume was already recreated for the csi driver by a previous run.
pub fn is_csi_volume(pv: &PersistentVolume) -> bool {
    pv.spec.as_ref().and_then(|s| s.csi.as_ref()).is_some()
}

/// The pod which mounts the claim, if any.
pub fn mounting_pod<'p>(pods: &'p [Pod], claim: &str) -> Option<&'p Pod> {
    pods.iter().find(|pod| {
        pod.spec
            .iter()
            .flat_map(|spec| spec.volumes.iter().flatten())
            .filter_map(|volume| volume.persistent_volume_claim.as_ref())
            .any(|source| source.claim_name == claim)
    })
}

/// Migrates a legacy cStor volume, with its claim, storage class and snapshots, to a CSI
/// cStor volume.
pub struct VolumeMigration<'a> {
    client: &'a Client,
    config: &'a MigrationConfig,
    pv_name: String,
    identity: String,
}

impl<'a> VolumeMigration<'a> {
    /// A new migration of the named persistent volume.
    pub fn new(client: &'a Client, config: &'a MigrationConfig, pv: &str) -> Self {
        Self {
            client,
            config,
            pv_name: pv.to_string(),
            identity: provisioner_identity(Utc::now()),
        }
    }

    fn namespace(&self) -> &str {
        &self.config.namespace
    }

    /// Run the migration, recording it into its MigrationTask.
    #[tracing::instrument(skip(self), fields(pv = %self.pv_name))]
    pub async fn run(&self) -> Result<(), Error> {
        let target = MigrationTarget::Volume {
            pv: self.pv_name.clone(),
        };
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
                async {
                    validate_operator_release(
                        self.client,
                        CVC_OPERATOR,
                        self.namespace(),
                        &self.config.current_version,
                    )
                    .await
                    .step(PRE_MIGRATION, "error validating cvc operator")
                },
            )
            .await?;
        ledger
            .run_step(MIGRATE, "Migration steps were successful", self.migrate_all())
            .await
    }

    async fn migrate_all(&self) -> Result<(), Error> {
        let pv = &self.pv_name;
        if self
            .is_migration_required()
            .await
            .step(MIGRATE, "failed to check migration status")?
        {
            self.migrate().await?;
        } else {
            info!(pv = %pv, "Volume already migrated to csi spec");
        }
        let cvp_api: Api<CStorVolumePolicy> = Api::namespaced(self.client.clone(), self.namespace());
        delete_if_exists(&cvp_api, pv)
            .await
            .step(MIGRATE, &format!("failed to delete temporary policy {pv}"))?;
        SnapshotMigrator {
            client: self.client,
            pv_name: pv,
            policy: self.config.convergence,
        }
        .migrate()
        .await
        .step(MIGRATE, &format!("failed to migrate snapshots for volume {pv}"))
    }

    async fn is_migration_required(&self) -> Result<bool, Error> {
        let legacy_api: Api<legacy::CStorVolume> = Api::all(self.client.clone());
        if !list(&legacy_api, &selector(PV_LABEL, &self.pv_name))
            .await?
            .is_empty()
        {
            return Ok(true);
        }
        let api: Api<cstor::CStorVolume> = Api::namespaced(self.client.clone(), self.namespace());
        api.get(&self.pv_name).await?;
        Ok(false)
    }

    async fn migrate(&self) -> Result<(), Error> {
        let pv_name = &self.pv_name;
        let claim = self
            .validate_pv_name()
            .await
            .step(MIGRATE, "failed to validate pvname")?;
        let cv_namespace = self
            .cv_namespace()
            .await
            .step(MIGRATE, "failed to fetch cv namespace")?;
        self.create_temp_policy(&cv_namespace)
            .await
            .step(MIGRATE, "failed to create temporary policy")?;

        let pvc = match claim {
            Some(pvc) => {
                info!("PVC and storageclass already migrated to csi format");
                pvc
            }
            None => {
                info!("Checking volume is not mounted on any application");
                let pv = self
                    .unmounted_pv()
                    .await
                    .step(MIGRATE, &format!("failed to verify mount status for pv {pv_name}"))?;
                let spec = pv.spec.clone().unwrap_or_default();
                if spec.csi.is_none() {
                    info!("Retaining PV to migrate into csi volume");
                    self.retain_pv(&pv)
                        .await
                        .step(MIGRATE, &format!("failed to retain pv {pv_name}"))?;
                }
                let class = spec.storage_class_name.unwrap_or_default();
                self.update_storage_class(&class, &cv_namespace)
                    .await
                    .step(MIGRATE, &format!("failed to update storageclass {class}"))?;
                self.migrate_pvc(&pv)
                    .await
                    .step(MIGRATE, "failed to migrate pvc to csi spec")?
            }
        };

        let class_name = pvc
            .spec
            .as_ref()
            .and_then(|s| s.storage_class_name.clone())
            .unwrap_or_default();
        let sc_api: Api<StorageClass> = Api::all(self.client.clone());
        let class = sc_api
            .get(&class_name)
            .await
            .step(MIGRATE, &format!("failed to get storageclass {class_name}"))?;
        let pv = self
            .migrate_pv(&pvc, &class, &cv_namespace)
            .await
            .step(MIGRATE, "failed to migrate pv to csi spec")?;
        self.remove_old_target(&cv_namespace)
            .await
            .step(MIGRATE, "failed to remove old target deployment")?;
        info!("Creating CVC to bound the volume and trigger CSI driver");
        self.create_cvc(&pv, &class, &cv_namespace)
            .await
            .step(MIGRATE, "failed to create cvc")?;
        self.validate_migrated_volume()
            .await
            .step(MIGRATE, "failed to validate migrated volume")?;
        self.patch_target_pod_affinity()
            .await
            .step(MIGRATE, "failed to patch target affinity")?;
        self.cleanup_old_resources(&cv_namespace)
            .await
            .step(MIGRATE, "failed to cleanup old volume resources")
    }

    /// The claim of the volume when the volume itself is gone, ie: it was already recreated
    /// as a CSI claim by a previous run.
    async fn validate_pv_name(&self) -> Result<Option<PersistentVolumeClaim>, Error> {
        let pv_api: Api<PersistentVolume> = Api::all(self.client.clone());
        if get_opt(&pv_api, &self.pv_name).await?.is_some() {
            return Ok(None);
        }
        let pvc_api: Api<PersistentVolumeClaim> = Api::all(self.client.clone());
        list(&pvc_api, "")
            .await?
            .into_iter()
            .find(|pvc| {
                pvc.spec.as_ref().and_then(|s| s.volume_name.as_deref())
                    == Some(self.pv_name.as_str())
            })
            .map(Some)
            .ok_or_else(|| Error::Precondition {
                message: format!("No PVC found for the given PV {}", self.pv_name),
            })
    }

    /// The namespace of the legacy CV, either the claim namespace or the OpenEBS one.
    async fn cv_namespace(&self) -> Result<String, Error> {
        let api: Api<legacy::CStorVolume> = Api::all(self.client.clone());
        let cvs = list(&api, &selector(PV_LABEL, &self.pv_name)).await?;
        if cvs.len() != 1 {
            return Err(Error::Precondition {
                message: format!(
                    "expected exactly 1 cv for {}, got {}",
                    self.pv_name,
                    cvs.len()
                ),
            });
        }
        cvs.into_iter()
            .find(|cv| cv.name_any() == self.pv_name)
            .map(|cv| cv.namespace().unwrap_or_else(|| self.namespace().to_string()))
            .ok_or_else(|| Error::Precondition {
                message: format!("cv {} not found for given pv", self.pv_name),
            })
    }

    async fn legacy_cv(&self, cv_namespace: &str) -> Result<legacy::CStorVolume, Error> {
        let api: Api<legacy::CStorVolume> = Api::namespaced(self.client.clone(), cv_namespace);
        Ok(api.get(&self.pv_name).await?)
    }

    async fn legacy_replicas(&self) -> Result<Vec<legacy::CStorVolumeReplica>, Error> {
        let api: Api<legacy::CStorVolumeReplica> =
            Api::namespaced(self.client.clone(), self.namespace());
        list(&api, &selector(PV_LABEL, &self.pv_name)).await
    }

    async fn create_temp_policy(&self, cv_namespace: &str) -> Result<(), Error> {
        info!(pv = %self.pv_name, "Checking for a temporary policy of volume");
        let api: Api<CStorVolumePolicy> = Api::namespaced(self.client.clone(), self.namespace());
        if get_opt(&api, &self.pv_name).await?.is_some() {
            return Ok(());
        }
        info!(pv = %self.pv_name, "Creating temporary policy for migration");
        let deploy_api: Api<Deployment> = Api::namespaced(self.client.clone(), cv_namespace);
        let target = deploy_api.get(&target_deployment(&self.pv_name)).await?;
        let cv = self.legacy_cv(cv_namespace).await?;
        let replicas = self.legacy_replicas().await?;
        let policy = temporary_policy(&self.pv_name, self.namespace(), &target, &cv, &replicas)?;
        api.create(&PostParams::default(), &policy).await?;
        Ok(())
    }

    /// The volume, which must not be mounted by any pod of the claim namespace.
    async fn unmounted_pv(&self) -> Result<PersistentVolume, Error> {
        let pv_api: Api<PersistentVolume> = Api::all(self.client.clone());
        let pv = pv_api.get(&self.pv_name).await?;
        let claim = pv
            .spec
            .as_ref()
            .and_then(|s| s.claim_ref.clone())
            .unwrap_or_default();
        let namespace = claim.namespace.unwrap_or_default();
        let pod_api: Api<Pod> = Api::namespaced(self.client.clone(), &namespace);
        let pods = list(&pod_api, "").await?;
        if let Some(pod) = mounting_pod(&pods, &claim.name.unwrap_or_default()) {
            return Err(Error::VolumeMounted {
                pv: self.pv_name.clone(),
                namespace,
                pod: pod.name_any(),
            });
        }
        Ok(pv)
    }

    async fn retain_pv(&self, pv: &PersistentVolume) -> Result<(), Error> {
        let api: Api<PersistentVolume> = Api::all(self.client.clone());
        let mut retained = pv.clone();
        if let Some(spec) = retained.spec.as_mut() {
            spec.persistent_volume_reclaim_policy = Some("Retain".to_string());
        }
        let payload = diff(pv, &retained)?.with_resource_version(pv.resource_version());
        merge_patch(&api, &pv.name_any(), payload).await?;
        Ok(())
    }

    /// Replace the legacy storage class with a CSI class of the same name.
    /// The temporary copy of the class records which migration replaces it, so that the
    /// migrations of the other volumes of the class leave it alone.
    async fn update_storage_class(&self, name: &str, cv_namespace: &str) -> Result<(), Error> {
        let api: Api<StorageClass> = Api::all(self.client.clone());
        let tmp_name = format!("{TMP_SC_PREFIX}{name}");
        let class = get_opt(&api, name).await?;
        if let Some(tmp) = get_opt(&api, &tmp_name).await? {
            if tmp.annotations().get(TMP_SC_PV_ANNOTATION) != Some(&self.pv_name) {
                return Ok(());
            }
        }
        let needs_csi = class
            .as_ref()
            .map_or(true, |class| class.provisioner != CSTOR_CSI_DRIVER);
        if needs_csi {
            let Some(tmp) = self.create_tmp_class(name, &tmp_name).await? else {
                return Ok(());
            };
            info!(storageclass = name, "Updating storageclass with csi parameters");
            let replica_count = self.legacy_cv(cv_namespace).await?.spec.replication_factor;
            let cspc = self.cspc_name().await?;
            let mut csi_class = csi_storage_class(&tmp, name, replica_count, &cspc);
            create_policy_for_class(self.client, self.namespace(), &mut csi_class).await?;
            if class.is_some() {
                delete_if_exists(&api, name).await?;
            }
            create_if_missing(&api, &csi_class).await?;
        }
        delete_if_exists(&api, &tmp_name)
            .await
            .step(MIGRATE, "failed to delete temporary storageclass")
    }

    /// Get the temporary copy of the class, creating it. None if another migration created it
    /// concurrently.
    async fn create_tmp_class(
        &self,
        name: &str,
        tmp_name: &str,
    ) -> Result<Option<StorageClass>, Error> {
        let api: Api<StorageClass> = Api::all(self.client.clone());
        if let Some(tmp) = get_opt(&api, tmp_name).await? {
            return Ok(Some(tmp));
        }
        let class = api.get(name).await?;
        let mut tmp = class.clone();
        tmp.metadata = ObjectMeta {
            name: Some(tmp_name.to_string()),
            annotations: class.metadata.annotations.clone(),
            labels: class.metadata.labels.clone(),
            ..Default::default()
        };
        tmp.annotations_mut()
            .insert(TMP_SC_PV_ANNOTATION.to_string(), self.pv_name.clone());
        match api.create(&PostParams::default(), &tmp).await {
            Ok(tmp) => Ok(Some(tmp)),
            Err(error) if is_already_exists(&error) => Ok(None),
            Err(error) => Err(error).step(MIGRATE, "failed to create temporary storageclass"),
        }
    }

    async fn cspc_name(&self) -> Result<String, Error> {
        let replicas = self.legacy_replicas().await?;
        let replica = replicas.first().ok_or_else(|| Error::Precondition {
            message: format!("no cvr found for pv {}", self.pv_name),
        })?;
        let cspi = replica
            .labels()
            .get(CSPI_NAME_LABEL)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::Precondition {
                message: format!("no cspi label found on cvr {}", replica.name_any()),
            })?;
        Ok(cspc_of_cspi(cspi).to_string())
    }

    async fn migrate_pvc(&self, pv: &PersistentVolume) -> Result<PersistentVolumeClaim, Error> {
        let claim = pv
            .spec
            .as_ref()
            .and_then(|s| s.claim_ref.clone())
            .unwrap_or_default();
        let name = claim.name.unwrap_or_default();
        let namespace = claim.namespace.unwrap_or_default();
        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), &namespace);
        let existing = get_opt(&api, &name).await?;
        if let Some(pvc) = existing.as_ref().filter(|pvc| is_csi_claim(pvc)) {
            info!(pvc = %name, "pvc already migrated");
            return Ok(pvc.clone());
        }
        info!(pvc = %name, "Generating equivalent CSI PVC");
        let csi = csi_pvc(pv, &name, &namespace);
        if let Some(pvc) = existing {
            if pvc.annotations().get(SKIP_VALIDATIONS_ANNOTATION).map(String::as_str) != Some("true") {
                let mut skipped = pvc.clone();
                skipped
                    .annotations_mut()
                    .insert(SKIP_VALIDATIONS_ANNOTATION.to_string(), "true".to_string());
                strategic_patch(&api, &name, strategic_diff(&pvc, &skipped)?)
                    .await
                    .step(MIGRATE, "failed to add skip-validations annotation")?;
            }
        }
        info!(pvc = %name, "Recreating equivalent CSI PVC");
        self.recreate(&api, csi).await
    }

    async fn migrate_pv(
        &self,
        pvc: &PersistentVolumeClaim,
        class: &StorageClass,
        cv_namespace: &str,
    ) -> Result<PersistentVolume, Error> {
        let api: Api<PersistentVolume> = Api::all(self.client.clone());
        let name = pvc
            .spec
            .as_ref()
            .and_then(|s| s.volume_name.clone())
            .unwrap_or_default();
        let csi = match get_opt(&api, &name).await? {
            None => {
                info!(pv = %self.pv_name, "Generating equivalent CSI PV");
                let cv = self.legacy_cv(cv_namespace).await?;
                csi_pv_from_cv(&cv, pvc, class, &self.identity)
            }
            Some(pv) if !is_csi_volume(&pv) => {
                info!(pv = %self.pv_name, "Generating equivalent CSI PV");
                csi_pv(&pv, pvc, class, &self.identity)
            }
            Some(pv) => {
                info!(pv = %name, "PV already in csi form");
                return Ok(pv);
            }
        };
        info!("Recreating equivalent CSI PV");
        self.recreate(&api, csi).await
    }

    /// Delete the object, wait for it to be gone, then create its replacement.
    async fn recreate<K>(&self, api: &Api<K>, object: K) -> Result<K, Error>
    where
        K: kube::Resource + Clone + std::fmt::Debug + serde::de::DeserializeOwned + serde::Serialize,
    {
        let name = object.name_any();
        delete_if_exists(api, &name).await?;
        poll(
            self.config.rollout,
            &format!("{name} to go away"),
            || async {
                Ok::<_, Error>(get_opt(api, &name).await?.is_none().then_some(()))
            },
        )
        .await?;
        Ok(api.create(&PostParams::default(), &object).await?)
    }

    async fn remove_old_target(&self, cv_namespace: &str) -> Result<(), Error> {
        let cvc_api: Api<CStorVolumeConfig> = Api::namespaced(self.client.clone(), self.namespace());
        if get_opt(&cvc_api, &self.pv_name).await?.is_none() {
            let deploy_api: Api<Deployment> = Api::namespaced(self.client.clone(), cv_namespace);
            delete_if_exists(&deploy_api, &target_deployment(&self.pv_name)).await?;
        }
        if cv_namespace == self.namespace() {
            return Ok(());
        }
        // The CSI target lives in the OpenEBS namespace, so does its service.
        let old_api: Api<Service> = Api::namespaced(self.client.clone(), cv_namespace);
        delete_if_exists(&old_api, &self.pv_name).await?;
        let api: Api<Service> = Api::namespaced(self.client.clone(), self.namespace());
        if get_opt(&api, &self.pv_name).await?.is_none() {
            let cv = self.legacy_cv(cv_namespace).await?;
            let svc = target_service(
                &self.pv_name,
                self.namespace(),
                &cv,
                &self.config.current_version,
            );
            info!(svc = %self.pv_name, namespace = self.namespace(), "Creating target service");
            api.create(&PostParams::default(), &svc).await?;
        }
        Ok(())
    }

    async fn create_cvc(
        &self,
        pv: &PersistentVolume,
        class: &StorageClass,
        cv_namespace: &str,
    ) -> Result<(), Error> {
        let api: Api<CStorVolumeConfig> = Api::namespaced(self.client.clone(), self.namespace());
        if get_opt(&api, &self.pv_name).await?.is_some() {
            return Ok(());
        }
        let cv = self.legacy_cv(cv_namespace).await?;
        let replicas = self.legacy_replicas().await?;
        let replica = replicas.first().ok_or_else(|| Error::Precondition {
            message: format!("failed to get cvrs for volume {}", self.pv_name),
        })?;
        let claim = pv
            .spec
            .as_ref()
            .and_then(|s| s.claim_ref.as_ref())
            .and_then(|c| c.name.clone())
            .unwrap_or_default();
        let cspc = class
            .parameters
            .as_ref()
            .and_then(|p| p.get(CSPC_PARAMETER))
            .cloned()
            .unwrap_or_default();
        let cvc = cvc_for_volume(&cv, &replica.spec.capacity, &claim, &cspc, self.namespace());
        api.create(&PostParams::default(), &cvc).await?;
        Ok(())
    }

    async fn validate_migrated_volume(&self) -> Result<(), Error> {
        info!("Validating the migrated volume");
        let pv = &self.pv_name;
        let cvc_api: Api<CStorVolumeConfig> = Api::namespaced(self.client.clone(), self.namespace());
        poll(
            self.config.convergence,
            &format!("cvc {pv} to become Bound"),
            || async {
                let cvc = cvc_api.get(pv).await?;
                if cvc.status.phase == CVC_BOUND {
                    return Ok(Some(()));
                }
                info!(cvc = %pv, phase = %cvc.status.phase, "Waiting for cvc to become Bound");
                Ok::<_, Error>(None)
            },
        )
        .await?;
        self.set_target_affinity(false).await?;

        let cvp_api: Api<CStorVolumePolicy> = Api::namespaced(self.client.clone(), self.namespace());
        let policy = cvp_api.get(pv).await?;
        let cvr_api: Api<cstor::CStorVolumeReplica> =
            Api::namespaced(self.client.clone(), self.namespace());
        let replicas = list(&cvr_api, &selector(PV_LABEL, pv)).await?;
        check_replica_pools(&policy, &replicas)?;

        let cv_api: Api<cstor::CStorVolume> = Api::namespaced(self.client.clone(), self.namespace());
        poll(
            self.config.convergence,
            &format!("cv {pv} to come to Healthy state"),
            || async {
                let cv = cv_api.get(pv).await?;
                if cv.status.phase == CV_HEALTHY {
                    return Ok(Some(()));
                }
                info!(cv = %pv, phase = %cv.status.phase, "Waiting for cv to come to Healthy state");
                Ok::<_, Error>(None)
            },
        )
        .await?;

        info!("Patching the target svc with cvc owner ref");
        let svc_api: Api<Service> = Api::namespaced(self.client.clone(), self.namespace());
        let svc = svc_api.get(pv).await?;
        let cvc = cvc_api.get(pv).await?;
        let mut owned = svc.clone();
        owned.metadata.owner_references = Some(vec![controller_ref(&cvc)?]);
        let payload = strategic_diff(&svc, &owned)?.with_resource_version(svc.resource_version());
        strategic_patch(&svc_api, pv, payload)
            .await
            .step(MIGRATE, "failed to patch cvc owner ref to target svc")?;
        Ok(())
    }

    /// Set the pod affinity of the target deployment, when its policy has one.
    /// The affinity is lifted while the application is scaled down, so that the target can be
    /// scheduled to verify the volume health.
    async fn set_target_affinity(&self, restore: bool) -> Result<(), Error> {
        let cvp_api: Api<CStorVolumePolicy> = Api::namespaced(self.client.clone(), self.namespace());
        let policy = cvp_api.get(&self.pv_name).await?;
        let Some(pod_affinity) = policy.spec.target.affinity else {
            return Ok(());
        };
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), self.namespace());
        let name = target_deployment(&self.pv_name);
        let deploy = api.get(&name).await?;
        let mut patched = deploy.clone();
        if let Some(pod) = patched.spec.as_mut().and_then(|s| s.template.spec.as_mut()) {
            pod.affinity = if restore {
                info!("Patching target pod with old pod affinity rules");
                let mut affinity = pod.affinity.take().unwrap_or_default();
                affinity.pod_affinity = Some(pod_affinity);
                Some(affinity)
            } else {
                info!("Patching target pod with no affinity rules to verify volume health");
                None
            };
        }
        strategic_patch(&api, &name, strategic_diff(&deploy, &patched)?).await?;
        Ok(())
    }

    async fn patch_target_pod_affinity(&self) -> Result<(), Error> {
        self.set_target_affinity(true).await
    }

    async fn cleanup_old_resources(&self, cv_namespace: &str) -> Result<(), Error> {
        info!("Cleaning up old volume resources");
        let pv = &self.pv_name;
        let cvr_api: Api<legacy::CStorVolumeReplica> =
            Api::namespaced(self.client.clone(), self.namespace());
        let replicas = self
            .legacy_replicas()
            .await
            .step(MIGRATE, &format!("failed to list cvrs for {pv}"))?;
        for replica in replicas {
            let name = replica.name_any();
            let mut released = replica.clone();
            released.metadata.finalizers = Some(vec![]);
            merge_patch(&cvr_api, &name, diff(&replica, &released)?)
                .await
                .step(MIGRATE, &format!("failed to remove finalizer from cvr {name}"))?;
            delete_if_exists(&cvr_api, &name).await?;
        }

        let cvc_api: Api<CStorVolumeConfig> = Api::namespaced(self.client.clone(), self.namespace());
        let cvc = cvc_api.get(pv).await?;
        let mut unpinned = cvc.clone();
        unpinned.annotations_mut().remove(VOLUME_POLICY_LABEL);
        let payload = diff(&cvc, &unpinned)?.with_resource_version(cvc.resource_version());
        merge_patch(&cvc_api, pv, payload).await?;

        let cv_api: Api<legacy::CStorVolume> = Api::namespaced(self.client.clone(), cv_namespace);
        delete_if_exists(&cv_api, pv).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::legacy::{CStorVolumeReplicaSpec, CStorVolumeSpec};
    use chrono::TimeZone;
    use k8s_openapi::api::{
        apps::v1::DeploymentSpec,
        core::v1::{
            Container, EnvVar, ISCSIPersistentVolumeSource, ObjectReference,
            PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, Volume,
        },
    };

    fn legacy_cv(replicas: i32) -> legacy::CStorVolume {
        let mut cv = legacy::CStorVolume::new(
            "pvc-1",
            CStorVolumeSpec {
                capacity: "5Gi".to_string(),
                target_ip: "10.0.0.7".to_string(),
                replication_factor: replicas,
                consistency_factor: 2,
            },
        );
        cv.metadata.namespace = Some("openebs".to_string());
        cv
    }

    fn replica(pool: &str) -> legacy::CStorVolumeReplica {
        let mut cvr = legacy::CStorVolumeReplica::new(
            &format!("pvc-1-{pool}"),
            CStorVolumeReplicaSpec {
                capacity: "5G".to_string(),
                zvol_workers: "2".to_string(),
                ..Default::default()
            },
        );
        cvr.labels_mut()
            .insert(CSPI_NAME_LABEL.to_string(), pool.to_string());
        cvr
    }

    fn pvc() -> PersistentVolumeClaim {
        PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some("demo-claim".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                storage_class_name: Some("cstor-sc".to_string()),
                volume_name: Some("pvc-1".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn identity_and_names() {
        let now = Utc.timestamp_millis_opt(1_600_000_000_123).unwrap();
        assert_eq!(
            provisioner_identity(now),
            format!("1600000000123-{}-cstor.csi.openebs.io", 123_000_000 % 10000)
        );
        assert_eq!(cspc_of_cspi("cstor-disk-pool-x7k2"), "cstor-disk-pool");
        assert_eq!(cspc_of_cspi("pool"), "pool");
        assert_eq!(target_deployment("pvc-1"), "pvc-1-target");
    }

    #[test]
    fn csi_volume_objects() {
        let pv = PersistentVolume {
            metadata: ObjectMeta {
                name: Some("pvc-1".to_string()),
                ..Default::default()
            },
            spec: Some(PersistentVolumeSpec {
                capacity: Some(storage(Quantity("5Gi".to_string()))),
                iscsi: Some(ISCSIPersistentVolumeSource {
                    fs_type: Some("ext4".to_string()),
                    ..Default::default()
                }),
                claim_ref: Some(ObjectReference {
                    name: Some("demo-claim".to_string()),
                    namespace: Some("default".to_string()),
                    ..Default::default()
                }),
                storage_class_name: Some("cstor-sc".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let claim = csi_pvc(&pv, "demo-claim", "default");
        let claim_spec = claim.spec.as_ref().unwrap();
        assert_eq!(claim_spec.volume_name.as_deref(), Some("pvc-1"));
        assert_eq!(
            claim_spec.resources.as_ref().unwrap().requests.as_ref().unwrap()["storage"],
            Quantity("5Gi".to_string())
        );
        assert_eq!(
            claim.annotations()[STORAGE_PROVISIONER_ANNOTATION],
            CSTOR_CSI_DRIVER
        );

        let mut class = StorageClass::default();
        class.metadata.name = Some("cstor-sc".to_string());
        class.reclaim_policy = Some("Retain".to_string());
        let csi = csi_pv(&pv, &claim, &class, "identity");
        let spec = csi.spec.as_ref().unwrap();
        let source = spec.csi.as_ref().unwrap();
        assert_eq!(source.fs_type.as_deref(), Some("ext4"));
        assert_eq!(source.volume_handle, "pvc-1");
        assert_eq!(
            source.volume_attributes.as_ref().unwrap()[CSI_PROVISIONER_IDENTITY_KEY],
            "identity"
        );
        assert_eq!(spec.persistent_volume_reclaim_policy.as_deref(), Some("Retain"));
        assert!(spec.iscsi.is_none());

        let mut cv = legacy_cv(3);
        cv.annotations_mut()
            .insert(FS_TYPE_LABEL.to_string(), "xfs".to_string());
        let rebuilt = csi_pv_from_cv(&cv, &pvc(), &StorageClass::default(), "identity");
        let spec = rebuilt.spec.as_ref().unwrap();
        assert_eq!(spec.csi.as_ref().unwrap().fs_type.as_deref(), Some("xfs"));
        assert_eq!(spec.persistent_volume_reclaim_policy.as_deref(), Some("Delete"));
        assert_eq!(spec.claim_ref.as_ref().unwrap().name.as_deref(), Some("demo-claim"));
    }

    #[test]
    fn migrated_volumes_are_kept() {
        let legacy = PersistentVolume {
            metadata: ObjectMeta {
                name: Some("pvc-1".to_string()),
                ..Default::default()
            },
            spec: Some(PersistentVolumeSpec {
                iscsi: Some(ISCSIPersistentVolumeSource::default()),
                claim_ref: Some(ObjectReference {
                    name: Some("demo-claim".to_string()),
                    namespace: Some("default".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(!is_csi_volume(&legacy));
        assert!(!is_csi_claim(&pvc()));

        let claim = csi_pvc(&legacy, "demo-claim", "default");
        assert!(is_csi_claim(&claim));
        let bound = csi_pv(&legacy, &claim, &StorageClass::default(), "identity");
        assert!(is_csi_volume(&bound));
    }

    #[test]
    fn csi_class() {
        let mut tmp = StorageClass {
            provisioner: "openebs.io/provisioner-iscsi".to_string(),
            ..Default::default()
        };
        tmp.metadata.name = Some("tmp-migrate-cstor-sc".to_string());
        tmp.annotations_mut()
            .insert(TMP_SC_PV_ANNOTATION.to_string(), "pvc-1".to_string());
        tmp.annotations_mut()
            .insert("cas.openebs.io/config".to_string(), "- name: QueueDepth".to_string());
        let class = csi_storage_class(&tmp, "cstor-sc", 3, "cstor-disk");
        assert_eq!(class.name_any(), "cstor-sc");
        assert_eq!(class.provisioner, CSTOR_CSI_DRIVER);
        assert!(!class.annotations().contains_key(TMP_SC_PV_ANNOTATION));
        assert!(class.annotations().contains_key("cas.openebs.io/config"));
        let parameters = class.parameters.as_ref().unwrap();
        assert_eq!(parameters["replicaCount"], "3");
        assert_eq!(parameters[CSPC_PARAMETER], "cstor-disk");
    }

    #[test]
    fn temporary_policy_from_target() {
        let target = Deployment {
            spec: Some(DeploymentSpec {
                template: PodTemplateSpec {
                    spec: Some(PodSpec {
                        priority_class_name: Some("storage-critical".to_string()),
                        containers: vec![Container {
                            name: TARGET_CONTAINER.to_string(),
                            env: Some(vec![
                                EnvVar {
                                    name: "QueueDepth".to_string(),
                                    value: Some("32".to_string()),
                                    ..Default::default()
                                },
                                EnvVar {
                                    name: "Luworkers".to_string(),
                                    value: Some("6".to_string()),
                                    ..Default::default()
                                },
                            ]),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        };
        let replicas = [replica("cstor-disk-a"), replica("cstor-disk-b")];
        let policy = temporary_policy("pvc-1", "openebs", &target, &legacy_cv(2), &replicas).unwrap();
        assert_eq!(policy.spec.target.queue_depth, "32");
        assert_eq!(policy.spec.target.lu_workers, 6);
        assert_eq!(policy.spec.target.priority_class_name, "storage-critical");
        assert_eq!(policy.spec.replica.zvol_workers, "2");
        assert_eq!(policy.spec.replica_pool_info.len(), 2);
        assert_eq!(policy.spec.replica_pool_info[1].pool_name, "cstor-disk-b");

        assert_eq!(
            temporary_policy("pvc-1", "openebs", &target, &legacy_cv(3), &replicas)
                .unwrap_err()
                .to_string(),
            "failed to get cvrs for volume pvc-1, expected 3 got 2"
        );

        let mut v1_replica = cstor::CStorVolumeReplica::default();
        v1_replica
            .labels_mut()
            .insert(CSPI_NAME_LABEL.to_string(), "cstor-disk-a".to_string());
        assert!(check_replica_pools(&policy, &[v1_replica]).is_err());
    }

    #[test]
    fn cvc_and_service() {
        let mut cv = legacy_cv(3);
        cv.labels_mut()
            .insert(SOURCE_VOLUME_ANNOTATION.to_string(), "pvc-0".to_string());
        cv.annotations_mut()
            .insert(SNAPSHOT_ANNOTATION.to_string(), "snap-1".to_string());
        let cvc = cvc_for_volume(&cv, "5G", "demo-claim", "cstor-disk", "openebs");
        assert_eq!(cvc.spec.cstor_volume_source, "pvc-0@snap-1");
        assert_eq!(cvc.spec.provision.replica_count, 3);
        assert_eq!(cvc.spec.provision.capacity["storage"], Quantity("5G".to_string()));
        assert_eq!(cvc.labels()[CSPC_LABEL], "cstor-disk");
        assert_eq!(cvc.annotations()[PVC_LABEL], "demo-claim");
        assert_eq!(cvc.status.phase, "Pending");

        let svc = target_service("pvc-1", "openebs", &cv, "2.0.0");
        let spec = svc.spec.as_ref().unwrap();
        assert_eq!(spec.cluster_ip.as_deref(), Some("10.0.0.7"));
        assert_eq!(spec.ports.as_ref().unwrap().len(), 4);
        assert_eq!(svc.labels()[OPENEBS_VERSION_LABEL], "2.0.0");
    }

    #[test]
    fn mounted_claims() {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("busybox".to_string()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                volumes: Some(vec![Volume {
                    name: "data".to_string(),
                    persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                        claim_name: "demo-claim".to_string(),
                        read_only: None,
                    }),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let pods = [pod];
        assert_eq!(
            mounting_pod(&pods, "demo-claim").map(|p| p.name_any()),
            Some("busybox".to_string())
        );
        assert!(mounting_pod(&pods, "other-claim").is_none());
    }
}
