/// Label carrying the version of an OpenEBS resource.
pub const OPENEBS_VERSION_LABEL: &str = "openebs.io/version";
/// Label carrying the persistent volume name of a volume resource.
pub const PV_LABEL: &str = "openebs.io/persistent-volume";
/// Label carrying the persistent volume claim name of a volume resource.
pub const PVC_LABEL: &str = "openebs.io/persistent-volume-claim";
/// Label carrying the component name of an OpenEBS control plane pod.
pub const COMPONENT_NAME_LABEL: &str = "openebs.io/component-name";
/// Label carrying the storage engine of a volume.
pub const STORAGE_ENGINE_LABEL: &str = "openebs.io/storage-engine-type";
/// Label carrying the cas type of a volume.
pub const CAS_TYPE_LABEL: &str = "openebs.io/cas-type";
/// Label of the target service of a cstor volume.
pub const TARGET_SERVICE_LABEL: &str = "openebs.io/target-service";
/// Value of the target service label.
pub const TARGET_SERVICE_VALUE: &str = "cstor-target-svc";
/// Label of the node hostname.
pub const HOSTNAME_LABEL: &str = "kubernetes.io/hostname";

/// Label (and SPC annotation) carrying the CStorPoolCluster name.
pub const CSPC_LABEL: &str = "openebs.io/cstor-pool-cluster";
/// Label carrying the CStorPoolInstance name of a pool pod or volume replica.
pub const CSPI_LABEL: &str = "openebs.io/cstor-pool-instance";
/// Label carrying the CStorPoolInstance name.
pub const CSPI_NAME_LABEL: &str = "cstorpoolinstance.openebs.io/name";
/// Label carrying the CStorPoolInstance uid.
pub const CSPI_UID_LABEL: &str = "cstorpoolinstance.openebs.io/uid";
/// Label carrying the CStorPoolInstance hostname.
pub const CSPI_HOSTNAME_LABEL: &str = "cstorpoolinstance.openebs.io/hostname";
/// Annotation carrying the name of the CSP a CSPI was migrated from.
pub const CSPI_OLD_NAME_ANNOTATION: &str = "cstorpoolinstance.openebs.io/oldname";
/// Label carrying the CStorPool name.
pub const CSP_NAME_LABEL: &str = "cstorpool.openebs.io/name";
/// Label carrying the CStorPool uid.
pub const CSP_UID_LABEL: &str = "cstorpool.openebs.io/uid";
/// Label carrying the CStorPool hostname.
pub const CSP_HOSTNAME_LABEL: &str = "cstorpool.openebs.io/hostname";
/// Label carrying the StoragePoolClaim name.
pub const SPC_LABEL: &str = "openebs.io/storage-pool-claim";

/// Annotation which disables the reconciliation of a resource.
pub const RECONCILE_DISABLE_ANNOTATION: &str = "reconcile.openebs.io/disable";
/// Annotation which disables the reconciliation of the dependants of a resource.
pub const RECONCILE_DISABLE_DEPENDANTS_ANNOTATION: &str = "reconcile.openebs.io/disable-dependants";
/// Annotation which records where a resource was migrated from.
pub const MIGRATED_FROM_ANNOTATION: &str = "openebs.io/migrated-from";
/// Annotation which lets the SPC be deleted without its admission validations.
pub const SKIP_VALIDATIONS_ANNOTATION: &str = "openebs.io/skip-validations";
/// Finalizer of the StoragePoolClaim.
pub const SPC_FINALIZER: &str = "storagepoolclaim.openebs.io/finalizer";
/// Finalizer of the CStorPoolCluster.
pub const CSPC_FINALIZER: &str = "cstorpoolcluster.openebs.io/finalizer";
/// Finalizer of the CStorVolumeConfig.
pub const CVC_FINALIZER: &str = "cvc.openebs.io/finalizer";
/// Annotation selecting the replica naming scheme of a volume.
pub const UUID_SCHEME_ANNOTATION: &str = "internal.openebs.io/uuid-scheme";
/// Value of the uuid scheme annotation for replicas named after the volume and pool.
pub const UUID_SCHEME_GPT: &str = "gpt";
/// Annotation carrying the cas config of a legacy storage class.
pub const CAS_CONFIG_ANNOTATION: &str = "cas.openebs.io/config";
/// Annotation carrying the volume id of a snapshot.
pub const VOLUME_ID_ANNOTATION: &str = "openebs.io/volumeID";
/// Label carrying the volume policy of a cstor volume.
pub const VOLUME_POLICY_LABEL: &str = "openebs.io/volume-policy";
/// Annotation carrying the source volume of a cloned volume.
pub const SOURCE_VOLUME_ANNOTATION: &str = "openebs.io/source-volume";
/// Annotation carrying the snapshot a volume was cloned from.
pub const SNAPSHOT_ANNOTATION: &str = "openebs.io/snapshot";
/// Label carrying the filesystem of a legacy snapshot.
pub const FS_TYPE_LABEL: &str = "openebs.io/fs-type";
/// Label of the legacy snapshots carrying the persistent volume name.
pub const SNAPSHOT_PV_LABEL: &str = "SnapshotMetadata-PVName";
/// Annotation carrying the provisioner of a persistent volume claim.
pub const STORAGE_PROVISIONER_ANNOTATION: &str = "volume.beta.kubernetes.io/storage-provisioner";
/// Annotation carrying the provisioner of a persistent volume.
pub const PROVISIONED_BY_ANNOTATION: &str = "pv.kubernetes.io/provisioned-by";
/// Volume attribute carrying the identity of the csi provisioner.
pub const CSI_PROVISIONER_IDENTITY_KEY: &str = "storage.kubernetes.io/csiProvisionerIdentity";

/// The cstor csi driver name.
pub const CSTOR_CSI_DRIVER: &str = "cstor.csi.openebs.io";
/// The snapshot class used for migrated cstor snapshots.
pub const CSTOR_SNAPSHOT_CLASS: &str = "csi-cstor-snapshotclass";
/// The cas type of cstor volumes.
pub const CSTOR_CAS_TYPE: &str = "cstor";

/// Kind of the CStorPoolCluster.
pub const CSPC_KIND: &str = "CStorPoolCluster";
/// Kind of the StoragePoolClaim.
pub const SPC_KIND: &str = "StoragePoolClaim";
/// Kind of the CStorVolumeConfig.
pub const CVC_KIND: &str = "CStorVolumeConfig";

/// Container of the legacy pool pod which runs the zpool commands.
pub const POOL_CONTAINER: &str = "cstor-pool";
/// Component name of the cstor pool operator.
pub const CSPC_OPERATOR: &str = "cspc-operator";
/// Component name of the cstor volume operator.
pub const CVC_OPERATOR: &str = "cvc-operator";
/// Component name of the jiva operator.
pub const JIVA_OPERATOR: &str = "jiva-operator";

/// Suffix of the legacy openebs images built for amd64.
pub const AMD64_SUFFIX: &str = "-amd64";

/// Label of the legacy pool deployments and pods carrying the CStorPool name.
pub const CSP_DEPLOY_LABEL: &str = "openebs.io/cstor-pool";
/// Annotation of a CSPI which imports the pool of a legacy CSP.
pub const IMPORT_POOL_ANNOTATION: &str = "import.cspi.cstor.openebs.io/existing-pool-name";
/// Label carrying the component of a jiva volume.
pub const COMPONENT_LABEL: &str = "openebs.io/component";
/// Component of the jiva controller deployment.
pub const JIVA_CONTROLLER: &str = "jiva-controller";
/// Component of the jiva replica statefulset.
pub const JIVA_REPLICA: &str = "jiva-replica";
/// Component of the jiva controller service.
pub const JIVA_CONTROLLER_SERVICE: &str = "jiva-controller-service";
/// Annotation of the temporary storage class carrying the volume it was created for.
pub const TMP_SC_PV_ANNOTATION: &str = "pv-name";
/// Prefix of the temporary storage class of a volume being migrated.
pub const TMP_SC_PREFIX: &str = "tmp-migrate-";
