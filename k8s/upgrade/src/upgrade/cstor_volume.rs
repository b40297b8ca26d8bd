use super::{
    cvr::upgrade_cvr, for_volume, ResourcePatch, UpgradeTarget, PRE_UPGRADE, REPLICA_UPGRADE,
    TARGET_UPGRADE,
};
use crate::{
    common::{
        client::{list, selector},
        constants::{AMD64_SUFFIX, CVC_OPERATOR, PVC_LABEL, PV_LABEL},
        version::is_operator_upgraded,
    },
    crd::cstor::{CStorVolume, CStorVolumeConfig, CStorVolumeReplica},
    error::{Error, StepContext},
    ledger::Ledger,
    resource::{Patchable, VersionedResource},
};
use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{PersistentVolume, Service},
};
use kube::{Api, Client, ResourceExt};
use utils::{CSTOR_OPERATOR_SERVICE_ACCOUNT_ENV, DEFAULT_CSTOR_OPERATOR_SERVICE_ACCOUNT};

/// The target side resources of a CSI cStor volume.
struct VolumeTarget {
    cvc: VersionedResource<CStorVolumeConfig>,
    cv: VersionedResource<CStorVolume>,
    deploy: VersionedResource<Deployment>,
    svc: VersionedResource<Service>,
}

/// Upgrades a CSI cStor volume: its replicas first, then its target.
pub struct CStorVolumeUpgrade<'a> {
    client: &'a Client,
    patch: &'a ResourcePatch,
    name: String,
}

impl<'a> CStorVolumeUpgrade<'a> {
    /// A new upgrade of the volume of the named persistent volume.
    pub fn new(client: &'a Client, patch: &'a ResourcePatch, name: &str) -> Self {
        Self {
            client,
            patch,
            name: name.to_string(),
        }
    }

    /// Run the upgrade, recording it into its UpgradeTask.
    #[tracing::instrument(skip(self), fields(volume = %self.name))]
    pub async fn run(&self) -> Result<(), Error> {
        let target = UpgradeTarget::CstorVolume(self.name.clone());
        let mut ledger = Ledger::get_or_create(
            self.client,
            &self.patch.namespace,
            self.patch.upgrade_task(&target),
            self.patch.task_job,
        )
        .await?;
        let mut volume = ledger
            .run_step(
                PRE_UPGRADE,
                "Pre-upgrade steps were successful",
                self.pre_upgrade(),
            )
            .await?;
        ledger
            .run_step(
                REPLICA_UPGRADE,
                "Replica upgrade was successful",
                self.upgrade_replicas(),
            )
            .await?;
        ledger
            .run_step(
                TARGET_UPGRADE,
                "Target upgrade was successful",
                self.upgrade_target(&mut volume),
            )
            .await
    }

    async fn pre_upgrade(&self) -> Result<VolumeTarget, Error> {
        let mut volume = self.init().await?;
        let (from, to) = (&self.patch.from, &self.patch.to);
        is_operator_upgraded(self.client, CVC_OPERATOR, &self.patch.namespace, to)
            .await
            .step(PRE_UPGRADE, "failed to verify cvc-operator")?;
        volume
            .cvc
            .pre_checks(from, to)
            .step(PRE_UPGRADE, "failed to verify CVC")?;
        volume
            .cv
            .pre_checks(from, to)
            .step(PRE_UPGRADE, "failed to verify CV")?;
        volume
            .deploy
            .pre_checks(from, to)
            .step(PRE_UPGRADE, "failed to verify target deploy")?;
        volume
            .svc
            .pre_checks(from, to)
            .step(PRE_UPGRADE, "failed to verify target svc")?;
        self.transform(&mut volume).await?;
        Ok(volume)
    }

    async fn init(&self) -> Result<VolumeTarget, Error> {
        let namespace = &self.patch.namespace;
        let name = &self.name;
        let label = selector(PV_LABEL, name);

        let cvc_api: Api<CStorVolumeConfig> = Api::namespaced(self.client.clone(), namespace);
        let cvc = VersionedResource::get(cvc_api, name)
            .await
            .step(PRE_UPGRADE, &for_volume("failed to get CVC", name))?;
        let cv_api: Api<CStorVolume> = Api::namespaced(self.client.clone(), namespace);
        let cv = VersionedResource::get(cv_api, name)
            .await
            .step(PRE_UPGRADE, &for_volume("failed to get CV", name))?;
        let deploy_api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let deploy = VersionedResource::get_by_label(deploy_api, &label)
            .await
            .step(PRE_UPGRADE, &for_volume("failed to get target deploy", name))?
            .with_rollout(self.patch.rollout);
        let svc_api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let svc = VersionedResource::get_by_label(svc_api, &label)
            .await
            .step(PRE_UPGRADE, &for_volume("failed to get target svc", name))?;
        Ok(VolumeTarget {
            cvc,
            cv,
            deploy,
            svc,
        })
    }

    async fn claim_name(&self) -> Result<String, Error> {
        let pv_api: Api<PersistentVolume> = Api::all(self.client.clone());
        let pv = pv_api.get(&self.name).await?;
        pv.spec
            .and_then(|spec| spec.claim_ref)
            .and_then(|claim| claim.name)
            .ok_or_else(|| Error::MissingField {
                kind: "PersistentVolume".to_string(),
                name: self.name.clone(),
                field: ".spec.claimRef.name".to_string(),
            })
    }

    async fn transform(&self, volume: &mut VolumeTarget) -> Result<(), Error> {
        let name = &self.name;
        let to = &self.patch.to;
        let claim = self
            .claim_name()
            .await
            .step(PRE_UPGRADE, &for_volume("failed to create CVC patch", name))?;
        volume.cvc.transform(|cvc| {
            cvc.annotations_mut().insert(PVC_LABEL.to_string(), claim.clone());
            cvc.version_details.desired = to.clone();
            Ok(())
        })?;
        volume
            .cv
            .transform(|cv| {
                cv.labels_mut().insert(PVC_LABEL.to_string(), claim.clone());
                cv.version_details.desired = to.clone();
                Ok(())
            })
            .step(PRE_UPGRADE, &for_volume("failed to create CV patch", name))?;
        volume
            .deploy
            .transform(|deploy| self.transform_deploy(deploy, &claim))
            .step(
                PRE_UPGRADE,
                &for_volume("failed to create target deploy patch", name),
            )?;
        volume
            .svc
            .transform(|svc| {
                self.patch.label_version(svc);
                Ok(())
            })
            .step(
                PRE_UPGRADE,
                &for_volume("failed to create target svc patch", name),
            )
    }

    fn transform_deploy(&self, deploy: &mut Deployment, claim: &str) -> Result<(), Error> {
        self.patch.label_version(deploy);
        deploy
            .labels_mut()
            .insert(PVC_LABEL.to_string(), claim.to_string());
        if let Some(spec) = deploy.spec.as_mut() {
            let template = &mut spec.template;
            self.patch.upgrade_template(template, Some(AMD64_SUFFIX))?;
            template
                .metadata
                .get_or_insert_with(Default::default)
                .labels
                .get_or_insert_with(Default::default)
                .insert(PVC_LABEL.to_string(), claim.to_string());
            if let Some(pod) = template.spec.as_mut() {
                pod.service_account_name = Some(target_service_account());
            }
        }
        Ok(())
    }

    async fn upgrade_replicas(&self) -> Result<(), Error> {
        let api: Api<CStorVolumeReplica> =
            Api::namespaced(self.client.clone(), &self.patch.namespace);
        let replicas = list(&api, &selector(PV_LABEL, &self.name))
            .await
            .step(REPLICA_UPGRADE, "failed to list cvrs for volume")?;
        for replica in replicas {
            let name = replica.name_any();
            upgrade_cvr(self.client, self.patch, &name)
                .await
                .step(REPLICA_UPGRADE, &format!("failed to patch cvr {name}"))?;
        }
        Ok(())
    }

    async fn upgrade_target(&self, volume: &mut VolumeTarget) -> Result<(), Error> {
        let (from, to) = (&self.patch.from, &self.patch.to);
        let convergence = self.patch.convergence;
        volume
            .deploy
            .patch(from, to)
            .await
            .step(TARGET_UPGRADE, "failed to patch target deploy")?;
        volume
            .svc
            .patch(from, to)
            .await
            .step(TARGET_UPGRADE, "failed to patch target svc")?;
        volume
            .cv
            .patch(from, to)
            .await
            .step(TARGET_UPGRADE, "failed to patch CV")?;
        volume
            .cv
            .verify(to, convergence)
            .await
            .step(TARGET_UPGRADE, "failed to verify version reconcile on CV")?;
        volume
            .cvc
            .patch(from, to)
            .await
            .step(TARGET_UPGRADE, "failed to patch CVC")?;
        volume
            .cvc
            .verify(to, convergence)
            .await
            .step(TARGET_UPGRADE, "failed to verify version reconcile on CVC")?;
        Ok(())
    }
}

/// Service account of the upgraded target pods.
fn target_service_account() -> String {
    std::env::var(CSTOR_OPERATOR_SERVICE_ACCOUNT_ENV)
        .ok()
        .filter(|account| !account.is_empty())
        .unwrap_or_else(|| DEFAULT_CSTOR_OPERATOR_SERVICE_ACCOUNT.to_string())
}
