use super::{
    for_volume, ResourcePatch, UpgradeTarget, PRE_UPGRADE, REPLICA_UPGRADE, TARGET_UPGRADE,
};
use crate::{
    common::{
        client::selector,
        constants::{
            COMPONENT_LABEL, JIVA_CONTROLLER, JIVA_CONTROLLER_SERVICE, JIVA_OPERATOR, JIVA_REPLICA,
            PV_LABEL,
        },
        version::is_operator_upgraded,
    },
    crd::jiva::JivaVolume,
    error::{Error, StepContext},
    ledger::Ledger,
    resource::{Patchable, VersionedResource},
};
use k8s_openapi::api::{
    apps::v1::{Deployment, StatefulSet},
    core::v1::Service,
};
use kube::{Api, Client};

/// The resources of a Jiva volume.
struct JivaResources {
    controller: VersionedResource<Deployment>,
    replicas: VersionedResource<StatefulSet>,
    svc: VersionedResource<Service>,
    jv: VersionedResource<JivaVolume>,
}

/// Upgrades a Jiva volume: its replica statefulset first, then its controller.
pub struct JivaVolumeUpgrade<'a> {
    client: &'a Client,
    patch: &'a ResourcePatch,
    name: String,
}

/// Selector of the jiva component of the volume.
fn component_selector(component: &str, pv: &str) -> String {
    format!(
        "{},{}",
        selector(COMPONENT_LABEL, component),
        selector(PV_LABEL, pv)
    )
}

impl<'a> JivaVolumeUpgrade<'a> {
    /// A new upgrade of the Jiva volume of the named persistent volume.
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
        let target = UpgradeTarget::JivaVolume(self.name.clone());
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
                self.upgrade_replicas(&mut volume),
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

    async fn pre_upgrade(&self) -> Result<JivaResources, Error> {
        let volume = self.init().await?;
        let (from, to) = (&self.patch.from, &self.patch.to);
        is_operator_upgraded(self.client, JIVA_OPERATOR, &self.patch.namespace, to)
            .await
            .step(PRE_UPGRADE, "failed to verify jiva-operator")?;
        volume
            .controller
            .pre_checks(from, to)
            .step(PRE_UPGRADE, "failed to verify controller deploy")?;
        volume
            .replicas
            .pre_checks(from, to)
            .step(PRE_UPGRADE, "failed to verify replica statefulset")?;
        volume
            .svc
            .pre_checks(from, to)
            .step(PRE_UPGRADE, "failed to verify target svc")?;
        volume
            .jv
            .pre_checks(from, to)
            .step(PRE_UPGRADE, "failed to verify jivavolume CR")?;
        Ok(volume)
    }

    async fn init(&self) -> Result<JivaResources, Error> {
        let namespace = &self.patch.namespace;
        let name = &self.name;
        let patch = self.patch;

        let deploy_api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let mut controller =
            VersionedResource::get_by_label(deploy_api, &component_selector(JIVA_CONTROLLER, name))
                .await
                .step(
                    PRE_UPGRADE,
                    &for_volume("failed to get controller deployment", name),
                )?
                .with_rollout(patch.rollout);
        let sts_api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        let mut replicas =
            VersionedResource::get_by_label(sts_api, &component_selector(JIVA_REPLICA, name))
                .await
                .step(
                    PRE_UPGRADE,
                    &for_volume("failed to list replica statefulset", name),
                )?
                .with_rollout(patch.rollout);
        let svc_api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let mut svc = VersionedResource::get_by_label(
            svc_api,
            &component_selector(JIVA_CONTROLLER_SERVICE, name),
        )
        .await
        .step(PRE_UPGRADE, &for_volume("failed to get target svc", name))?;
        let jv_api: Api<JivaVolume> = Api::namespaced(self.client.clone(), namespace);
        let mut jv = VersionedResource::get(jv_api, name)
            .await
            .step(
                PRE_UPGRADE,
                &for_volume("failed to get jivavolume CR", name),
            )?;

        controller
            .transform(|deploy| {
                patch.label_version(deploy);
                match deploy.spec.as_mut() {
                    Some(spec) => patch.upgrade_template(&mut spec.template, None),
                    None => Ok(()),
                }
            })
            .step(
                PRE_UPGRADE,
                &for_volume("failed to create target deploy patch", name),
            )?;
        svc.transform(|svc| {
            patch.label_version(svc);
            Ok(())
        })
        .step(
            PRE_UPGRADE,
            &for_volume("failed to create target svc patch", name),
        )?;
        replicas
            .transform(|sts| {
                patch.label_version(sts);
                match sts.spec.as_mut() {
                    Some(spec) => patch.upgrade_template(&mut spec.template, None),
                    None => Ok(()),
                }
            })
            .step(
                PRE_UPGRADE,
                &for_volume("failed to create replica sts patch", name),
            )?;
        jv.transform(|jv| {
            jv.version_details.desired = patch.to.clone();
            Ok(())
        })
        .step(
            PRE_UPGRADE,
            &for_volume("failed to create jivavolume patch", name),
        )?;
        Ok(JivaResources {
            controller,
            replicas,
            svc,
            jv,
        })
    }

    async fn upgrade_replicas(&self, volume: &mut JivaResources) -> Result<(), Error> {
        volume
            .replicas
            .patch(&self.patch.from, &self.patch.to)
            .await
            .step(REPLICA_UPGRADE, "failed to patch replica sts")?;
        Ok(())
    }

    async fn upgrade_target(&self, volume: &mut JivaResources) -> Result<(), Error> {
        let (from, to) = (&self.patch.from, &self.patch.to);
        volume
            .controller
            .patch(from, to)
            .await
            .step(TARGET_UPGRADE, "failed to patch target deploy")?;
        volume
            .svc
            .patch(from, to)
            .await
            .step(TARGET_UPGRADE, "failed to patch target svc")?;
        volume
            .jv
            .patch(from, to)
            .await
            .step(TARGET_UPGRADE, "failed to patch JivaCR")?;
        volume
            .jv
            .verify(to, self.patch.convergence)
            .await
            .step(TARGET_UPGRADE, "failed to verify version reconcile on JivaVolumeCR")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors() {
        assert_eq!(
            component_selector(JIVA_REPLICA, "pvc-1"),
            "openebs.io/component=jiva-replica,openebs.io/persistent-volume=pvc-1"
        );
    }
}
