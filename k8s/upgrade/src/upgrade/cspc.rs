use super::{cspi::CspiUpgrade, ResourcePatch, UpgradeTarget, POOL_INSTANCE_UPGRADE, PRE_UPGRADE};
use crate::{
    common::{
        client::{list, selector},
        constants::{CSPC_LABEL, CSPC_OPERATOR},
        version::is_operator_upgraded,
    },
    crd::cstor::{CStorPoolCluster, CStorPoolInstance},
    error::{Error, StepContext},
    ledger::Ledger,
    resource::{Patchable, VersionedResource},
};
use kube::{Api, Client, ResourceExt};
use tracing::info;

/// Upgrades a CStorPoolCluster, then each of its pool instances.
pub struct CspcUpgrade<'a> {
    client: &'a Client,
    patch: &'a ResourcePatch,
    name: String,
}

impl<'a> CspcUpgrade<'a> {
    /// A new upgrade of the named pool cluster.
    pub fn new(client: &'a Client, patch: &'a ResourcePatch, name: &str) -> Self {
        Self {
            client,
            patch,
            name: name.to_string(),
        }
    }

    /// Run the upgrade, recording it into its UpgradeTask.
    #[tracing::instrument(skip(self), fields(cspc = %self.name))]
    pub async fn run(&self) -> Result<(), Error> {
        let target = UpgradeTarget::PoolCluster(self.name.clone());
        let mut ledger = Ledger::get_or_create(
            self.client,
            &self.patch.namespace,
            self.patch.upgrade_task(&target),
            self.patch.task_job,
        )
        .await?;
        let mut cspc = ledger
            .run_step(
                PRE_UPGRADE,
                "Pre-upgrade steps were successful",
                self.pre_upgrade(),
            )
            .await?;
        ledger
            .run_step(
                POOL_INSTANCE_UPGRADE,
                "Pool cluster upgrade was successful",
                self.upgrade(&mut cspc),
            )
            .await
    }

    async fn pre_upgrade(&self) -> Result<VersionedResource<CStorPoolCluster>, Error> {
        is_operator_upgraded(self.client, CSPC_OPERATOR, &self.patch.namespace, &self.patch.to)
            .await
            .step(PRE_UPGRADE, "failed to verify cspc-operator")?;
        let api: Api<CStorPoolCluster> = Api::namespaced(self.client.clone(), &self.patch.namespace);
        let mut cspc = VersionedResource::get(api, &self.name)
            .await
            .step(PRE_UPGRADE, "failed to get cstor pool cluster")?;
        cspc.pre_checks(&self.patch.from, &self.patch.to)
            .step(PRE_UPGRADE, "failed to verify cstor pool cluster")?;
        cspc.transform(|cspc| {
            self.patch.label_version(cspc);
            cspc.version_details.desired = self.patch.to.clone();
            Ok(())
        })
        .step(PRE_UPGRADE, "failed to create cstor pool cluster patch")?;
        Ok(cspc)
    }

    async fn upgrade(&self, cspc: &mut VersionedResource<CStorPoolCluster>) -> Result<(), Error> {
        let (from, to) = (&self.patch.from, &self.patch.to);
        cspc.patch(from, to)
            .await
            .step(POOL_INSTANCE_UPGRADE, "failed to patch cstor pool cluster")?;
        cspc.verify(to, self.patch.convergence)
            .await
            .step(POOL_INSTANCE_UPGRADE, "failed to verify cstor pool cluster")?;

        let cspi_api: Api<CStorPoolInstance> =
            Api::namespaced(self.client.clone(), &self.patch.namespace);
        let instances = list(&cspi_api, &selector(CSPC_LABEL, &self.name))
            .await
            .step(POOL_INSTANCE_UPGRADE, "failed to list cstor pool instances")?;
        for instance in instances {
            let name = instance.name_any();
            let upgrade = CspiUpgrade::new(self.client, self.patch, &name);
            let mut pool = upgrade
                .pre_upgrade()
                .await
                .step(POOL_INSTANCE_UPGRADE, &format!("failed to verify cspi {name}"))?;
            upgrade
                .upgrade(&mut pool)
                .await
                .step(POOL_INSTANCE_UPGRADE, &format!("failed to upgrade cspi {name}"))?;
            info!(cspi = %name, "Pool instance upgraded");
        }
        Ok(())
    }
}
