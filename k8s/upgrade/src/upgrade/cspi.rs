use super::{ResourcePatch, UpgradeTarget, POOL_INSTANCE_UPGRADE, PRE_UPGRADE};
use crate::{
    common::{
        client::selector,
        constants::{AMD64_SUFFIX, CSPI_LABEL, CSPI_NAME_LABEL},
    },
    crd::cstor::CStorPoolInstance,
    error::{Error, StepContext},
    ledger::Ledger,
    migrate::backup_restore::migrate_backups,
    resource::{Patchable, VersionedResource},
};
use k8s_openapi::api::apps::v1::Deployment;
use kube::{Api, Client};

/// The pool instance and the deployment running its pool.
pub(crate) struct PoolInstance {
    deploy: VersionedResource<Deployment>,
    cspi: VersionedResource<CStorPoolInstance>,
}

/// Upgrades a CStorPoolInstance: its pool deployment first, then the instance itself.
pub struct CspiUpgrade<'a> {
    client: &'a Client,
    patch: &'a ResourcePatch,
    name: String,
}

impl<'a> CspiUpgrade<'a> {
    /// A new upgrade of the named pool instance.
    pub fn new(client: &'a Client, patch: &'a ResourcePatch, name: &str) -> Self {
        Self {
            client,
            patch,
            name: name.to_string(),
        }
    }

    /// Run the upgrade, recording it into its UpgradeTask.
    #[tracing::instrument(skip(self), fields(cspi = %self.name))]
    pub async fn run(&self) -> Result<(), Error> {
        let target = UpgradeTarget::PoolInstance(self.name.clone());
        let mut ledger = Ledger::get_or_create(
            self.client,
            &self.patch.namespace,
            self.patch.upgrade_task(&target),
            self.patch.task_job,
        )
        .await?;
        let mut pool = ledger
            .run_step(
                PRE_UPGRADE,
                "Pre-upgrade steps were successful",
                self.pre_upgrade(),
            )
            .await?;
        ledger
            .run_step(
                POOL_INSTANCE_UPGRADE,
                "Pool instance upgrade was successful",
                self.upgrade(&mut pool),
            )
            .await
    }

    /// Get the pool instance and its deployment, and check they are in a known version.
    pub(crate) async fn pre_upgrade(&self) -> Result<PoolInstance, Error> {
        let pool = self.init().await?;
        check_pool_instance(&pool.deploy, &pool.cspi, &self.patch.from, &self.patch.to)?;
        Ok(pool)
    }

    async fn init(&self) -> Result<PoolInstance, Error> {
        let namespace = &self.patch.namespace;
        let deploy_api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let mut deploy =
            VersionedResource::get_by_label(deploy_api, &selector(CSPI_LABEL, &self.name))
                .await
                .step(PRE_UPGRADE, "failed to get cstor pool deployment")?
                .with_rollout(self.patch.rollout);
        deploy
            .transform(|deploy| self.transform_deploy(deploy))
            .step(PRE_UPGRADE, "failed to create cstor pool deployment patch")?;

        let cspi_api: Api<CStorPoolInstance> = Api::namespaced(self.client.clone(), namespace);
        let mut cspi = VersionedResource::get(cspi_api, &self.name)
            .await
            .step(PRE_UPGRADE, "failed to get cstor pool instance")?;
        cspi.transform(|cspi| {
            self.patch.label_version(cspi);
            cspi.version_details.desired = self.patch.to.clone();
            Ok(())
        })
        .step(PRE_UPGRADE, "failed to create cstor pool instance patch")?;
        Ok(PoolInstance { deploy, cspi })
    }

    fn transform_deploy(&self, deploy: &mut Deployment) -> Result<(), Error> {
        self.patch.label_version(deploy);
        if let Some(spec) = deploy.spec.as_mut() {
            self.patch
                .upgrade_template(&mut spec.template, Some(AMD64_SUFFIX))?;
        }
        Ok(())
    }

    pub(crate) async fn upgrade(&self, pool: &mut PoolInstance) -> Result<(), Error> {
        let (from, to) = (&self.patch.from, &self.patch.to);
        pool.deploy
            .patch(from, to)
            .await
            .step(POOL_INSTANCE_UPGRADE, "failed to patch cstor pool deployment")?;
        pool.cspi
            .patch(from, to)
            .await
            .step(POOL_INSTANCE_UPGRADE, "failed to patch cstor pool instance")?;
        pool.cspi
            .verify(to, self.patch.convergence)
            .await
            .step(POOL_INSTANCE_UPGRADE, "failed to verify cstor pool instance")?;
        migrate_backups(
            self.client,
            &self.patch.namespace,
            &selector(CSPI_NAME_LABEL, &self.name),
            None,
        )
        .await
        .step(
            POOL_INSTANCE_UPGRADE,
            "failed to migrate backups and restores to v1",
        )
    }
}

/// Both the pool deployment and the pool instance must be in the source or the target version.
fn check_pool_instance(
    deploy: &dyn Patchable,
    cspi: &dyn Patchable,
    from: &str,
    to: &str,
) -> Result<(), Error> {
    deploy
        .pre_checks(from, to)
        .step(PRE_UPGRADE, "failed to verify cstor pool deployment")?;
    cspi.pre_checks(from, to)
        .step(PRE_UPGRADE, "failed to verify cstor pool instance")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{retry::RetryPolicy, version::PatchOutcome};
    use async_trait::async_trait;

    struct Versions {
        kind: &'static str,
        version: &'static str,
    }

    #[async_trait]
    impl Patchable for Versions {
        fn kind(&self) -> &'static str {
            self.kind
        }
        fn name(&self) -> String {
            "cstor-disk-abcd".to_string()
        }
        fn current_version(&self) -> String {
            self.version.to_string()
        }
        fn desired_version(&self) -> String {
            self.version.to_string()
        }
        async fn patch(&mut self, from: &str, to: &str) -> Result<PatchOutcome, Error> {
            PatchOutcome::plan(self.kind, &self.name(), self.version, from, to)
        }
        async fn verify(&self, _to: &str, _policy: RetryPolicy) -> Result<(), Error> {
            Ok(())
        }
    }

    fn versions(kind: &'static str, version: &'static str) -> Versions {
        Versions { kind, version }
    }

    #[test]
    fn pool_instance_versions() {
        let deploy = versions("Deployment", "2.0.0");
        let cspi = versions("CStorPoolInstance", "2.1.0");
        assert!(check_pool_instance(&deploy, &cspi, "2.0.0", "2.1.0").is_ok());

        let foreign = versions("CStorPoolInstance", "1.12.0");
        let error = check_pool_instance(&deploy, &foreign, "2.0.0", "2.1.0").unwrap_err();
        assert_eq!(
            error.message_and_reason().0,
            "failed to verify cstor pool instance"
        );

        let foreign = versions("Deployment", "1.12.0");
        let error = check_pool_instance(&foreign, &cspi, "2.0.0", "2.1.0").unwrap_err();
        assert_eq!(
            error.message_and_reason().0,
            "failed to verify cstor pool deployment"
        );
    }
}
