use super::{PatchStrategy, Versioned};
use crate::{
    common::{
        constants::OPENEBS_VERSION_LABEL,
        retry::RetryPolicy,
        rollout::{deployment_revision, wait_deployment, wait_statefulset},
    },
    error::Error,
};
use async_trait::async_trait;
use k8s_openapi::api::{
    apps::v1::{Deployment, StatefulSet},
    core::v1::Service,
};
use kube::{Api, ResourceExt};

fn version_label<K: ResourceExt>(object: &K) -> String {
    object
        .labels()
        .get(OPENEBS_VERSION_LABEL)
        .cloned()
        .unwrap_or_default()
}

#[async_trait]
impl Versioned for Deployment {
    const KIND: &'static str = "deployment";
    const STRATEGY: PatchStrategy = PatchStrategy::Strategic;

    fn current_version(&self) -> String {
        version_label(self)
    }
    fn desired_version(&self) -> String {
        version_label(self)
    }
    async fn wait_rollout(
        api: &Api<Self>,
        patched: &Self,
        policy: RetryPolicy,
    ) -> Result<(), Error> {
        wait_deployment(api, &patched.name_any(), deployment_revision(patched), policy).await
    }
}

#[async_trait]
impl Versioned for StatefulSet {
    const KIND: &'static str = "statefulset";
    const STRATEGY: PatchStrategy = PatchStrategy::Strategic;

    fn current_version(&self) -> String {
        version_label(self)
    }
    fn desired_version(&self) -> String {
        version_label(self)
    }
    async fn wait_rollout(
        api: &Api<Self>,
        patched: &Self,
        policy: RetryPolicy,
    ) -> Result<(), Error> {
        wait_statefulset(api, &patched.name_any(), policy).await
    }
}

impl Versioned for Service {
    const KIND: &'static str = "service";
    const STRATEGY: PatchStrategy = PatchStrategy::Strategic;

    fn current_version(&self) -> String {
        version_label(self)
    }
    fn desired_version(&self) -> String {
        version_label(self)
    }
}
