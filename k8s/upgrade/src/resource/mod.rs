use crate::{
    common::{
        client::{get_one, merge_patch, strategic_patch},
        patch::{diff, strategic_diff},
        retry::{poll, RetryPolicy},
        version::{check_version, PatchOutcome},
    },
    error::Error,
};
use async_trait::async_trait;
use kube::{Api, Resource, ResourceExt};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;
use tracing::info;

/// Versions of the custom resources reconciled by the OpenEBS operators.
mod custom;
/// Versions of the kubernetes workloads and services.
mod native;

/// How a resource is patched.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PatchStrategy {
    /// Strategic merge patch, for the built-in kubernetes kinds.
    Strategic,
    /// JSON merge patch, for custom resources.
    Merge,
}

/// A resource which carries an OpenEBS version.
#[async_trait]
pub trait Versioned:
    Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Short name of the kind, as used in log and error messages.
    const KIND: &'static str;
    /// How the resource is patched.
    const STRATEGY: PatchStrategy;
    /// Whether an operator reconciles the current version towards the desired version.
    const RECONCILED: bool = false;

    /// The version the resource is in.
    fn current_version(&self) -> String;
    /// The version the resource should be in.
    fn desired_version(&self) -> String;
    /// The message and reason of the last version reconcile, if any.
    fn reconcile_status(&self) -> Option<(String, String)> {
        None
    }
    /// Wait for the patched resource to roll out.
    async fn wait_rollout(
        _api: &Api<Self>,
        _patched: &Self,
        _policy: RetryPolicy,
    ) -> Result<(), Error> {
        Ok(())
    }
}

/// A resource which is upgraded from one version to another.
#[async_trait]
pub trait Patchable: Send + Sync {
    /// Short name of the kind.
    fn kind(&self) -> &'static str;
    /// Name of the resource.
    fn name(&self) -> String;
    /// The version the resource is in.
    fn current_version(&self) -> String;
    /// The version the resource should be in.
    fn desired_version(&self) -> String;
    /// Check that the resource is in either of the versions.
    fn pre_checks(&self, from: &str, to: &str) -> Result<(), Error> {
        check_version(self.kind(), &self.name(), &self.current_version(), from, to)
    }
    /// Patch the resource if it is in the source version, a resource in any other version
    /// than the source or the target one is left untouched and reported as an error.
    async fn patch(&mut self, from: &str, to: &str) -> Result<PatchOutcome, Error>;
    /// Wait for the resource to be reconciled into the given version.
    async fn verify(&self, to: &str, policy: RetryPolicy) -> Result<(), Error>;
}

/// A versioned resource along with the desired state it is patched into.
pub struct VersionedResource<K: Versioned> {
    api: Api<K>,
    object: K,
    desired: Option<K>,
    rollout: RetryPolicy,
}

impl<K: Versioned> VersionedResource<K> {
    /// Wrap the object.
    pub fn new(api: Api<K>, object: K) -> Self {
        Self {
            api,
            object,
            desired: None,
            rollout: RetryPolicy::rollout(),
        }
    }
    /// Get the resource by name.
    pub async fn get(api: Api<K>, name: &str) -> Result<Self, Error> {
        let object = api.get(name).await?;
        Ok(Self::new(api, object))
    }
    /// Get the only resource matching the label selector.
    pub async fn get_by_label(api: Api<K>, selector: &str) -> Result<Self, Error> {
        let object = get_one(&api, selector).await?;
        Ok(Self::new(api, object))
    }
    /// Use the given policy to wait for rollouts.
    pub fn with_rollout(mut self, rollout: RetryPolicy) -> Self {
        self.rollout = rollout;
        self
    }
    /// The resource as last read or patched.
    pub fn object(&self) -> &K {
        &self.object
    }
    /// Build the desired state of the resource from its current state.
    pub fn transform<F>(&mut self, transform: F) -> Result<(), Error>
    where
        F: FnOnce(&mut K) -> Result<(), Error>,
    {
        let mut desired = self.object.clone();
        transform(&mut desired)?;
        self.desired = Some(desired);
        Ok(())
    }
}

#[async_trait]
impl<K: Versioned> Patchable for VersionedResource<K> {
    fn kind(&self) -> &'static str {
        K::KIND
    }
    fn name(&self) -> String {
        self.object.name_any()
    }
    fn current_version(&self) -> String {
        self.object.current_version()
    }
    fn desired_version(&self) -> String {
        self.object.desired_version()
    }

    #[tracing::instrument(skip(self), fields(kind = K::KIND, name = %self.object.name_any()))]
    async fn patch(&mut self, from: &str, to: &str) -> Result<PatchOutcome, Error> {
        let name = self.object.name_any();
        let outcome = PatchOutcome::plan(K::KIND, &name, &self.object.desired_version(), from, to)?;
        match outcome {
            PatchOutcome::AlreadyUpgraded => {
                info!("{} already in {to} version", K::KIND);
            }
            PatchOutcome::Patched => {
                let desired = self.desired.as_ref().ok_or_else(|| Error::Generic {
                    message: format!("no desired state for {} {name}", K::KIND),
                })?;
                let resource_version = self.object.resource_version();
                let patched = match K::STRATEGY {
                    PatchStrategy::Strategic => {
                        let payload = strategic_diff(&self.object, desired)?
                            .with_resource_version(resource_version);
                        strategic_patch(&self.api, &name, payload).await?
                    }
                    PatchStrategy::Merge => {
                        let payload =
                            diff(&self.object, desired)?.with_resource_version(resource_version);
                        merge_patch(&self.api, &name, payload).await?
                    }
                };
                if let Some(patched) = patched {
                    K::wait_rollout(&self.api, &patched, self.rollout).await?;
                    self.object = patched;
                }
                info!("{} {name} patched", K::KIND);
            }
        }
        Ok(outcome)
    }

    async fn verify(&self, to: &str, policy: RetryPolicy) -> Result<(), Error> {
        if !K::RECONCILED {
            return Ok(());
        }
        let name = self.object.name_any();
        poll(
            policy,
            &format!("{} {name} to reconcile version {to}", K::KIND),
            || version_reconciled(&self.api, &name, to),
        )
        .await
    }
}

async fn version_reconciled<K: Versioned>(
    api: &Api<K>,
    name: &str,
    to: &str,
) -> Result<Option<()>, Error> {
    let object = api.get(name).await?;
    if object.current_version() == to {
        return Ok(Some(()));
    }
    match object.reconcile_status() {
        Some((message, reason)) if !message.is_empty() || !reason.is_empty() => {
            info!(kind = K::KIND, name, %reason, "Version reconcile in progress: {message}")
        }
        _ => info!(kind = K::KIND, name, "Waiting for version {to} to be reconciled"),
    }
    Ok(None)
}
