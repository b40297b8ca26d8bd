use crate::{
    common::{
        constants::OPENEBS_VERSION_LABEL, image::target_image, retry::RetryPolicy,
    },
    crd::task::{
        CStorPoolClusterRef, CStorPoolInstanceRef, ResourceSpec, UpgradeTask, UpgradeTaskSpec,
        VolumeRef,
    },
    error::Error,
};
use k8s_openapi::api::core::v1::PodTemplateSpec;
use kube::{Client, ResourceExt};
use tracing::info;

/// Upgrade of a cStor pool cluster and its pool instances.
pub mod cspc;
/// Upgrade of a cStor pool instance and its pool deployment.
pub mod cspi;
/// Upgrade of a CSI cStor volume, its replicas and its target.
pub mod cstor_volume;
/// Upgrade of a cStor volume replica.
pub mod cvr;
/// Upgrade of a Jiva volume, its replicas and its controller.
pub mod jiva_volume;

/// Step which validates the resources before they are changed.
pub const PRE_UPGRADE: &str = "PreUpgrade";
/// Step which upgrades a pool instance.
pub const POOL_INSTANCE_UPGRADE: &str = "PoolInstanceUpgrade";
/// Step which upgrades the replicas of a volume.
pub const REPLICA_UPGRADE: &str = "ReplicaUpgrade";
/// Step which upgrades the target of a volume.
pub const TARGET_UPGRADE: &str = "TargetUpgrade";

/// The versions and image details of an upgrade, shared by all the resources it touches.
#[derive(Debug, Clone)]
pub struct ResourcePatch {
    /// The version the resources are upgraded from.
    pub from: String,
    /// The version the resources are upgraded to.
    pub to: String,
    /// Image tag to use instead of the target version.
    pub image_tag: String,
    /// Registry and repository path to use instead of the current one.
    pub image_prefix: String,
    /// Namespace of the OpenEBS control plane.
    pub namespace: String,
    /// How long to wait for workloads to roll out.
    pub rollout: RetryPolicy,
    /// How long to wait for the operators to reconcile a version.
    pub convergence: RetryPolicy,
    /// Whether the run is driven by an UpgradeTask, in which case the task must be recorded.
    pub task_job: bool,
}

impl ResourcePatch {
    /// The tag of the upgraded images.
    pub fn tag(&self) -> &str {
        if self.image_tag.is_empty() {
            &self.to
        } else {
            &self.image_tag
        }
    }

    /// Check that the upgrade can be attempted.
    pub fn validate(&self) -> Result<(), Error> {
        let missing = if self.namespace.trim().is_empty() {
            Some("openebs namespace")
        } else if self.from.trim().is_empty() {
            Some("from version")
        } else if self.to.trim().is_empty() {
            Some("to version")
        } else {
            None
        };
        match missing {
            Some(what) => Err(Error::Precondition {
                message: format!("Cannot execute upgrade job: {what} is missing"),
            }),
            None => Ok(()),
        }
    }

    /// Point the containers of the template to the target images and set the version label.
    pub(crate) fn upgrade_template(
        &self,
        template: &mut PodTemplateSpec,
        strip_suffix: Option<&str>,
    ) -> Result<(), Error> {
        if let Some(spec) = template.spec.as_mut() {
            for container in spec.containers.iter_mut() {
                let image = container.image.clone().unwrap_or_default();
                container.image = Some(target_image(
                    &image,
                    &self.image_prefix,
                    self.tag(),
                    strip_suffix,
                )?);
            }
        }
        template
            .metadata
            .get_or_insert_with(Default::default)
            .labels
            .get_or_insert_with(Default::default)
            .insert(OPENEBS_VERSION_LABEL.to_string(), self.to.clone());
        Ok(())
    }

    /// Set the version label of the object.
    pub(crate) fn label_version<K: ResourceExt>(&self, object: &mut K) {
        object
            .labels_mut()
            .insert(OPENEBS_VERSION_LABEL.to_string(), self.to.clone());
    }

    fn upgrade_task(&self, target: &UpgradeTarget) -> UpgradeTask {
        let mut task = UpgradeTask::new(
            &target.task_name(),
            UpgradeTaskSpec {
                from_version: self.from.clone(),
                to_version: self.to.clone(),
                image_tag: self.image_tag.clone(),
                image_prefix: self.image_prefix.clone(),
                resource_spec: target.resource_spec(),
            },
        );
        task.metadata.namespace = Some(self.namespace.clone());
        task
    }
}

/// A resource which is upgraded under an UpgradeTask.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum UpgradeTarget {
    /// A CStorPoolInstance by name.
    PoolInstance(String),
    /// A CStorPoolCluster by name.
    PoolCluster(String),
    /// A CSI cStor volume by persistent volume name.
    CstorVolume(String),
    /// A Jiva volume by persistent volume name.
    JivaVolume(String),
}

impl UpgradeTarget {
    /// Name of the UpgradeTask recording the upgrade of the resource.
    pub fn task_name(&self) -> String {
        match self {
            Self::PoolInstance(name) => format!("upgrade-cstor-cspi-{name}"),
            Self::PoolCluster(name) => format!("upgrade-cstor-cspc-{name}"),
            Self::CstorVolume(name) => format!("upgrade-cstor-csi-volume-{name}"),
            Self::JivaVolume(name) => format!("upgrade-jiva-volume-{name}"),
        }
    }

    /// Name of the resource.
    pub fn name(&self) -> &str {
        match self {
            Self::PoolInstance(name)
            | Self::PoolCluster(name)
            | Self::CstorVolume(name)
            | Self::JivaVolume(name) => name,
        }
    }

    fn resource_spec(&self) -> ResourceSpec {
        let mut spec = ResourceSpec::default();
        match self {
            Self::PoolInstance(name) => {
                spec.cstor_pool_instance = Some(CStorPoolInstanceRef {
                    cspi_name: name.clone(),
                })
            }
            Self::PoolCluster(name) => {
                spec.cstor_pool_cluster = Some(CStorPoolClusterRef {
                    cspc_name: name.clone(),
                })
            }
            Self::CstorVolume(name) => {
                spec.cstor_volume = Some(VolumeRef {
                    pv_name: name.clone(),
                })
            }
            Self::JivaVolume(name) => {
                spec.jiva_volume = Some(VolumeRef {
                    pv_name: name.clone(),
                })
            }
        }
        spec
    }

    /// The resource an UpgradeTask refers to.
    pub fn from_task(task: &UpgradeTask) -> Option<Self> {
        let spec = &task.spec.resource_spec;
        if let Some(cspi) = &spec.cstor_pool_instance {
            Some(Self::PoolInstance(cspi.cspi_name.clone()))
        } else if let Some(cspc) = &spec.cstor_pool_cluster {
            Some(Self::PoolCluster(cspc.cspc_name.clone()))
        } else if let Some(volume) = &spec.cstor_volume {
            Some(Self::CstorVolume(volume.pv_name.clone()))
        } else {
            spec.jiva_volume
                .as_ref()
                .map(|volume| Self::JivaVolume(volume.pv_name.clone()))
        }
    }
}

impl ResourcePatch {
    /// Apply the task overrides of the versions and images.
    pub fn with_task(mut self, task: &UpgradeTask) -> Self {
        let spec = &task.spec;
        for (value, field) in [
            (&mut self.from, &spec.from_version),
            (&mut self.to, &spec.to_version),
            (&mut self.image_tag, &spec.image_tag),
            (&mut self.image_prefix, &spec.image_prefix),
        ] {
            if !field.trim().is_empty() {
                *value = field.clone();
            }
        }
        self
    }
}

/// The ledger message of a failed operation on a volume.
pub(crate) fn for_volume(action: &str, volume: &str) -> String {
    format!("{action} for volume {volume}")
}

/// Upgrade the resource from one version to another.
pub async fn upgrade(
    client: &Client,
    patch: &ResourcePatch,
    target: &UpgradeTarget,
) -> Result<(), Error> {
    patch.validate()?;
    info!(resource = target.name(), to = %patch.to, "Upgrading");
    match target {
        UpgradeTarget::PoolInstance(name) => cspi::CspiUpgrade::new(client, patch, name).run().await,
        UpgradeTarget::PoolCluster(name) => cspc::CspcUpgrade::new(client, patch, name).run().await,
        UpgradeTarget::CstorVolume(name) => {
            cstor_volume::CStorVolumeUpgrade::new(client, patch, name)
                .run()
                .await
        }
        UpgradeTarget::JivaVolume(name) => {
            jiva_volume::JivaVolumeUpgrade::new(client, patch, name)
                .run()
                .await
        }
    }?;
    info!(resource = target.name(), to = %patch.to, "Successfully upgraded");
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, PodSpec};

    pub(crate) fn patch() -> ResourcePatch {
        ResourcePatch {
            from: "1.12.0".to_string(),
            to: "2.0.0".to_string(),
            image_tag: String::new(),
            image_prefix: String::new(),
            namespace: "openebs".to_string(),
            rollout: RetryPolicy::rollout(),
            convergence: RetryPolicy::convergence(),
            task_job: false,
        }
    }

    #[test]
    fn volume_messages() {
        assert_eq!(
            for_volume("failed to get target svc", "pvc-1"),
            "failed to get target svc for volume pvc-1"
        );
    }

    #[test]
    fn task_overrides() {
        let task = UpgradeTask::new(
            "upgrade-cstor-cspi-pool-a",
            UpgradeTaskSpec {
                from_version: "1.12.0".to_string(),
                to_version: "2.1.0".to_string(),
                image_tag: "2.1.0-ee".to_string(),
                resource_spec: UpgradeTarget::PoolInstance("pool-a".to_string()).resource_spec(),
                ..Default::default()
            },
        );
        let patch = patch().with_task(&task);
        assert_eq!(patch.to, "2.1.0");
        assert_eq!(patch.tag(), "2.1.0-ee");
        assert_eq!(
            UpgradeTarget::from_task(&task),
            Some(UpgradeTarget::PoolInstance("pool-a".to_string()))
        );
        assert_eq!(
            UpgradeTarget::CstorVolume("pvc-1".to_string()).task_name(),
            "upgrade-cstor-csi-volume-pvc-1"
        );
        let mut invalid = patch.clone();
        invalid.from = " ".to_string();
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn template_images() {
        let mut template = PodTemplateSpec {
            spec: Some(PodSpec {
                containers: vec![
                    Container {
                        name: "cstor-pool".to_string(),
                        image: Some("openebs/cstor-pool-amd64:1.12.0".to_string()),
                        ..Default::default()
                    },
                    Container {
                        name: "maya-exporter".to_string(),
                        image: Some("quay.io/openebs/m-exporter:1.12.0".to_string()),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }),
            ..Default::default()
        };
        let mut patch = patch();
        patch.image_tag = "2.0.0-ee".to_string();
        patch
            .upgrade_template(&mut template, Some(crate::common::constants::AMD64_SUFFIX))
            .unwrap();
        let spec = template.spec.unwrap();
        assert_eq!(
            spec.containers[0].image.as_deref(),
            Some("openebs/cstor-pool:2.0.0-ee")
        );
        assert_eq!(
            spec.containers[1].image.as_deref(),
            Some("quay.io/openebs/m-exporter:2.0.0-ee")
        );
        assert_eq!(
            template.metadata.unwrap().labels.unwrap()[OPENEBS_VERSION_LABEL],
            "2.0.0"
        );
    }
}
