use crate::{
    common::{
        client::{list, selector},
        constants::{COMPONENT_NAME_LABEL, OPENEBS_VERSION_LABEL},
    },
    error::Error,
};
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client, ResourceExt};

/// The version without any pre-release or edition suffix, eg: `2.0.0` for `2.0.0-ee`.
pub fn base_version(version: &str) -> &str {
    version.split('-').next().unwrap_or(version)
}

/// Check that a resource is either in the source or in the target version, ignoring suffixes.
/// Any other version means the resource was not created by the expected release.
pub fn check_version(
    kind: &str,
    name: &str,
    version: &str,
    from: &str,
    to: &str,
) -> Result<(), Error> {
    let current = base_version(version);
    if current != base_version(from) && current != base_version(to) {
        return Err(Error::VersionMismatch {
            kind: kind.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        });
    }
    Ok(())
}

/// Outcome of a version-conditional patch.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PatchOutcome {
    /// The resource was patched.
    Patched,
    /// The resource was already in the target version.
    AlreadyUpgraded,
}

impl PatchOutcome {
    /// What to do with a resource in the given desired version.
    /// The versions must match exactly, a resource in any other version is never patched
    /// and is reported as a version mismatch.
    pub fn plan(kind: &str, name: &str, version: &str, from: &str, to: &str) -> Result<Self, Error> {
        if version == to {
            Ok(Self::AlreadyUpgraded)
        } else if version == from {
            Ok(Self::Patched)
        } else {
            Err(Error::VersionMismatch {
                kind: kind.to_string(),
                name: name.to_string(),
                version: version.to_string(),
                from: from.to_string(),
                to: to.to_string(),
            })
        }
    }
}

/// Ensure all pods of the control plane component run the given version.
pub(crate) async fn is_operator_upgraded(
    client: &Client,
    component: &str,
    namespace: &str,
    to: &str,
) -> Result<(), Error> {
    let api: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let pods = list(&api, &selector(COMPONENT_NAME_LABEL, component)).await?;
    if pods.is_empty() {
        return Err(Error::OperatorPodMissing {
            component: component.to_string(),
        });
    }
    operator_pods_in_version(component, &pods, to)
}

/// Ensure all pods of the control plane component run the same base version as this job,
/// ie: the job image must be of the same release as the operator.
pub(crate) async fn validate_operator_release(
    client: &Client,
    component: &str,
    namespace: &str,
    current: &str,
) -> Result<(), Error> {
    let api: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let pods = list(&api, &selector(COMPONENT_NAME_LABEL, component)).await?;
    if pods.is_empty() {
        return Err(Error::OperatorPodMissing {
            component: component.to_string(),
        });
    }
    operator_pods_in_release(component, &pods, current)
}

fn operator_pods_in_release(component: &str, pods: &[Pod], current: &str) -> Result<(), Error> {
    let current = base_version(current);
    let name = component.replace('-', " ");
    for pod in pods {
        let found = pod
            .labels()
            .get(OPENEBS_VERSION_LABEL)
            .cloned()
            .unwrap_or_default();
        if base_version(&found) != current {
            return Err(Error::Precondition {
                message: format!(
                    "{name} is in {found} version, please upgrade it to {current} version \
                     or use migrate image with tag same as {name}"
                ),
            });
        }
    }
    Ok(())
}

fn operator_pods_in_version(component: &str, pods: &[Pod], to: &str) -> Result<(), Error> {
    for pod in pods {
        let found = pod
            .labels()
            .get(OPENEBS_VERSION_LABEL)
            .cloned()
            .unwrap_or_default();
        if found != to {
            return Err(Error::OperatorVersion {
                component: component.to_string(),
                pod: pod.name_any(),
                found,
                expected: to.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;

    #[test]
    fn prechecks() {
        assert!(check_version("deployment", "d", "1.12.0", "1.12.0", "2.0.0").is_ok());
        assert!(check_version("deployment", "d", "2.0.0-ee", "1.12.0", "2.0.0").is_ok());
        assert!(check_version("deployment", "d", "1.12.0-RC1", "1.12.0", "2.0.0").is_ok());
        let error = check_version("cspi", "pool-a", "1.10.0", "1.12.0", "2.0.0").unwrap_err();
        assert_eq!(
            error.to_string(),
            "cspi pool-a version 1.10.0 is neither 1.12.0 nor 2.0.0"
        );
        assert!(check_version("cspi", "pool-a", "", "1.12.0", "2.0.0").is_err());
    }

    #[test]
    fn patch_plan() {
        let plan = |version: &str| {
            PatchOutcome::plan("Deployment", "pvc-1-target", version, "1.12.0", "2.0.0")
        };
        assert_eq!(plan("2.0.0").unwrap(), PatchOutcome::AlreadyUpgraded);
        assert_eq!(plan("1.12.0").unwrap(), PatchOutcome::Patched);
        assert!(matches!(plan("1.11.0"), Err(Error::VersionMismatch { .. })));
    }

    #[test]
    fn suffixed_version_passes_prechecks_but_is_not_patched() {
        assert!(check_version("Deployment", "pvc-1-target", "1.12.0-ee", "1.12.0", "2.0.0").is_ok());
        assert!(matches!(
            PatchOutcome::plan("Deployment", "pvc-1-target", "1.12.0-ee", "1.12.0", "2.0.0"),
            Err(Error::VersionMismatch { version, .. }) if version == "1.12.0-ee"
        ));
    }

    fn pod(name: &str, version: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(
                    [(OPENEBS_VERSION_LABEL.to_string(), version.to_string())]
                        .into_iter()
                        .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn operator_versions() {
        let pods = vec![pod("cvc-operator-a", "2.0.0"), pod("cvc-operator-b", "2.0.0")];
        assert!(operator_pods_in_version("cvc-operator", &pods, "2.0.0").is_ok());
        let pods = vec![pod("cvc-operator-a", "2.0.0"), pod("cvc-operator-b", "1.12.0")];
        assert!(matches!(
            operator_pods_in_version("cvc-operator", &pods, "2.0.0"),
            Err(Error::OperatorVersion { pod, .. }) if pod == "cvc-operator-b"
        ));
    }

    #[test]
    fn operator_release() {
        let pods = vec![pod("cspc-operator-a", "2.0.0-ee")];
        assert!(operator_pods_in_release("cspc-operator", &pods, "2.0.0").is_ok());
        let pods = vec![pod("cspc-operator-a", "1.12.0")];
        let error = operator_pods_in_release("cspc-operator", &pods, "2.0.0-RC1").unwrap_err();
        assert_eq!(
            error.to_string(),
            "cspc operator is in 1.12.0 version, please upgrade it to 2.0.0 version \
             or use migrate image with tag same as cspc operator"
        );
    }
}
