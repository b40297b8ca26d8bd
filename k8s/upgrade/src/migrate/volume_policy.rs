use crate::{
    common::{client::get_opt, constants::CAS_CONFIG_ANNOTATION},
    crd::cstor::{CStorVolumePolicy, CStorVolumePolicySpec},
    error::Error,
};
use k8s_openapi::{
    api::{
        core::v1::{ResourceRequirements, Toleration},
        storage::v1::StorageClass,
    },
    apimachinery::pkg::api::resource::Quantity,
};
use kube::{api::PostParams, Api, Client, ResourceExt};
use serde::Deserialize;
use snafu::ResultExt;
use std::collections::BTreeMap;
use tracing::info;

/// Storage class parameter naming the volume policy of the provisioned volumes.
pub const VOLUME_POLICY_PARAMETER: &str = "cstorVolumePolicy";
/// Storage class parameter carrying the filesystem of the provisioned volumes.
pub const FS_TYPE_PARAMETER: &str = "fsType";

/// An entry of the cas config annotation of a legacy storage class.
#[derive(Debug, Deserialize)]
struct CasConfigEntry {
    name: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Default, Deserialize)]
struct ResourceQuantities {
    memory: Option<String>,
    cpu: Option<String>,
}

/// The volume policy and the filesystem configured by a cas config annotation.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CasConfigPolicy {
    pub spec: CStorVolumePolicySpec,
    pub fs_type: Option<String>,
}

fn yaml<T: serde::de::DeserializeOwned>(key: &str, value: &str) -> Result<T, Error> {
    serde_yaml::from_str(value).map_err(|error| Error::CasConfigValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: error.to_string(),
    })
}

fn resource_list(key: &str, value: &str) -> Result<BTreeMap<String, Quantity>, Error> {
    let quantities: ResourceQuantities = yaml(key, value)?;
    Ok([("memory", quantities.memory), ("cpu", quantities.cpu)]
        .into_iter()
        .filter_map(|(name, quantity)| {
            quantity
                .filter(|q| !q.is_empty())
                .map(|q| (name.to_string(), Quantity(q)))
        })
        .collect())
}

/// Translate the cas config annotation of the named storage class.
/// Unknown entries, eg: StoragePoolClaim or ReplicaCount, have no policy counterpart.
pub fn parse_cas_config(class: &str, config: &str) -> Result<CasConfigPolicy, Error> {
    let config = config.trim();
    let entries: Vec<CasConfigEntry> = if config.is_empty() {
        vec![]
    } else {
        serde_yaml::from_str(config).context(crate::error::CasConfigSnafu { name: class })?
    };
    let mut policy = CasConfigPolicy::default();
    let target = &mut policy.spec.target;
    for CasConfigEntry { name, value } in entries {
        match name.as_str() {
            "TargetResourceRequests" => {
                target
                    .resources
                    .get_or_insert_with(ResourceRequirements::default)
                    .requests = Some(resource_list(&name, &value)?);
            }
            "TargetResourceLimits" => {
                target
                    .resources
                    .get_or_insert_with(ResourceRequirements::default)
                    .limits = Some(resource_list(&name, &value)?);
            }
            "AuxResourceRequests" => {
                target
                    .aux_resources
                    .get_or_insert_with(ResourceRequirements::default)
                    .requests = Some(resource_list(&name, &value)?);
            }
            "AuxResourceLimits" => {
                target
                    .aux_resources
                    .get_or_insert_with(ResourceRequirements::default)
                    .limits = Some(resource_list(&name, &value)?);
            }
            "TargetNodeSelector" => target.node_selector = yaml(&name, &value)?,
            "TargetTolerations" => {
                // Keyed by an arbitrary name, which only orders the tolerations.
                let tolerations: BTreeMap<String, Toleration> = yaml(&name, &value)?;
                target.tolerations = tolerations.into_values().collect();
            }
            "Luworkers" => {
                target.lu_workers =
                    value
                        .trim()
                        .parse()
                        .map_err(|error: std::num::ParseIntError| Error::CasConfigValue {
                            key: name.clone(),
                            value: value.clone(),
                            reason: error.to_string(),
                        })?
            }
            "QueueDepth" => target.queue_depth = value,
            "ZvolWorkers" => policy.spec.replica.zvol_workers = value,
            "FSType" => policy.fs_type = Some(value),
            _ => {}
        }
    }
    Ok(policy)
}

/// Create the volume policy named after the storage class from its cas config, unless it
/// exists already, and reference it from the class parameters.
pub(crate) async fn create_policy_for_class(
    client: &Client,
    namespace: &str,
    class: &mut StorageClass,
) -> Result<(), Error> {
    let name = class.name_any();
    let api: Api<CStorVolumePolicy> = Api::namespaced(client.clone(), namespace);
    let existing = get_opt(&api, &name).await?;
    let config = class
        .annotations()
        .get(CAS_CONFIG_ANNOTATION)
        .cloned()
        .unwrap_or_default();
    let policy = parse_cas_config(&name, &config)?;

    let parameters = class.parameters.get_or_insert_with(Default::default);
    if let Some(fs_type) = policy.fs_type {
        parameters.insert(FS_TYPE_PARAMETER.to_string(), fs_type);
    }
    parameters.insert(VOLUME_POLICY_PARAMETER.to_string(), name.clone());
    if existing.is_some() {
        return Ok(());
    }
    let mut cvp = CStorVolumePolicy::new(&name, policy.spec);
    cvp.metadata.namespace = Some(namespace.to_string());
    info!(cvp = %name, "Creating volume policy from the storageclass cas config");
    api.create(&PostParams::default(), &cvp).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAS_CONFIG: &str = r#"
- name: StoragePoolClaim
  value: "sparse-claim"
- name: ReplicaCount
  value: "1"
- name: TargetResourceLimits
  value: |-
    memory: 1Gi
    cpu: 200m
- name: TargetResourceRequests
  value: |-
    memory: 500Mi
    cpu: 100m
- name: AuxResourceRequests
  value: |-
    memory: 500Mi
- name: TargetTolerations
  value: |-
    t1:
      key: "key1"
      operator: "Equal"
      value: "value1"
      effect: "NoSchedule"
    t2:
      key: "key1"
      operator: "Equal"
      value: "value1"
      effect: "NoExecute"
- name: TargetNodeSelector
  value: |-
    nodetype: storage
- name: QueueDepth
  value: "32"
- name: Luworkers
  value: "6"
- name: ZvolWorkers
  value: "1"
- name: FSType
  value: xfs
"#;

    #[test]
    fn cas_config_policy() {
        let policy = parse_cas_config("cstor-sparse", CAS_CONFIG).unwrap();
        let target = &policy.spec.target;
        let resources = target.resources.as_ref().unwrap();
        assert_eq!(resources.limits.as_ref().unwrap()["memory"], Quantity("1Gi".into()));
        assert_eq!(resources.requests.as_ref().unwrap()["cpu"], Quantity("100m".into()));
        let aux = target.aux_resources.as_ref().unwrap();
        assert_eq!(aux.limits, None);
        assert_eq!(aux.requests.as_ref().unwrap().len(), 1);

        assert_eq!(target.tolerations.len(), 2);
        assert_eq!(target.tolerations[0].effect.as_deref(), Some("NoSchedule"));
        assert_eq!(target.tolerations[1].effect.as_deref(), Some("NoExecute"));
        assert_eq!(target.node_selector["nodetype"], "storage");
        assert_eq!(target.queue_depth, "32");
        assert_eq!(target.lu_workers, 6);
        assert_eq!(policy.spec.replica.zvol_workers, "1");
        assert_eq!(policy.fs_type.as_deref(), Some("xfs"));
    }

    #[test]
    fn missing_cas_config() {
        assert_eq!(
            parse_cas_config("openebs-cstor-default", "  ").unwrap(),
            CasConfigPolicy::default()
        );
    }

    #[test]
    fn invalid_cas_config() {
        let config = "- name: Luworkers\n  value: many\n";
        assert!(matches!(
            parse_cas_config("cstor-sparse", config),
            Err(Error::CasConfigValue { .. })
        ));
        assert!(matches!(
            parse_cas_config("cstor-sparse", "name: [unterminated"),
            Err(Error::CasConfig { .. })
        ));
    }
}
