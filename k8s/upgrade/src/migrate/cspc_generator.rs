use crate::{
    common::{
        client::{get_opt, list, selector},
        constants::{
            CSPC_LABEL, CSP_DEPLOY_LABEL, HOSTNAME_LABEL, MIGRATED_FROM_ANNOTATION,
            POOL_CONTAINER, RECONCILE_DISABLE_DEPENDANTS_ANNOTATION, SPC_LABEL,
        },
        retry::{poll, retry_on_conflict, RetryPolicy},
    },
    crd::{
        cstor::{CStorPoolCluster, CStorPoolInstance, PoolBlockDevice, PoolConfig, PoolSpec, RaidGroup},
        legacy::{BlockDeviceGroup, CStorPool},
    },
    error::Error,
};
use k8s_openapi::api::{apps::v1::Deployment, core::v1::ResourceRequirements};
use kube::{
    api::{ObjectMeta, PostParams},
    Api, Client, ResourceExt,
};
use tracing::info;

/// Container of the legacy pool pod which runs the pool manager.
const POOL_MGMT_CONTAINER: &str = "cstor-pool-mgmt";

/// The raid group type of a CSPC pool for the pool type of a legacy pool.
pub fn raid_group_type(pool_type: &str) -> &'static str {
    match pool_type {
        "striped" => "stripe",
        "mirrored" => "mirror",
        "raidz" => "raidz",
        "raidz2" => "raidz2",
        _ => "",
    }
}

fn block_devices(group: &BlockDeviceGroup) -> Vec<PoolBlockDevice> {
    group
        .item
        .iter()
        .map(|bd| PoolBlockDevice::named(&bd.name))
        .collect()
}

/// The data raid groups of the legacy pool.
/// Striped pools have all their block devices in a single raid group, whatever their groups.
pub fn data_raid_groups(csp: &CStorPool) -> Vec<RaidGroup> {
    if csp.spec.pool_spec.pool_type == "striped" {
        let block_devices = csp.spec.group.iter().flat_map(block_devices).collect::<Vec<_>>();
        if block_devices.is_empty() {
            return vec![];
        }
        return vec![RaidGroup { block_devices }];
    }
    csp.spec
        .group
        .iter()
        .map(|group| RaidGroup {
            block_devices: block_devices(group),
        })
        .collect()
}

fn container_resources(deploy: &Deployment, container: &str) -> Option<ResourceRequirements> {
    deploy
        .spec
        .as_ref()?
        .template
        .spec
        .as_ref()?
        .containers
        .iter()
        .find(|c| c.name == container)
        .and_then(|c| c.resources.clone())
}

/// The CSPC pool equivalent to the legacy pool run by the given deployment.
pub fn pool_spec(csp: &CStorPool, deploy: &Deployment) -> PoolSpec {
    let pod_spec = deploy.spec.as_ref().and_then(|s| s.template.spec.as_ref());
    let hostname = csp.labels().get(HOSTNAME_LABEL).cloned().unwrap_or_default();
    PoolSpec {
        node_selector: [(HOSTNAME_LABEL.to_string(), hostname)].into_iter().collect(),
        data_raid_groups: data_raid_groups(csp),
        write_cache_raid_groups: vec![],
        pool_config: PoolConfig {
            data_raid_group_type: raid_group_type(&csp.spec.pool_spec.pool_type).to_string(),
            thick_provision: csp.spec.pool_spec.thick_provisioning,
            resources: container_resources(deploy, POOL_CONTAINER),
            aux_resources: container_resources(deploy, POOL_MGMT_CONTAINER),
            tolerations: pod_spec
                .and_then(|s| s.tolerations.clone())
                .unwrap_or_default(),
            priority_class_name: Some(
                pod_spec
                    .and_then(|s| s.priority_class_name.clone())
                    .unwrap_or_default(),
            ),
            ro_threshold_limit: Some(csp.spec.pool_spec.ro_threshold_limit),
            ..Default::default()
        },
    }
}

/// A CSPC with one pool per legacy pool, whose dependants are not reconciled until the
/// pool instances are created.
pub fn cspc_for_spc(
    cspc_name: &str,
    namespace: &str,
    spc_name: &str,
    pools: &[(CStorPool, Deployment)],
) -> CStorPoolCluster {
    let mut cspc = CStorPoolCluster {
        types: Some(CStorPoolCluster::type_meta()),
        metadata: ObjectMeta {
            name: Some(cspc_name.to_string()),
            namespace: Some(namespace.to_string()),
            annotations: Some(
                [
                    (
                        RECONCILE_DISABLE_DEPENDANTS_ANNOTATION.to_string(),
                        "true".to_string(),
                    ),
                    (MIGRATED_FROM_ANNOTATION.to_string(), spc_name.to_string()),
                ]
                .into_iter()
                .collect(),
            ),
            ..Default::default()
        },
        ..Default::default()
    };
    cspc.spec.pools = pools
        .iter()
        .map(|(csp, deploy)| pool_spec(csp, deploy))
        .collect();
    cspc
}

/// Builds the CStorPoolCluster of a StoragePoolClaim.
pub(crate) struct CspcGenerator<'a> {
    pub(crate) client: &'a Client,
    pub(crate) namespace: &'a str,
    pub(crate) spc_name: &'a str,
    pub(crate) cspc_name: &'a str,
    pub(crate) policy: RetryPolicy,
}

impl<'a> CspcGenerator<'a> {
    async fn cspc_spec(&self) -> Result<CStorPoolCluster, Error> {
        let csp_api: Api<CStorPool> = Api::all(self.client.clone());
        let deploy_api: Api<Deployment> = Api::namespaced(self.client.clone(), self.namespace);
        let csps = list(&csp_api, &selector(SPC_LABEL, self.spc_name)).await?;
        let mut pools = Vec::with_capacity(csps.len());
        for csp in csps {
            let deploys = list(&deploy_api, &selector(CSP_DEPLOY_LABEL, &csp.name_any())).await?;
            let [deploy] = <[Deployment; 1]>::try_from(deploys).map_err(|deploys| {
                Error::Precondition {
                    message: format!(
                        "invalid number of deployments found for csp {}: {}",
                        csp.name_any(),
                        deploys.len()
                    ),
                }
            })?;
            pools.push((csp, deploy));
        }
        Ok(cspc_for_spc(
            self.cspc_name,
            self.namespace,
            self.spc_name,
            &pools,
        ))
    }

    /// Get the CSPC or create it, wait for all its pool instances, then let the pool
    /// instances be reconciled.
    pub(crate) async fn generate(&self) -> Result<CStorPoolCluster, Error> {
        let api: Api<CStorPoolCluster> = Api::namespaced(self.client.clone(), self.namespace);
        let cspc = match get_opt(&api, self.cspc_name).await? {
            Some(cspc) => cspc,
            None => {
                let cspc = self.cspc_spec().await?;
                info!(cspc = self.cspc_name, spc = self.spc_name, "Creating cspc");
                api.create(&PostParams::default(), &cspc).await?
            }
        };
        if !cspc
            .annotations()
            .contains_key(RECONCILE_DISABLE_DEPENDANTS_ANNOTATION)
        {
            return Ok(cspc);
        }

        let cspi_api: Api<CStorPoolInstance> = Api::namespaced(self.client.clone(), self.namespace);
        let expected = cspc.spec.pools.len();
        poll(
            self.policy,
            &format!("{expected} cspi for cspc {}", self.cspc_name),
            || cspi_count_reached(&cspi_api, self.cspc_name, expected),
        )
        .await?;

        retry_on_conflict(RetryPolicy::conflict(), || async {
            let mut cspc = api.get(self.cspc_name).await?;
            cspc.annotations_mut()
                .remove(RECONCILE_DISABLE_DEPENDANTS_ANNOTATION);
            Ok::<_, Error>(api
                .replace(self.cspc_name, &PostParams::default(), &cspc)
                .await?)
        })
        .await
    }
}

async fn cspi_count_reached(
    api: &Api<CStorPoolInstance>,
    cspc: &str,
    expected: usize,
) -> Result<Option<()>, Error> {
    let count = list(api, &selector(CSPC_LABEL, cspc)).await?.len();
    if count == expected {
        return Ok(Some(()));
    }
    info!(cspc, expected, count, "Waiting for the pool instances to be created");
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::legacy::{CStorPoolAttr, CStorPoolSpec, CspBlockDevice};
    use k8s_openapi::api::{
        apps::v1::DeploymentSpec,
        core::v1::{Container, PodSpec, PodTemplateSpec, Toleration},
    };

    fn csp(pool_type: &str, groups: &[&[&str]]) -> CStorPool {
        let mut csp = CStorPool::new(
            "sparse-claim-abcd",
            CStorPoolSpec {
                group: groups
                    .iter()
                    .map(|names| BlockDeviceGroup {
                        item: names
                            .iter()
                            .map(|name| CspBlockDevice {
                                name: name.to_string(),
                                ..Default::default()
                            })
                            .collect(),
                    })
                    .collect(),
                pool_spec: CStorPoolAttr {
                    pool_type: pool_type.to_string(),
                    ro_threshold_limit: 85,
                    ..Default::default()
                },
            },
        );
        csp.labels_mut()
            .insert(HOSTNAME_LABEL.to_string(), "node-1".to_string());
        csp
    }

    fn names(groups: &[RaidGroup]) -> Vec<Vec<&str>> {
        groups
            .iter()
            .map(|g| {
                g.block_devices
                    .iter()
                    .map(|bd| bd.block_device_name.as_str())
                    .collect()
            })
            .collect()
    }

    #[test]
    fn striped_raid_groups() {
        let spread = csp("striped", &[&["sparse-1"], &["sparse-2"], &["sparse-3"]]);
        assert_eq!(
            names(&data_raid_groups(&spread)),
            vec![vec!["sparse-1", "sparse-2", "sparse-3"]]
        );
        let single = csp("striped", &[&["sparse-1", "sparse-2", "sparse-3"]]);
        assert_eq!(
            names(&data_raid_groups(&single)),
            vec![vec!["sparse-1", "sparse-2", "sparse-3"]]
        );
    }

    #[test]
    fn mirrored_raid_groups() {
        let mirrored = csp("mirrored", &[&["bd-1", "bd-2"], &["bd-3", "bd-4"]]);
        assert_eq!(
            names(&data_raid_groups(&mirrored)),
            vec![vec!["bd-1", "bd-2"], vec!["bd-3", "bd-4"]]
        );
        assert_eq!(raid_group_type("mirrored"), "mirror");
        assert_eq!(raid_group_type("raidz2"), "raidz2");
    }

    #[test]
    fn pool_from_deployment() {
        let container = |name: &str| Container {
            name: name.to_string(),
            resources: Some(ResourceRequirements {
                limits: Some(
                    [(
                        "memory".to_string(),
                        k8s_openapi::apimachinery::pkg::api::resource::Quantity(
                            format!("{}Mi", name.len()),
                        ),
                    )]
                    .into_iter()
                    .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        };
        let deploy = Deployment {
            spec: Some(DeploymentSpec {
                template: PodTemplateSpec {
                    spec: Some(PodSpec {
                        containers: vec![container(POOL_CONTAINER), container(POOL_MGMT_CONTAINER)],
                        tolerations: Some(vec![Toleration {
                            key: Some("storage".to_string()),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        };
        let cspc = cspc_for_spc(
            "cstor-disk",
            "openebs",
            "sparse-claim",
            &[(csp("striped", &[&["sparse-1"]]), deploy)],
        );
        assert_eq!(
            cspc.annotations().get(MIGRATED_FROM_ANNOTATION).map(String::as_str),
            Some("sparse-claim")
        );
        let pool = &cspc.spec.pools[0];
        assert_eq!(pool.node_selector[HOSTNAME_LABEL], "node-1");
        assert_eq!(pool.pool_config.data_raid_group_type, "stripe");
        assert_eq!(pool.pool_config.ro_threshold_limit, Some(85));
        assert_eq!(pool.pool_config.tolerations.len(), 1);
        let memory = |r: &Option<ResourceRequirements>| {
            r.as_ref().unwrap().limits.as_ref().unwrap()["memory"].0.clone()
        };
        assert_eq!(memory(&pool.pool_config.resources), "10Mi");
        assert_eq!(memory(&pool.pool_config.aux_resources), "15Mi");
    }
}
