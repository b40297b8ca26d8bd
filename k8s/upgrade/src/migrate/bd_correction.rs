use crate::{
    common::{
        client::{controller_ref, create_if_missing, exec, get_one, get_opt, list, merge_patch, selector},
        constants::{
            CSP_DEPLOY_LABEL, HOSTNAME_LABEL, POOL_CONTAINER, RECONCILE_DISABLE_ANNOTATION,
            SPC_FINALIZER, SPC_LABEL, UUID_SCHEME_ANNOTATION,
        },
        patch::diff,
        retry::{poll, retry_on_conflict, RetryPolicy},
    },
    crd::{
        cstor::CStorPoolCluster,
        legacy::{CStorPool, StoragePoolClaim},
        ndm::{
            BlockDevice, BlockDeviceClaim, BlockDeviceClaimSpec, BlockDeviceNodeAttributes,
            DeviceClaimResources,
        },
    },
    error::Error,
};
use k8s_openapi::{
    api::core::v1::{Node, Pod},
    apimachinery::pkg::api::resource::Quantity,
};
use kube::{
    api::{ObjectMeta, PostParams},
    Api, Client, ResourceExt,
};
use std::collections::BTreeMap;
use tracing::info;
use utils::bytes::into_quantity;

/// Device type of the pool claims backed by sparse files, whose devices never change.
const SPARSE_TYPE: &str = "sparse";

/// Block devices of the legacy pools which were renamed, by their old name.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BlockDeviceCorrections(BTreeMap<String, String>);

impl BlockDeviceCorrections {
    /// Record that the old block device is now known as the new one.
    pub fn record(&mut self, old: &str, new: &str) {
        self.0.insert(old.to_string(), new.to_string());
    }
    /// The corrected name of the block device, if it was renamed.
    pub fn get(&self, old: &str) -> Option<&str> {
        self.0.get(old).map(String::as_str)
    }
    /// Whether no block device was renamed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    /// Rename the block devices of the list.
    pub fn apply_to_list(&self, names: &mut [String]) {
        for name in names.iter_mut() {
            if let Some(new) = self.get(name) {
                *name = new.to_string();
            }
        }
    }
    /// Rename the block devices of the pool, their device ids no longer apply.
    pub fn apply_to_csp(&self, csp: &mut CStorPool) {
        for bd in csp.spec.group.iter_mut().flat_map(|g| g.item.iter_mut()) {
            if let Some(new) = self.get(&bd.name) {
                bd.name = new.to_string();
                bd.device_id = String::new();
            }
        }
    }
}

/// The device paths of the pool, as printed by `zpool status -P`, one per line.
pub fn parse_devlinks(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Pair the device paths of the pool with its block devices, in pool order.
pub fn pair_devlinks(csp: &CStorPool, devlinks: Vec<String>) -> Result<Vec<(String, String)>, Error> {
    let names = csp
        .spec
        .group
        .iter()
        .flat_map(|g| g.item.iter().map(|bd| bd.name.clone()))
        .collect::<Vec<_>>();
    if names.len() != devlinks.len() {
        return Err(Error::Precondition {
            message: format!(
                "csp {} has {} block devices but its pool has {} devlinks",
                csp.name_any(),
                names.len(),
                devlinks.len()
            ),
        });
    }
    Ok(devlinks.into_iter().zip(names).collect())
}

/// The active block device known by the devlink.
pub fn find_block_device<'b>(devlink: &str, devices: &'b [BlockDevice]) -> Option<&'b BlockDevice> {
    devices
        .iter()
        .find(|bd| bd.is_active() && bd.matches_devlink(devlink))
}

/// Corrects the block devices of the pools of a StoragePoolClaim, whose names changed since the
/// pools were created, eg: after the node disk manager was upgraded.
pub(crate) struct BlockDeviceCorrector<'a> {
    pub(crate) client: &'a Client,
    pub(crate) namespace: &'a str,
    pub(crate) spc_name: &'a str,
    pub(crate) cspc_name: &'a str,
    pub(crate) policy: RetryPolicy,
}

impl<'a> BlockDeviceCorrector<'a> {
    /// Correct the block devices of all the pools of the claim.
    /// Nothing is done once the CStorPoolCluster exists, or for sparse pools.
    pub(crate) async fn correct(&self) -> Result<(), Error> {
        let cspc_api: Api<CStorPoolCluster> = Api::namespaced(self.client.clone(), self.namespace);
        if get_opt(&cspc_api, self.cspc_name).await?.is_some() {
            return Ok(());
        }
        let spc_api: Api<StoragePoolClaim> = Api::all(self.client.clone());
        let spc = retry_on_conflict(RetryPolicy::conflict(), || async {
            let mut spc = spc_api.get(self.spc_name).await?;
            if spc.spec.type_ == SPARSE_TYPE
                || spc.annotations().get(RECONCILE_DISABLE_ANNOTATION).map(String::as_str)
                    == Some("true")
            {
                return Ok::<_, Error>(spc);
            }
            spc.annotations_mut()
                .insert(RECONCILE_DISABLE_ANNOTATION.to_string(), "true".to_string());
            Ok::<_, Error>(spc_api
                .replace(self.spc_name, &PostParams::default(), &spc)
                .await?)
        })
        .await?;
        if spc.spec.type_ == SPARSE_TYPE {
            return Ok(());
        }

        let csp_api: Api<CStorPool> = Api::all(self.client.clone());
        let mut corrections = BlockDeviceCorrections::default();
        for csp in list(&csp_api, &selector(SPC_LABEL, self.spc_name)).await? {
            self.correct_csp(&spc, &csp, &mut corrections).await?;
        }

        retry_on_conflict(RetryPolicy::conflict(), || async {
            let mut spc = spc_api.get(self.spc_name).await?;
            if let Some(list) = spc.spec.block_devices.block_device_list.as_mut() {
                corrections.apply_to_list(list);
            }
            spc.annotations_mut().remove(RECONCILE_DISABLE_ANNOTATION);
            spc_api
                .replace(self.spc_name, &PostParams::default(), &spc)
                .await?;
            Ok::<_, Error>(())
        })
        .await
    }

    async fn devlinks(&self, pod: &str) -> Result<Vec<String>, Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), self.namespace);
        let output = exec(
            &api,
            pod,
            POOL_CONTAINER,
            vec![
                "bash".to_string(),
                "-c".to_string(),
                r"zpool status -P | grep \/dev | awk '{print $1}'".to_string(),
            ],
        )
        .await?;
        let devlinks = parse_devlinks(&output);
        if devlinks.is_empty() {
            return Err(Error::Precondition {
                message: format!("no devlinks found for pool pod {pod}"),
            });
        }
        Ok(devlinks)
    }

    async fn correct_csp(
        &self,
        spc: &StoragePoolClaim,
        csp: &CStorPool,
        corrections: &mut BlockDeviceCorrections,
    ) -> Result<(), Error> {
        let csp_name = csp.name_any();
        let pod_api: Api<Pod> = Api::namespaced(self.client.clone(), self.namespace);
        let pod = get_one(&pod_api, &selector(CSP_DEPLOY_LABEL, &csp_name)).await?;
        let devlinks = self.devlinks(&pod.name_any()).await?;
        let pairs = pair_devlinks(csp, devlinks)?;

        let hostname = pod
            .spec
            .as_ref()
            .and_then(|s| s.node_selector.as_ref())
            .and_then(|n| n.get(HOSTNAME_LABEL))
            .cloned()
            .unwrap_or_default();
        let node_api: Api<Node> = Api::all(self.client.clone());
        let nodes = list(&node_api, &selector(HOSTNAME_LABEL, &hostname)).await?;
        if nodes.len() != 1 {
            return Err(Error::ObjectCount {
                kind: "Node".to_string(),
                selector: selector(HOSTNAME_LABEL, &hostname),
                count: nodes.len(),
            });
        }
        let bd_api: Api<BlockDevice> = Api::namespaced(self.client.clone(), self.namespace);
        let devices = list(&bd_api, &selector(HOSTNAME_LABEL, &hostname)).await?;

        let mut renamed = BlockDeviceCorrections::default();
        for (devlink, old) in pairs {
            let new = find_block_device(&devlink, &devices)
                .map(|bd| bd.name_any())
                .ok_or_else(|| Error::Precondition {
                    message: format!("blockdevice not found for devlink {devlink}"),
                })?;
            if new != old {
                self.update_claims(spc, &old, &new).await?;
                renamed.record(&old, &new);
                corrections.record(&old, &new);
            }
        }
        if renamed.is_empty() {
            return Ok(());
        }

        info!(csp = %csp_name, ?renamed, "Correcting the block devices of the csp");
        let mut corrected = csp.clone();
        renamed.apply_to_csp(&mut corrected);
        let csp_api: Api<CStorPool> = Api::all(self.client.clone());
        let payload = diff(csp, &corrected)?.with_resource_version(csp.resource_version());
        merge_patch(&csp_api, &csp_name, payload).await?;
        Ok(())
    }

    /// Move the claim of the old block device to the new one, creating it if the new block
    /// device is not claimed yet.
    async fn update_claims(&self, spc: &StoragePoolClaim, old: &str, new: &str) -> Result<(), Error> {
        let bd_api: Api<BlockDevice> = Api::namespaced(self.client.clone(), self.namespace);
        let bdc_api: Api<BlockDeviceClaim> = Api::namespaced(self.client.clone(), self.namespace);
        let spc_name = spc.name_any();
        let old_bd = bd_api.get(old).await?;
        let mut new_bd = bd_api.get(new).await?;

        match new_bd.spec.claim_ref.as_ref().and_then(|c| c.name.clone()) {
            Some(claim) => {
                let mut bdc = bdc_api.get(&claim).await?;
                if bdc.labels().get(SPC_LABEL) != Some(&spc_name) {
                    bdc.metadata.owner_references = Some(vec![controller_ref(spc)?]);
                    bdc.labels_mut().insert(SPC_LABEL.to_string(), spc_name.clone());
                    bdc_api.replace(&claim, &PostParams::default(), &bdc).await?;
                }
            }
            None => {
                new_bd.annotations_mut().remove(UUID_SCHEME_ANNOTATION);
                let new_bd = bd_api.replace(new, &PostParams::default(), &new_bd).await?;
                let bdc = self.claim_for(spc, &new_bd)?;
                let bdc_name = bdc.name_any();
                info!(bdc = %bdc_name, bd = new, "Claiming the corrected block device");
                create_if_missing(&bdc_api, &bdc).await?;
                poll(self.policy, &format!("bdc {bdc_name} to get bound"), || {
                    claim_bound(&bdc_api, &bdc_name)
                })
                .await?;
            }
        }

        if old_bd.is_active() {
            if let Some(claim) = old_bd.spec.claim_ref.as_ref().and_then(|c| c.name.clone()) {
                let mut bdc = bdc_api.get(&claim).await?;
                if bdc.labels().get(SPC_LABEL) == Some(&spc_name) {
                    bdc.metadata.owner_references = Some(vec![]);
                    bdc.labels_mut().remove(SPC_LABEL);
                    bdc_api.replace(&claim, &PostParams::default(), &bdc).await?;
                }
            }
        }
        Ok(())
    }

    fn claim_for(&self, spc: &StoragePoolClaim, bd: &BlockDevice) -> Result<BlockDeviceClaim, Error> {
        let uid = bd.uid().unwrap_or_default();
        let mut bdc = BlockDeviceClaim::new(
            &format!("bdc-cstor-{uid}"),
            BlockDeviceClaimSpec {
                resources: DeviceClaimResources {
                    requests: [(
                        "storage".to_string(),
                        Quantity(into_quantity(bd.spec.capacity.storage)),
                    )]
                    .into_iter()
                    .collect(),
                },
                block_device_name: bd.name_any(),
                block_device_node_attributes: BlockDeviceNodeAttributes {
                    host_name: bd.labels().get(HOSTNAME_LABEL).cloned().unwrap_or_default(),
                    ..Default::default()
                },
            },
        );
        bdc.metadata = ObjectMeta {
            name: bdc.metadata.name.take(),
            namespace: Some(self.namespace.to_string()),
            labels: Some(
                [(SPC_LABEL.to_string(), spc.name_any())]
                    .into_iter()
                    .collect(),
            ),
            owner_references: Some(vec![controller_ref(spc)?]),
            finalizers: Some(vec![SPC_FINALIZER.to_string()]),
            ..Default::default()
        };
        Ok(bdc)
    }
}

async fn claim_bound(api: &Api<BlockDeviceClaim>, name: &str) -> Result<Option<()>, Error> {
    let bdc = api.get(name).await?;
    if bdc.is_bound() {
        return Ok(Some(()));
    }
    info!(bdc = name, "Waiting for bdc to get bound");
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{
        legacy::{BlockDeviceGroup, CStorPoolSpec, CspBlockDevice},
        ndm::{BlockDeviceSpec, BlockDeviceStatus, BLOCK_DEVICE_ACTIVE},
    };

    fn csp(groups: &[&[&str]]) -> CStorPool {
        CStorPool::new(
            "cstor-disk-abcd",
            CStorPoolSpec {
                group: groups
                    .iter()
                    .map(|names| BlockDeviceGroup {
                        item: names
                            .iter()
                            .map(|name| CspBlockDevice {
                                name: name.to_string(),
                                device_id: format!("/dev/disk/by-id/{name}"),
                                in_use_by_pool: true,
                            })
                            .collect(),
                    })
                    .collect(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn devlinks() {
        let output = "/dev/disk/by-id/scsi-0Google_PD_disk-1-part1\n/dev/sdc1\n\n";
        let devlinks = parse_devlinks(output);
        assert_eq!(devlinks.len(), 2);

        let pool = csp(&[&["bd-1", "bd-2"]]);
        let pairs = pair_devlinks(&pool, devlinks.clone()).unwrap();
        assert_eq!(pairs[1], ("/dev/sdc1".to_string(), "bd-2".to_string()));
        assert!(pair_devlinks(&csp(&[&["bd-1"]]), devlinks).is_err());
    }

    #[test]
    fn inactive_devices_are_skipped() {
        let device = |name: &str, state: &str| {
            let mut bd = BlockDevice::new(
                name,
                BlockDeviceSpec {
                    path: "/dev/sdc".to_string(),
                    ..Default::default()
                },
            );
            bd.status = Some(BlockDeviceStatus {
                state: state.to_string(),
                ..Default::default()
            });
            bd
        };
        let devices = vec![device("bd-old", "Inactive"), device("bd-new", BLOCK_DEVICE_ACTIVE)];
        assert_eq!(
            find_block_device("/dev/sdc1", &devices).map(|bd| bd.name_any()),
            Some("bd-new".to_string())
        );
        assert!(find_block_device("/dev/sdd1", &devices).is_none());
    }

    #[test]
    fn corrections() {
        let mut corrections = BlockDeviceCorrections::default();
        corrections.record("bd-2", "bd-5");

        let mut pool = csp(&[&["bd-1", "bd-2"]]);
        corrections.apply_to_csp(&mut pool);
        let item = &pool.spec.group[0].item;
        assert_eq!(item[0].device_id, "/dev/disk/by-id/bd-1");
        assert_eq!(item[1].name, "bd-5");
        assert!(item[1].device_id.is_empty());

        let mut list = vec!["bd-1".to_string(), "bd-2".to_string()];
        corrections.apply_to_list(&mut list);
        assert_eq!(list, vec!["bd-1", "bd-5"]);
    }
}
