use super::ResourcePatch;
use crate::{
    common::constants::{CSPI_NAME_LABEL, OPENEBS_VERSION_LABEL},
    crd::cstor::{CStorPoolInstance, CStorVolumeReplica},
    error::Error,
    resource::{Patchable, VersionedResource},
};
use kube::{Api, Client, ResourceExt};
use tracing::info;

/// Upgrade a volume replica, once the pool instance hosting it runs the target version.
#[tracing::instrument(skip(client, patch))]
pub async fn upgrade_cvr(client: &Client, patch: &ResourcePatch, name: &str) -> Result<(), Error> {
    let api: Api<CStorVolumeReplica> = Api::namespaced(client.clone(), &patch.namespace);
    let mut cvr = VersionedResource::get(api, name).await?;
    cvr.transform(|cvr| {
        patch.label_version(cvr);
        cvr.version_details.desired = patch.to.clone();
        Ok(())
    })?;

    let cspi_api: Api<CStorPoolInstance> = Api::namespaced(client.clone(), &patch.namespace);
    verify_cspi_version(&cspi_api, cvr.object(), &patch.to).await?;
    cvr.pre_checks(&patch.from, &patch.to)?;
    cvr.patch(&patch.from, &patch.to).await?;
    cvr.verify(&patch.to, patch.convergence).await?;
    info!(cvr = name, "Volume replica upgraded");
    Ok(())
}

async fn verify_cspi_version(
    api: &Api<CStorPoolInstance>,
    cvr: &CStorVolumeReplica,
    to: &str,
) -> Result<(), Error> {
    let cspi_name = cvr
        .labels()
        .get(CSPI_NAME_LABEL)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| Error::Precondition {
            message: format!("missing cspi label for cvr {}", cvr.name_any()),
        })?;
    let cspi = api.get(cspi_name).await?;
    match cspi.labels().get(OPENEBS_VERSION_LABEL) {
        Some(version) if version == to => Ok(()),
        _ => Err(Error::Precondition {
            message: format!("cspi {cspi_name} not in {to} version"),
        }),
    }
}
