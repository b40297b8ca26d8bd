use super::{PatchStrategy, Versioned};
use crate::crd::{
    cstor::{
        CStorPoolCluster, CStorPoolInstance, CStorVolume, CStorVolumeConfig, CStorVolumeReplica,
        VersionDetails,
    },
    jiva::JivaVolume,
};

fn reconcile_status(details: &VersionDetails) -> Option<(String, String)> {
    Some((
        details.status.message.clone(),
        details.status.reason.clone(),
    ))
}

/// Implement `Versioned` for a kind reconciled through its `versionDetails`.
macro_rules! reconciled {
    ($kind:ty, $short:literal) => {
        impl Versioned for $kind {
            const KIND: &'static str = $short;
            const STRATEGY: PatchStrategy = PatchStrategy::Merge;
            const RECONCILED: bool = true;

            fn current_version(&self) -> String {
                self.version_details.status.current.clone()
            }
            fn desired_version(&self) -> String {
                self.version_details.desired.clone()
            }
            fn reconcile_status(&self) -> Option<(String, String)> {
                reconcile_status(&self.version_details)
            }
        }
    };
}

reconciled!(CStorPoolCluster, "cspc");
reconciled!(CStorPoolInstance, "cspi");
reconciled!(CStorVolumeConfig, "cvc");
reconciled!(CStorVolume, "cv");
reconciled!(CStorVolumeReplica, "cvr");
reconciled!(JivaVolume, "jv");
