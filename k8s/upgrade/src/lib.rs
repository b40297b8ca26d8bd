//! Migration and upgrade jobs for OpenEBS cStor and Jiva storage resources.
//!
//! Every run converts a single resource (and its dependents) while it stays in service, and
//! records its progress in a task custom resource so that a restarted job resumes safely.

/// Helpers shared by the migration and upgrade pipelines.
pub mod common;
/// Custom resource definitions of the resources which are migrated or upgraded.
pub mod crd;
/// The error type of the migration and upgrade jobs.
pub mod error;
/// Terminal phase handling of the task custom resources.
pub mod job;
/// Progress recording into the MigrationTask and UpgradeTask custom resources.
pub mod ledger;
/// Legacy SPC/CSP pools and non-CSI volumes to CSPC/CSPI and CSI volumes.
pub mod migrate;
/// Version aware adapters of the resources which are upgraded.
pub mod resource;
/// Version upgrade drivers.
pub mod upgrade;

pub use error::Error;
