use clap::{ArgAction, Parser, Subcommand};
use std::time::Duration;
use upgrade::{common::retry::RetryPolicy, migrate::MigrationConfig, upgrade::ResourcePatch};
use utils::{
    tracing_telemetry::FmtStyle, DEFAULT_OPENEBS_NAMESPACE, DEFAULT_REQ_TIMEOUT,
    DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_INTERVAL, OPENEBS_NAMESPACE_ENV, UPGRADE_TASK_LABEL_ENV,
};

/// Migrates and upgrades OpenEBS cStor and Jiva resources.
#[derive(Parser, Debug)]
#[command(name = "upgrade", version, about)]
pub(crate) struct CliArgs {
    /// The version the resources are upgraded from.
    #[arg(global = true, long, default_value = "")]
    pub(crate) from_version: String,

    /// The version the resources are upgraded to, or the release of the migration job.
    #[arg(global = true, long, default_value = env!("CARGO_PKG_VERSION"))]
    pub(crate) to_version: String,

    /// Image tag to use for the upgraded images, defaults to the target version.
    #[arg(global = true, long, default_value = "")]
    pub(crate) to_version_image_tag: String,

    /// Registry and repository path to use for the upgraded images.
    #[arg(global = true, long, default_value = "")]
    pub(crate) to_version_image_prefix: String,

    /// Namespace of the OpenEBS control plane.
    #[arg(global = true, long, env = OPENEBS_NAMESPACE_ENV, default_value = DEFAULT_OPENEBS_NAMESPACE)]
    pub(crate) openebs_namespace: String,

    /// Formatting style of the logs, viz compact, pretty, json.
    #[arg(global = true, long, env = "FMT_STYLE", default_value = "pretty")]
    pub(crate) fmt_style: FmtStyle,

    /// Use ANSI colours in the logs.
    #[arg(global = true, long, default_value_t = true, action = ArgAction::Set)]
    pub(crate) ansi_colors: bool,

    /// Timeout of the kubernetes api requests.
    #[arg(global = true, long, default_value = DEFAULT_REQ_TIMEOUT)]
    pub(crate) request_timeout: humantime::Duration,

    /// Interval between two checks of a resource which is being reconciled.
    #[arg(global = true, long, default_value = DEFAULT_RETRY_INTERVAL)]
    pub(crate) retry_interval: humantime::Duration,

    /// Number of checks of a resource which is being reconciled, before giving up.
    #[arg(global = true, long, default_value = DEFAULT_RETRY_ATTEMPTS, value_parser = clap::value_parser!(u32).range(1 ..))]
    pub(crate) retry_attempts: u32,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Migrate legacy cStor pools and volumes to their CSI counterparts.
    #[command(subcommand)]
    Migrate(Migrate),
    /// Upgrade cStor and Jiva resources to a newer version.
    #[command(subcommand)]
    Upgrade(Upgrade),
}

#[derive(Subcommand, Debug)]
pub(crate) enum Migrate {
    /// Migrate a StoragePoolClaim into a CStorPoolCluster.
    CstorSpc {
        /// Name of the StoragePoolClaim.
        #[arg(long)]
        spc_name: String,
        /// Name of the CStorPoolCluster, defaults to the StoragePoolClaim name.
        #[arg(long)]
        cspc_name: Option<String>,
    },
    /// Migrate a legacy cStor volume to a CSI cStor volume.
    CstorVolume {
        /// Name of the persistent volume.
        #[arg(long)]
        pv_name: String,
    },
    /// Run the migration described by a MigrationTask.
    Resource {
        /// Name of the MigrationTask.
        task_name: String,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum Upgrade {
    /// Upgrade CStorPoolInstances by name.
    CstorCspi { names: Vec<String> },
    /// Upgrade CStorPoolClusters, and their pool instances, by name.
    CstorCspc { names: Vec<String> },
    /// Upgrade CStorVolumeReplicas by name.
    CstorCvr { names: Vec<String> },
    /// Upgrade CSI cStor volumes by persistent volume name.
    CstorVolume { names: Vec<String> },
    /// Upgrade Jiva volumes by persistent volume name.
    JivaVolume { names: Vec<String> },
    /// Run the upgrades described by the UpgradeTasks matching a label selector.
    Resource {
        /// Label selector of the UpgradeTasks.
        #[arg(long, env = UPGRADE_TASK_LABEL_ENV)]
        label: String,
    },
}

impl CliArgs {
    pub(crate) fn args() -> Self {
        CliArgs::parse()
    }

    fn convergence(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, Duration::from(self.retry_interval))
    }

    /// The settings of the migration jobs.
    pub(crate) fn migration_config(&self) -> MigrationConfig {
        MigrationConfig {
            namespace: self.openebs_namespace.clone(),
            current_version: self.to_version.clone(),
            task_job: false,
            rollout: RetryPolicy::rollout(),
            convergence: self.convergence(),
        }
    }

    /// The settings of the upgrade jobs.
    pub(crate) fn resource_patch(&self) -> ResourcePatch {
        ResourcePatch {
            from: self.from_version.clone(),
            to: self.to_version.clone(),
            image_tag: self.to_version_image_tag.clone(),
            image_prefix: self.to_version_image_prefix.clone(),
            namespace: self.openebs_namespace.clone(),
            rollout: RetryPolicy::rollout(),
            convergence: self.convergence(),
            task_job: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_commands() {
        let args = CliArgs::try_parse_from([
            "upgrade",
            "migrate",
            "cstor-spc",
            "--spc-name",
            "sparse-claim",
            "--cspc-name",
            "cstor-sparse",
            "--openebs-namespace",
            "storage",
        ])
        .unwrap();
        assert_eq!(args.openebs_namespace, "storage");
        assert!(matches!(
            args.command,
            Command::Migrate(Migrate::CstorSpc { ref spc_name, cspc_name: Some(ref cspc) })
                if spc_name == "sparse-claim" && cspc == "cstor-sparse"
        ));
        let config = args.migration_config();
        assert_eq!(config.current_version, env!("CARGO_PKG_VERSION"));
        assert_eq!(config.convergence, RetryPolicy::new(60, Duration::from_secs(10)));

        assert!(CliArgs::try_parse_from(["upgrade", "migrate", "cstor-volume"]).is_err());
    }

    #[test]
    fn upgrade_commands() {
        let args = CliArgs::try_parse_from([
            "upgrade",
            "upgrade",
            "cstor-volume",
            "pvc-1",
            "pvc-2",
            "--from-version",
            "2.0.0",
            "--to-version",
            "2.1.0",
            "--to-version-image-prefix",
            "quay.io/openebs/",
            "--retry-attempts",
            "3",
            "--retry-interval",
            "2s",
            "--fmt-style",
            "json",
            "--ansi-colors",
            "false",
        ])
        .unwrap();
        assert_eq!(args.fmt_style, FmtStyle::Json);
        assert!(!args.ansi_colors);
        assert!(matches!(
            &args.command,
            Command::Upgrade(Upgrade::CstorVolume { names }) if names == &["pvc-1", "pvc-2"]
        ));
        let patch = args.resource_patch();
        assert_eq!(patch.from, "2.0.0");
        assert_eq!(patch.to, "2.1.0");
        assert_eq!(patch.image_prefix, "quay.io/openebs/");
        assert_eq!(patch.convergence, RetryPolicy::new(3, Duration::from_secs(2)));

        assert!(CliArgs::try_parse_from(["upgrade", "upgrade", "cstor-cvr", "--retry-attempts", "0"])
            .is_err());
    }
}
