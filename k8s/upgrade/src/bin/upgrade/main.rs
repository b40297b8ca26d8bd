mod cli;

use anyhow::Context;
use cli::{CliArgs, Command, Migrate, Upgrade};
use kube::Client;
use std::time::Duration;
use tracing::{error, info};
use upgrade::{
    job,
    migrate::{migrate, MigrationTarget},
    upgrade::{cvr::upgrade_cvr, upgrade, ResourcePatch, UpgradeTarget},
};
use utils::tracing_telemetry::TracingTelemetry;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::args();
    TracingTelemetry::builder()
        .with_style(args.fmt_style)
        .with_colours(args.ansi_colors)
        .init("upgrade");

    execute(args).await.map_err(|error| {
        error!(error = %format!("{error:#}"), "Job failed");
        error
    })
}

async fn kube_client(timeout: Duration) -> anyhow::Result<Client> {
    let mut config = kube::Config::infer()
        .await
        .context("failed to infer the kubernetes client configuration")?;
    config.connect_timeout = Some(timeout);
    config.read_timeout = Some(timeout);
    Client::try_from(config).context("failed to create the kubernetes client")
}

async fn execute(args: CliArgs) -> anyhow::Result<()> {
    let client = kube_client(args.request_timeout.into()).await?;
    match &args.command {
        Command::Migrate(command) => {
            let config = args.migration_config();
            match command {
                Migrate::CstorSpc {
                    spc_name,
                    cspc_name,
                } => {
                    let target = MigrationTarget::pool(spc_name, cspc_name.as_deref());
                    migrate(&client, &config, &target).await?;
                }
                Migrate::CstorVolume { pv_name } => {
                    let target = MigrationTarget::Volume {
                        pv: pv_name.clone(),
                    };
                    migrate(&client, &config, &target).await?;
                }
                Migrate::Resource { task_name } => {
                    job::run_migration_task(&client, &config, task_name).await?;
                }
            }
        }
        Command::Upgrade(command) => {
            let patch = args.resource_patch();
            match command {
                Upgrade::CstorCspi { names } => {
                    upgrade_all(
                        &client,
                        &patch,
                        names,
                        "cspi",
                        "CStorPoolInstance",
                        UpgradeTarget::PoolInstance,
                    )
                    .await?
                }
                Upgrade::CstorCspc { names } => {
                    upgrade_all(
                        &client,
                        &patch,
                        names,
                        "cspc",
                        "CStorPoolCluster",
                        UpgradeTarget::PoolCluster,
                    )
                    .await?
                }
                Upgrade::CstorVolume { names } => {
                    upgrade_all(
                        &client,
                        &patch,
                        names,
                        "volume",
                        "CStorVolume",
                        UpgradeTarget::CstorVolume,
                    )
                    .await?
                }
                Upgrade::JivaVolume { names } => {
                    upgrade_all(
                        &client,
                        &patch,
                        names,
                        "volume",
                        "JivaVolume",
                        UpgradeTarget::JivaVolume,
                    )
                    .await?
                }
                Upgrade::CstorCvr { names } => {
                    anyhow::ensure!(!names.is_empty(), "failed to upgrade: no cvr name provided");
                    patch.validate()?;
                    for name in names {
                        upgrade_cvr(&client, &patch, name)
                            .await
                            .with_context(|| {
                                format!("Failed to upgrade CStorVolumeReplica {name}")
                            })?;
                    }
                }
                Upgrade::Resource { label } => {
                    job::run_upgrade_tasks(&client, &patch, label).await?;
                }
            }
        }
    }
    Ok(())
}

/// Upgrade the named resources one after the other, stopping at the first failure.
async fn upgrade_all(
    client: &Client,
    patch: &ResourcePatch,
    names: &[String],
    what: &str,
    kind: &str,
    target: impl Fn(String) -> UpgradeTarget,
) -> anyhow::Result<()> {
    anyhow::ensure!(!names.is_empty(), "failed to upgrade: no {what} name provided");
    for name in names {
        upgrade(client, patch, &target(name.clone()))
            .await
            .with_context(|| format!("Failed to upgrade {kind} {name}"))?;
        info!(kind, name = %name, "Upgrade completed");
    }
    Ok(())
}
