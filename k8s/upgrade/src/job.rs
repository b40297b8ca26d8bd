use crate::{
    common::{
        client::{get_opt, list},
        retry::{retry_on_conflict, RetryPolicy},
    },
    crd::task::{MigrationTask, TaskPhase, TaskSummary, UpgradeTask},
    error::Error,
    ledger::LedgerTask,
    migrate::{migrate, MigrationConfig, MigrationTarget},
    upgrade::{upgrade, ResourcePatch, UpgradeTarget},
};
use chrono::Utc;
use k8s_openapi::{
    api::{batch::v1::Job, core::v1::Pod},
    apimachinery::pkg::apis::meta::v1::Time,
};
use kube::{api::PostParams, Api, Client, ResourceExt};
use std::future::Future;
use tracing::{error, info, warn};
use utils::{DEFAULT_JOB_BACKOFF_LIMIT, POD_NAME_ENV};

/// Record a failed attempt, the task errors out once the job has no retries left.
pub fn record_failure(summary: &mut TaskSummary, backoff_limit: i32, now: Time) {
    summary.retries += 1;
    if summary.retries >= backoff_limit {
        summary.phase = Some(TaskPhase::Error);
        summary.completed_time = Some(now);
    }
}

/// Record a successful attempt.
pub fn record_success(summary: &mut TaskSummary, now: Time) {
    summary.phase = Some(TaskPhase::Success);
    summary.completed_time = Some(now);
}

/// Fail if the task already reached a terminal phase.
pub fn check_runnable<T: LedgerTask>(task: &T) -> Result<(), Error> {
    match task.summary().and_then(|s| s.phase) {
        Some(phase) if phase.is_terminal() => Err(Error::TerminalTask {
            task: task.name_any(),
            phase: phase.to_string(),
        }),
        _ => Ok(()),
    }
}

/// The backoff limit of the Job which owns the pod running this process.
/// Outside of a Job pod, the kubernetes default applies.
pub async fn backoff_limit(client: &Client, namespace: &str) -> Result<i32, Error> {
    let pod_name = std::env::var(POD_NAME_ENV).unwrap_or_default();
    if pod_name.is_empty() {
        return Ok(DEFAULT_JOB_BACKOFF_LIMIT);
    }
    let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let pod = pods.get(&pod_name).await?;
    let Some(owner) = pod
        .owner_references()
        .iter()
        .find(|owner| owner.kind == "Job")
    else {
        return Ok(DEFAULT_JOB_BACKOFF_LIMIT);
    };
    let jobs: Api<Job> = Api::namespaced(client.clone(), namespace);
    let job = jobs.get(&owner.name).await?;
    Ok(job
        .spec
        .and_then(|spec| spec.backoff_limit)
        .unwrap_or(DEFAULT_JOB_BACKOFF_LIMIT))
}

/// Run the work of the task, then record its terminal bookkeeping into the task.
/// The task is re-read after the work, as the work records its steps into it.
async fn run_task<T, F, Fut>(api: &Api<T>, task: &T, backoff_limit: i32, work: F) -> Result<(), Error>
where
    T: LedgerTask,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), Error>>,
{
    check_runnable(task)?;
    let name = task.name_any();
    let result = work().await;
    retry_on_conflict(RetryPolicy::conflict(), || async {
        let mut latest = api.get(&name).await?;
        let now = Time(Utc::now());
        match &result {
            Ok(()) => record_success(latest.summary_mut(), now),
            Err(_) => record_failure(latest.summary_mut(), backoff_limit, now),
        }
        api.replace(&name, &PostParams::default(), &latest).await?;
        Ok::<_, Error>(())
    })
    .await?;
    result
}

/// Run the migration described by the named MigrationTask.
#[tracing::instrument(skip(client, config))]
pub async fn run_migration_task(
    client: &Client,
    config: &MigrationConfig,
    name: &str,
) -> Result<(), Error> {
    let api: Api<MigrationTask> = Api::namespaced(client.clone(), &config.namespace);
    let task = get_opt(&api, name).await?.ok_or_else(|| Error::Precondition {
        message: format!("MigrationTask {name} not found in {}", config.namespace),
    })?;
    let target = MigrationTarget::from_task(&task).ok_or_else(|| Error::MissingTaskField {
        kind: "MigrationTask".to_string(),
        field: "spec".to_string(),
    })?;
    let limit = backoff_limit(client, &config.namespace).await?;
    let config = MigrationConfig {
        task_job: true,
        ..config.clone()
    };
    run_task(&api, &task, limit, || migrate(client, &config, &target)).await
}

/// Run the upgrades of all the UpgradeTasks matching the label selector.
/// Tasks in a terminal phase are skipped, the first failure is returned once all tasks ran.
#[tracing::instrument(skip(client, patch))]
pub async fn run_upgrade_tasks(
    client: &Client,
    patch: &ResourcePatch,
    label: &str,
) -> Result<(), Error> {
    let api: Api<UpgradeTask> = Api::namespaced(client.clone(), &patch.namespace);
    let tasks = list(&api, label).await?;
    if tasks.is_empty() {
        return Err(Error::Precondition {
            message: format!("No resource found for given label {label}"),
        });
    }
    let limit = backoff_limit(client, &patch.namespace).await?;
    let mut failure = None;
    for task in tasks {
        let name = task.name_any();
        if let Err(error) = check_runnable(&task) {
            info!(task = %name, %error, "Skipping task");
            continue;
        }
        let Some(target) = UpgradeTarget::from_task(&task) else {
            warn!(task = %name, "Task has no resource to upgrade");
            continue;
        };
        let patch = ResourcePatch {
            task_job: true,
            ..patch.clone()
        }
        .with_task(&task);
        if let Err(error) = run_task(&api, &task, limit, || upgrade(client, &patch, &target)).await {
            error!(task = %name, %error, "Failed to upgrade {}", target.name());
            failure.get_or_insert(error);
        }
    }
    failure.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(seconds: i64) -> Time {
        Time(Utc.timestamp_opt(seconds, 0).unwrap())
    }

    #[test]
    fn failures_count_against_the_backoff_limit() {
        let mut summary = TaskSummary {
            phase: Some(TaskPhase::Started),
            retries: 4,
            ..Default::default()
        };
        record_failure(&mut summary, 6, at(10));
        assert_eq!(summary.retries, 5);
        assert_eq!(summary.phase, Some(TaskPhase::Started));
        assert!(summary.completed_time.is_none());

        record_failure(&mut summary, 6, at(20));
        assert_eq!(summary.retries, 6);
        assert_eq!(summary.phase, Some(TaskPhase::Error));
        assert_eq!(summary.completed_time, Some(at(20)));
    }

    #[test]
    fn success_completes_the_task() {
        let mut summary = TaskSummary {
            phase: Some(TaskPhase::Started),
            retries: 2,
            ..Default::default()
        };
        record_success(&mut summary, at(30));
        assert_eq!(summary.phase, Some(TaskPhase::Success));
        assert_eq!(summary.retries, 2);
        assert_eq!(summary.completed_time, Some(at(30)));
    }

    #[test]
    fn terminal_tasks_are_not_run() {
        let mut task = MigrationTarget::Volume {
            pv: "pvc-1".to_string(),
        }
        .migration_task("openebs");
        assert!(check_runnable(&task).is_ok());

        task.summary_mut().phase = Some(TaskPhase::Started);
        assert!(check_runnable(&task).is_ok());

        task.summary_mut().phase = Some(TaskPhase::Success);
        assert!(matches!(
            check_runnable(&task),
            Err(Error::TerminalTask { phase, .. }) if phase == "Success"
        ));

        task.summary_mut().phase = Some(TaskPhase::Error);
        assert!(matches!(
            check_runnable(&task),
            Err(Error::TerminalTask { phase, .. }) if phase == "Error"
        ));
    }
}
