use crate::{
    crd::task::{
        MigrationTask, StepPhase, StepStatus, TaskPhase, TaskSummary, UpgradeTask,
    },
    error::Error,
};
use chrono::Utc;
use k8s_openapi::{apimachinery::pkg::apis::meta::v1::Time, NamespaceResourceScope};
use kube::{
    api::{Api, PostParams},
    Client, Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use std::{fmt::Debug, future::Future};
use tracing::{info, warn};

/// A task custom resource which records the progress of a migration or an upgrade.
pub trait LedgerTask:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
{
    /// The overall progress of the task.
    fn summary(&self) -> Option<&TaskSummary>;
    /// The overall progress of the task, created if missing.
    fn summary_mut(&mut self) -> &mut TaskSummary;
    /// The per step progress of the task, created if missing.
    fn steps_mut(&mut self) -> &mut Vec<StepStatus>;
}

impl LedgerTask for MigrationTask {
    fn summary(&self) -> Option<&TaskSummary> {
        self.status.as_ref().map(|s| &s.summary)
    }
    fn summary_mut(&mut self) -> &mut TaskSummary {
        &mut self.status.get_or_insert_with(Default::default).summary
    }
    fn steps_mut(&mut self) -> &mut Vec<StepStatus> {
        &mut self
            .status
            .get_or_insert_with(Default::default)
            .migration_detailed_statuses
    }
}

impl LedgerTask for UpgradeTask {
    fn summary(&self) -> Option<&TaskSummary> {
        self.status.as_ref().map(|s| &s.summary)
    }
    fn summary_mut(&mut self) -> &mut TaskSummary {
        &mut self.status.get_or_insert_with(Default::default).summary
    }
    fn steps_mut(&mut self) -> &mut Vec<StepStatus> {
        &mut self
            .status
            .get_or_insert_with(Default::default)
            .upgrade_detailed_statuses
    }
}

/// Check that a step status carries everything its phase requires.
pub fn validate_step(status: &StepStatus) -> Result<(), Error> {
    let valid = !status.step.is_empty()
        && match status.phase {
            None => false,
            Some(StepPhase::Waiting) => true,
            Some(StepPhase::Completed) => !status.message.is_empty(),
            Some(StepPhase::Errored) => !status.message.is_empty() && !status.reason.is_empty(),
        };
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidStatus {
            status: format!("{status:?}"),
        })
    }
}

/// Record the step status into the list of steps.
/// A waiting step starts a new entry, any other phase overwrites the last entry keeping its
/// start time.
pub fn apply_step(steps: &mut Vec<StepStatus>, mut status: StepStatus, now: Time) -> Result<(), Error> {
    validate_step(&status)?;
    status.last_updated_time = Some(now.clone());
    if status.phase != Some(StepPhase::Waiting) {
        if let Some(last) = steps.last_mut() {
            status.start_time = last.start_time.clone();
            *last = status;
            return Ok(());
        }
    }
    status.start_time = Some(now);
    steps.push(status);
    Ok(())
}

/// Records the progress of a run into its task custom resource.
/// Unless the run is a task job, failures to persist the progress are logged and ignored.
pub struct Ledger<T: LedgerTask> {
    api: Api<T>,
    task: Option<T>,
    strict: bool,
}

impl<T: LedgerTask> Ledger<T> {
    /// Get the task, or create it from the template, and restart its step list.
    pub async fn get_or_create(
        client: &Client,
        namespace: &str,
        template: T,
        strict: bool,
    ) -> Result<Self, Error> {
        let api: Api<T> = Api::namespaced(client.clone(), namespace);
        let mut ledger = Self {
            api,
            task: None,
            strict,
        };
        match ledger.load(namespace, template).await {
            Ok(task) => ledger.task = Some(task),
            Err(error) if !strict => {
                warn!(%error, "Failed to get or create the task, progress is not recorded")
            }
            Err(error) => return Err(error),
        }
        Ok(ledger)
    }

    /// A ledger which records nothing.
    pub fn detached(client: &Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client.clone(), namespace),
            task: None,
            strict: false,
        }
    }

    async fn load(&self, namespace: &str, template: T) -> Result<T, Error> {
        let kind = T::kind(&());
        if namespace.is_empty() {
            return Err(Error::MissingTaskField {
                kind: kind.to_string(),
                field: "openebsNamespace".to_string(),
            });
        }
        let name = template.name_any();
        if name.is_empty() {
            return Err(Error::MissingTaskField {
                kind: kind.to_string(),
                field: "name".to_string(),
            });
        }
        let mut task = match self.api.get(&name).await {
            Ok(task) => task,
            Err(error) if crate::error::is_not_found(&error) => {
                info!(task = %name, "Creating {kind}");
                self.api.create(&PostParams::default(), &template).await?
            }
            Err(error) => return Err(error.into()),
        };
        let summary = task.summary_mut();
        if summary.start_time.is_none() {
            summary.phase = Some(TaskPhase::Started);
            summary.start_time = Some(Time(Utc::now()));
        }
        task.steps_mut().clear();
        Ok(self
            .api
            .replace(&name, &PostParams::default(), &task)
            .await?)
    }

    /// The task as last persisted, if any.
    pub fn task(&self) -> Option<&T> {
        self.task.as_ref()
    }

    /// Record the status of a step and persist the task.
    pub async fn record_step(&mut self, status: StepStatus) -> Result<(), Error> {
        let Some(task) = self.task.as_mut() else {
            return Ok(());
        };
        let mut updated = task.clone();
        apply_step(updated.steps_mut(), status, Time(Utc::now()))?;
        let name = updated.name_any();
        match self.api.replace(&name, &PostParams::default(), &updated).await {
            Ok(task) => {
                self.task = Some(task);
                Ok(())
            }
            Err(error) if !self.strict => {
                warn!(task = %name, %error, "Failed to record task progress");
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Record that the step is in progress.
    pub async fn waiting(&mut self, step: &str) -> Result<(), Error> {
        self.record_step(StepStatus {
            step: step.to_string(),
            phase: Some(StepPhase::Waiting),
            ..Default::default()
        })
        .await
    }

    /// Record that the step completed.
    pub async fn completed(&mut self, step: &str, message: &str) -> Result<(), Error> {
        self.record_step(StepStatus {
            step: step.to_string(),
            phase: Some(StepPhase::Completed),
            message: message.to_string(),
            ..Default::default()
        })
        .await
    }

    /// Record that the step failed.
    pub async fn errored(&mut self, step: &str, message: &str, reason: &str) -> Result<(), Error> {
        self.record_step(StepStatus {
            step: step.to_string(),
            phase: Some(StepPhase::Errored),
            message: message.to_string(),
            reason: reason.to_string(),
            ..Default::default()
        })
        .await
    }

    /// Run the step, recording it as waiting first and then as completed or errored.
    pub async fn run_step<R, Fut>(&mut self, step: &str, success: &str, work: Fut) -> Result<R, Error>
    where
        Fut: Future<Output = Result<R, Error>>,
    {
        self.waiting(step).await?;
        match work.await {
            Ok(value) => {
                self.completed(step, success).await?;
                Ok(value)
            }
            Err(error) => {
                let (message, reason) = error.message_and_reason();
                self.errored(step, &message, &reason).await?;
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(seconds: i64) -> Time {
        Time(Utc.timestamp_opt(seconds, 0).unwrap())
    }

    fn status(step: &str, phase: Option<StepPhase>, message: &str, reason: &str) -> StepStatus {
        StepStatus {
            step: step.to_string(),
            phase,
            message: message.to_string(),
            reason: reason.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn status_validation() {
        assert!(validate_step(&status("PreUpgrade", Some(StepPhase::Waiting), "", "")).is_ok());
        assert!(validate_step(&status("", Some(StepPhase::Waiting), "", "")).is_err());
        assert!(validate_step(&status("PreUpgrade", None, "done", "")).is_err());
        assert!(validate_step(&status("PreUpgrade", Some(StepPhase::Completed), "", "")).is_err());
        assert!(
            validate_step(&status("PreUpgrade", Some(StepPhase::Completed), "done", "")).is_ok()
        );
        assert!(
            validate_step(&status("PreUpgrade", Some(StepPhase::Errored), "failed", "")).is_err()
        );
        assert!(validate_step(&status(
            "PreUpgrade",
            Some(StepPhase::Errored),
            "failed",
            "not found"
        ))
        .is_ok());
    }

    #[test]
    fn waiting_appends_and_others_overwrite() {
        let mut steps = vec![];
        apply_step(&mut steps, status("PreUpgrade", Some(StepPhase::Waiting), "", ""), at(10)).unwrap();
        apply_step(
            &mut steps,
            status("PreUpgrade", Some(StepPhase::Completed), "Pre-upgrade steps were successful", ""),
            at(20),
        )
        .unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].start_time, Some(at(10)));
        assert_eq!(steps[0].last_updated_time, Some(at(20)));
        assert_eq!(steps[0].phase, Some(StepPhase::Completed));

        apply_step(&mut steps, status("ReplicaUpgrade", Some(StepPhase::Waiting), "", ""), at(30)).unwrap();
        apply_step(
            &mut steps,
            status("ReplicaUpgrade", Some(StepPhase::Errored), "failed to patch cvr", "conflict"),
            at(40),
        )
        .unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].start_time, Some(at(30)));
        assert_eq!(steps[1].reason, "conflict");

        let invalid = status("TargetUpgrade", Some(StepPhase::Completed), "", "");
        assert!(apply_step(&mut steps, invalid, at(50)).is_err());
        assert_eq!(steps.len(), 2);
    }

    #[test]
    fn first_step_without_waiting_starts_an_entry() {
        let mut steps = vec![];
        apply_step(
            &mut steps,
            status("Migrate", Some(StepPhase::Completed), "Migration steps were successful", ""),
            at(5),
        )
        .unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].start_time, Some(at(5)));
    }
}
