use crate::{
    common::retry::{poll, RetryPolicy},
    error::Error,
};
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use kube::{Api, ResourceExt};
use tracing::info;

/// Annotation carrying the revision of a deployment.
const DEPLOYMENT_REVISION_ANNOTATION: &str = "deployment.kubernetes.io/revision";

/// The rollout state of a workload.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RolloutStatus {
    /// Human readable rollout progress.
    pub message: String,
    /// Whether the rollout is complete.
    pub done: bool,
}

impl RolloutStatus {
    fn waiting(message: String) -> Self {
        Self {
            message,
            done: false,
        }
    }
    fn done(message: String) -> Self {
        Self {
            message,
            done: true,
        }
    }
}

/// The revision of the deployment, 0 if it has none.
pub fn deployment_revision(deployment: &Deployment) -> i64 {
    deployment
        .annotations()
        .get(DEPLOYMENT_REVISION_ANNOTATION)
        .and_then(|revision| revision.parse().ok())
        .unwrap_or_default()
}

/// Evaluate the rollout of a deployment towards the given revision.
pub fn deployment_status(deployment: &Deployment, revision: i64) -> Result<RolloutStatus, Error> {
    let name = deployment.name_any();
    let current = deployment_revision(deployment);
    if revision > 0 && current < revision {
        return Ok(RolloutStatus::waiting(format!(
            "desired revision ({revision}) is different from the running revision ({current})"
        )));
    }
    let generation = deployment.metadata.generation.unwrap_or_default();
    let status = deployment.status.clone().unwrap_or_default();
    if generation > status.observed_generation.unwrap_or_default() {
        return Ok(RolloutStatus::waiting(
            "Waiting for deployment spec update to be observed...".to_string(),
        ));
    }
    let deadline_exceeded = status.conditions.unwrap_or_default().iter().any(|c| {
        c.type_ == "Progressing" && c.reason.as_deref() == Some("ProgressDeadlineExceeded")
    });
    if deadline_exceeded {
        return Err(Error::Generic {
            message: format!("deployment {name} exceeded its progress deadline"),
        });
    }
    let updated = status.updated_replicas.unwrap_or_default();
    let replicas = status.replicas.unwrap_or_default();
    let available = status.available_replicas.unwrap_or_default();
    if let Some(desired) = deployment.spec.as_ref().and_then(|s| s.replicas) {
        if updated < desired {
            return Ok(RolloutStatus::waiting(format!(
                "Waiting for deployment {name} rollout to finish: {updated} out of {desired} new replicas have been updated..."
            )));
        }
    }
    if replicas > updated {
        return Ok(RolloutStatus::waiting(format!(
            "Waiting for deployment {name} rollout to finish: {} old replicas are pending termination...",
            replicas - updated
        )));
    }
    if available < updated {
        return Ok(RolloutStatus::waiting(format!(
            "Waiting for deployment {name} rollout to finish: {available} of {updated} updated replicas are available..."
        )));
    }
    Ok(RolloutStatus::done(format!(
        "deployment {name} successfully rolled out"
    )))
}

/// Evaluate the rollout of a statefulset, only the rolling update strategy is supported.
pub fn statefulset_status(statefulset: &StatefulSet) -> Result<RolloutStatus, Error> {
    let spec = statefulset.spec.clone().unwrap_or_default();
    let strategy = spec.update_strategy.unwrap_or_default();
    if strategy.type_.as_deref().unwrap_or("RollingUpdate") != "RollingUpdate" {
        return Err(Error::Generic {
            message: "rollout status is only available for RollingUpdate strategy type"
                .to_string(),
        });
    }
    let status = statefulset.status.clone().unwrap_or_default();
    let observed = status.observed_generation.unwrap_or_default();
    if observed == 0 || statefulset.metadata.generation.unwrap_or_default() > observed {
        return Ok(RolloutStatus::waiting(
            "Waiting for statefulset spec update to be observed...".to_string(),
        ));
    }
    let ready = status.ready_replicas.unwrap_or_default();
    let updated = status.updated_replicas.unwrap_or_default();
    if let Some(replicas) = spec.replicas {
        if ready < replicas {
            return Ok(RolloutStatus::waiting(format!(
                "Waiting for {} pods to be ready...",
                replicas - ready
            )));
        }
    }
    if let Some(partition) = strategy.rolling_update.and_then(|r| r.partition) {
        if let Some(replicas) = spec.replicas {
            if updated < replicas - partition {
                return Ok(RolloutStatus::waiting(format!(
                    "Waiting for partitioned roll out to finish: {updated} out of {} new pods have been updated...",
                    replicas - partition
                )));
            }
        }
        return Ok(RolloutStatus::done(format!(
            "partitioned roll out complete: {updated} new pods have been updated..."
        )));
    }
    let update_revision = status.update_revision.unwrap_or_default();
    if update_revision != status.current_revision.unwrap_or_default() {
        return Ok(RolloutStatus::waiting(format!(
            "waiting for statefulset rolling update to complete {updated} pods at revision {update_revision}..."
        )));
    }
    Ok(RolloutStatus::done(format!(
        "statefulset rolling update complete {} pods at revision {update_revision}...",
        status.current_replicas.unwrap_or_default()
    )))
}

/// Wait for the deployment to roll out the revision following the given one.
pub(crate) async fn wait_deployment(
    api: &Api<Deployment>,
    name: &str,
    revision: i64,
    policy: RetryPolicy,
) -> Result<(), Error> {
    poll(policy, &format!("deployment {name} rollout"), || {
        deployment_rolled_out(api, name, revision + 1)
    })
    .await
}

async fn deployment_rolled_out(
    api: &Api<Deployment>,
    name: &str,
    revision: i64,
) -> Result<Option<()>, Error> {
    let deployment = api.get(name).await?;
    let status = deployment_status(&deployment, revision)?;
    info!(deployment = name, "Rollout status: {}", status.message);
    Ok(status.done.then_some(()))
}

/// Wait for the statefulset to roll out its latest revision.
pub(crate) async fn wait_statefulset(
    api: &Api<StatefulSet>,
    name: &str,
    policy: RetryPolicy,
) -> Result<(), Error> {
    poll(policy, &format!("statefulset {name} rollout"), || {
        statefulset_rolled_out(api, name)
    })
    .await
}

async fn statefulset_rolled_out(api: &Api<StatefulSet>, name: &str) -> Result<Option<()>, Error> {
    let statefulset = api.get(name).await?;
    let status = statefulset_status(&statefulset)?;
    info!(statefulset = name, "Rollout status: {}", status.message);
    Ok(status.done.then_some(()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{
        DeploymentCondition, DeploymentSpec, DeploymentStatus, RollingUpdateStatefulSetStrategy,
        StatefulSetSpec, StatefulSetStatus, StatefulSetUpdateStrategy,
    };
    use kube::api::ObjectMeta;

    fn deployment(revision: &str, generation: i64, status: DeploymentStatus) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some("pool-a".to_string()),
                generation: Some(generation),
                annotations: Some(
                    [(DEPLOYMENT_REVISION_ANNOTATION.to_string(), revision.to_string())]
                        .into_iter()
                        .collect(),
                ),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(1),
                ..Default::default()
            }),
            status: Some(status),
        }
    }

    #[test]
    fn deployment_rollout() {
        let rolled = DeploymentStatus {
            observed_generation: Some(2),
            replicas: Some(1),
            updated_replicas: Some(1),
            available_replicas: Some(1),
            ..Default::default()
        };
        assert_eq!(deployment_revision(&deployment("3", 2, rolled.clone())), 3);
        assert!(deployment_status(&deployment("3", 2, rolled.clone()), 3).unwrap().done);
        assert!(!deployment_status(&deployment("2", 2, rolled.clone()), 3).unwrap().done);
        assert!(!deployment_status(&deployment("3", 3, rolled.clone()), 3).unwrap().done);

        let terminating = DeploymentStatus {
            replicas: Some(2),
            ..rolled.clone()
        };
        let status = deployment_status(&deployment("3", 2, terminating), 3).unwrap();
        assert!(status.message.contains("1 old replicas are pending termination"));

        let stuck = DeploymentStatus {
            conditions: Some(vec![DeploymentCondition {
                type_: "Progressing".to_string(),
                status: "False".to_string(),
                reason: Some("ProgressDeadlineExceeded".to_string()),
                ..Default::default()
            }]),
            ..rolled
        };
        assert!(deployment_status(&deployment("3", 2, stuck), 3).is_err());
    }

    fn statefulset(strategy: &str, partition: Option<i32>, status: StatefulSetStatus) -> StatefulSet {
        StatefulSet {
            metadata: ObjectMeta {
                name: Some("pvc-rep".to_string()),
                generation: Some(1),
                ..Default::default()
            },
            spec: Some(StatefulSetSpec {
                replicas: Some(3),
                update_strategy: Some(StatefulSetUpdateStrategy {
                    type_: Some(strategy.to_string()),
                    rolling_update: partition.map(|partition| RollingUpdateStatefulSetStrategy {
                        partition: Some(partition),
                    }),
                }),
                ..Default::default()
            }),
            status: Some(status),
        }
    }

    #[test]
    fn statefulset_rollout() {
        let status = StatefulSetStatus {
            observed_generation: Some(1),
            replicas: 3,
            ready_replicas: Some(3),
            updated_replicas: Some(3),
            current_replicas: Some(3),
            current_revision: Some("rev-2".to_string()),
            update_revision: Some("rev-2".to_string()),
            ..Default::default()
        };
        assert!(statefulset_status(&statefulset("RollingUpdate", None, status.clone()))
            .unwrap()
            .done);
        assert!(statefulset_status(&statefulset("OnDelete", None, status.clone())).is_err());

        let updating = StatefulSetStatus {
            current_revision: Some("rev-1".to_string()),
            updated_replicas: Some(1),
            ..status.clone()
        };
        assert!(!statefulset_status(&statefulset("RollingUpdate", None, updating.clone()))
            .unwrap()
            .done);
        assert!(statefulset_status(&statefulset("RollingUpdate", Some(2), updating))
            .unwrap()
            .done);

        let not_ready = StatefulSetStatus {
            ready_replicas: Some(2),
            ..status
        };
        let rollout = statefulset_status(&statefulset("RollingUpdate", None, not_ready)).unwrap();
        assert_eq!(rollout.message, "Waiting for 1 pods to be ready...");
    }
}
