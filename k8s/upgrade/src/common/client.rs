use crate::{
    common::patch::PatchPayload,
    error::{is_already_exists, is_not_found, Error},
};
use k8s_openapi::{
    api::core::v1::Pod,
    apimachinery::pkg::apis::meta::v1::{OwnerReference, Status},
};
use kube::{
    api::{AttachParams, DeleteParams, ListParams, Patch, PatchParams, PostParams},
    Api, Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;
use tokio::io::AsyncReadExt;
use utils::PAGINATION_LIMIT;

/// Fetch the list of all objects matching the label selector, a page at a time.
pub(crate) async fn list<K>(api: &Api<K>, label_selector: &str) -> Result<Vec<K>, Error>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    let mut list_params = ListParams::default()
        .labels(label_selector)
        .limit(PAGINATION_LIMIT);
    let mut objects: Vec<K> = vec![];
    loop {
        let mut result = api.list(&list_params).await?;
        objects.append(&mut result.items);
        // Check for the token, if valid then continue.
        match result.metadata.continue_ {
            Some(token) if !token.is_empty() => {
                list_params = list_params.continue_token(token.as_str())
            }
            _ => break,
        }
    }
    Ok(objects)
}

/// Fetch the only object matching the label selector.
pub(crate) async fn get_one<K>(api: &Api<K>, label_selector: &str) -> Result<K, Error>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    let mut objects = list(api, label_selector).await?;
    match objects.len() {
        1 => Ok(objects.remove(0)),
        count => Err(Error::ObjectCount {
            kind: K::kind(&()).to_string(),
            selector: label_selector.to_string(),
            count,
        }),
    }
}

/// Fetch the object by name, None if it does not exist.
pub(crate) async fn get_opt<K>(api: &Api<K>, name: &str) -> Result<Option<K>, Error>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    match api.get(name).await {
        Ok(object) => Ok(Some(object)),
        Err(error) if is_not_found(&error) => Ok(None),
        Err(error) => Err(error.into()),
    }
}

/// Create the object, an already existing object with the same name is not an error.
pub(crate) async fn create_if_missing<K>(api: &Api<K>, object: &K) -> Result<(), Error>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    match api.create(&PostParams::default(), object).await {
        Ok(_) => Ok(()),
        Err(error) if is_already_exists(&error) => {
            tracing::debug!(name = object.name_any(), "Object already exists");
            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}

/// Delete the object by name, an already deleted object is not an error.
pub(crate) async fn delete_if_exists<K>(api: &Api<K>, name: &str) -> Result<(), Error>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(error) if is_not_found(&error) => Ok(()),
        Err(error) => Err(error.into()),
    }
}

/// Apply a JSON merge patch to the object, skipping empty patches.
pub(crate) async fn merge_patch<K>(
    api: &Api<K>,
    name: &str,
    payload: PatchPayload,
) -> Result<Option<K>, Error>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    if payload.is_empty() {
        return Ok(None);
    }
    let patch = Patch::Merge(payload.into_value());
    Ok(Some(api.patch(name, &PatchParams::default(), &patch).await?))
}

/// Apply a strategic merge patch to a built-in kubernetes object, skipping empty patches.
pub(crate) async fn strategic_patch<K>(
    api: &Api<K>,
    name: &str,
    payload: PatchPayload,
) -> Result<Option<K>, Error>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    if payload.is_empty() {
        return Ok(None);
    }
    let patch = Patch::Strategic(payload.into_value());
    Ok(Some(api.patch(name, &PatchParams::default(), &patch).await?))
}

/// Remove the given finalizer from the object, if present.
pub(crate) async fn remove_finalizer<K>(api: &Api<K>, object: &K, finalizer: &str) -> Result<(), Error>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    if !object.finalizers().iter().any(|f| f == finalizer) {
        return Ok(());
    }
    let finalizers = object
        .finalizers()
        .iter()
        .filter(|f| f.as_str() != finalizer)
        .cloned()
        .collect::<Vec<_>>();
    let patch = serde_json::json!({
        "metadata": {
            "finalizers": finalizers,
            "resourceVersion": object.resource_version(),
        }
    });
    api.patch(
        &object.name_any(),
        &PatchParams::default(),
        &Patch::Merge(patch),
    )
    .await?;
    Ok(())
}

/// Run a command in a container of the pod and return its standard output.
pub(crate) async fn exec(
    api: &Api<Pod>,
    pod: &str,
    container: &str,
    command: Vec<String>,
) -> Result<String, Error> {
    let params = AttachParams::default()
        .container(container)
        .stdout(true)
        .stderr(false);
    let mut process = api.exec(pod, command, &params).await?;
    let status = process.take_status();
    let mut output = String::new();
    if let Some(mut stdout) = process.stdout() {
        stdout
            .read_to_string(&mut output)
            .await
            .map_err(|error| Error::Exec {
                pod: pod.to_string(),
                message: error.to_string(),
            })?;
    }
    let status = match status {
        Some(status) => status.await,
        None => None,
    };
    process.join().await.map_err(|error| Error::Exec {
        pod: pod.to_string(),
        message: error.to_string(),
    })?;
    exec_status(pod, status)?;
    Ok(output)
}

/// Fail if the remote command did not exit successfully.
fn exec_status(pod: &str, status: Option<Status>) -> Result<(), Error> {
    match status {
        Some(status) if status.status.as_deref() != Some("Success") => Err(Error::Exec {
            pod: pod.to_string(),
            message: status
                .message
                .or(status.reason)
                .unwrap_or_else(|| "command failed".to_string()),
        }),
        _ => Ok(()),
    }
}

/// The owner reference which makes the object the controller of its dependents.
pub(crate) fn controller_ref<K>(object: &K) -> Result<OwnerReference, Error>
where
    K: Resource<DynamicType = ()>,
{
    object
        .controller_owner_ref(&())
        .ok_or_else(|| Error::MissingField {
            kind: K::kind(&()).to_string(),
            name: object.name_any(),
            field: ".metadata.uid".to_string(),
        })
}

/// Label selector in the `key=value` form.
pub(crate) fn selector(key: &str, value: &str) -> String {
    format!("{key}={value}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_exit_status() {
        let success = Status {
            status: Some("Success".to_string()),
            ..Default::default()
        };
        assert!(exec_status("cstor-pool-abcd", Some(success)).is_ok());
        assert!(exec_status("cstor-pool-abcd", None).is_ok());

        let failure = Status {
            status: Some("Failure".to_string()),
            message: Some("command terminated with non-zero exit code".to_string()),
            reason: Some("NonZeroExitCode".to_string()),
            ..Default::default()
        };
        assert_eq!(
            exec_status("cstor-pool-abcd", Some(failure))
                .unwrap_err()
                .to_string(),
            "Failed to exec into pod cstor-pool-abcd: command terminated with non-zero exit code"
        );
    }
}
