use crate::error::Error;
use serde::Serialize;
use serde_json::{Map, Value};

/// A patch document which transforms one object into another.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchPayload(Value);

impl PatchPayload {
    /// Whether applying the patch would leave the object unchanged.
    pub fn is_empty(&self) -> bool {
        matches!(&self.0, Value::Object(map) if map.is_empty())
    }
    /// Make the patch conditional on the object still being at the given resource version.
    /// The api server rejects it with a conflict if the object was modified in the meantime.
    pub fn with_resource_version(mut self, resource_version: Option<String>) -> Self {
        let Some(resource_version) = resource_version else {
            return self;
        };
        if let Value::Object(patch) = &mut self.0 {
            let metadata = patch
                .entry("metadata")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(metadata) = metadata {
                metadata.insert(
                    "resourceVersion".to_string(),
                    Value::String(resource_version),
                );
            }
        }
        self
    }
    /// The patch document.
    pub fn value(&self) -> &Value {
        &self.0
    }
    /// Consume the payload into the patch document.
    pub fn into_value(self) -> Value {
        self.0
    }
}

/// Generate the patch which turns `old` into `new`.
/// Maps are merged key by key, keys missing from `new` are removed by setting them to null,
/// and any other value (arrays included) is replaced wholesale.
pub fn diff<T: Serialize>(old: &T, new: &T) -> Result<PatchPayload, Error> {
    let old = to_value(old, "old object")?;
    let new = to_value(new, "new object")?;
    Ok(PatchPayload(match diff_values(&old, &new) {
        Some(Value::Object(map)) => Value::Object(map),
        Some(other) => other,
        None => Value::Object(Map::new()),
    }))
}

/// Generate the strategic merge patch which turns `old` into `new`, for built-in kinds.
/// Lists with a merge key are patched entry by entry: entries missing from `new` get a
/// `$patch: delete` directive and the order of `new` is kept with `$setElementOrder`.
/// Lists without a merge key are replaced wholesale.
pub fn strategic_diff<T: Serialize>(old: &T, new: &T) -> Result<PatchPayload, Error> {
    let old = to_value(old, "old object")?;
    let new = to_value(new, "new object")?;
    Ok(PatchPayload(
        strategic_values(&old, &new).unwrap_or_else(|| Value::Object(Map::new())),
    ))
}

fn to_value<T: Serialize>(object: &T, what: &str) -> Result<Value, Error> {
    serde_json::to_value(object).map_err(|source| Error::Serialize {
        what: what.to_string(),
        source,
    })
}

fn diff_values(old: &Value, new: &Value) -> Option<Value> {
    match (old, new) {
        (Value::Object(old), Value::Object(new)) => {
            let mut patch = Map::new();
            for (key, old_value) in old {
                match new.get(key) {
                    None => {
                        patch.insert(key.clone(), Value::Null);
                    }
                    Some(new_value) => {
                        if let Some(value) = diff_values(old_value, new_value) {
                            patch.insert(key.clone(), value);
                        }
                    }
                }
            }
            for (key, new_value) in new {
                if !old.contains_key(key) {
                    patch.insert(key.clone(), new_value.clone());
                }
            }
            (!patch.is_empty()).then_some(Value::Object(patch))
        }
        (old, new) if old == new => None,
        (_, new) => Some(new.clone()),
    }
}

/// The merge key of the lists of the workload, service and metadata fields we patch.
fn merge_key(field: &str, entries: &[Value]) -> Option<&'static str> {
    let key = match field {
        "containers" | "initContainers" | "ephemeralContainers" | "volumes" | "volumeMounts"
        | "env" | "imagePullSecrets" => "name",
        "ownerReferences" => "uid",
        "volumeDevices" => "devicePath",
        "ports" => {
            let container_ports = entries
                .iter()
                .all(|entry| entry.get("containerPort").is_some());
            if container_ports {
                "containerPort"
            } else {
                "port"
            }
        }
        _ => return None,
    };
    entries
        .iter()
        .all(|entry| entry.get(key).is_some())
        .then_some(key)
}

fn strategic_values(old: &Value, new: &Value) -> Option<Value> {
    let (Value::Object(old), Value::Object(new)) = (old, new) else {
        return (old != new).then(|| new.clone());
    };
    let mut patch = Map::new();
    for (field, old_value) in old {
        let Some(new_value) = new.get(field) else {
            patch.insert(field.clone(), Value::Null);
            continue;
        };
        match (old_value, new_value) {
            (Value::Array(old_list), Value::Array(new_list)) => {
                let keys = (merge_key(field, old_list), merge_key(field, new_list));
                match keys {
                    (Some(key), Some(new_key)) if key == new_key => {
                        if let Some(list) = strategic_list(key, old_list, new_list) {
                            patch.insert(
                                format!("$setElementOrder/{field}"),
                                Value::Array(
                                    new_list
                                        .iter()
                                        .map(|entry| keyed(key, entry, Map::new()))
                                        .collect(),
                                ),
                            );
                            patch.insert(field.clone(), Value::Array(list));
                        }
                    }
                    _ if old_list != new_list => {
                        patch.insert(field.clone(), new_value.clone());
                    }
                    _ => {}
                }
            }
            _ => {
                if let Some(value) = strategic_values(old_value, new_value) {
                    patch.insert(field.clone(), value);
                }
            }
        }
    }
    for (field, new_value) in new {
        if !old.contains_key(field) {
            patch.insert(field.clone(), new_value.clone());
        }
    }
    (!patch.is_empty()).then_some(Value::Object(patch))
}

/// The entries of a keyed list patch, or None if the list is unchanged.
fn strategic_list(key: &str, old: &[Value], new: &[Value]) -> Option<Vec<Value>> {
    let find = |list: &[Value], value: &Value| {
        list.iter()
            .find(|entry| entry.get(key) == value.get(key))
            .cloned()
    };
    let mut entries = Vec::new();
    for entry in new {
        match find(old, entry) {
            None => entries.push(entry.clone()),
            Some(previous) => {
                if let Some(Value::Object(changes)) = strategic_values(&previous, entry) {
                    entries.push(keyed(key, entry, changes));
                }
            }
        }
    }
    for entry in old {
        if find(new, entry).is_none() {
            let mut delete = Map::new();
            delete.insert("$patch".to_string(), Value::String("delete".to_string()));
            entries.push(keyed(key, entry, delete));
        }
    }
    let order = |list: &[Value]| list.iter().map(|e| e.get(key).cloned()).collect::<Vec<_>>();
    let reordered = order(old)
        .into_iter()
        .filter(|k| new.iter().any(|e| e.get(key) == k.as_ref()))
        .ne(order(new).into_iter().filter(|k| old.iter().any(|e| e.get(key) == k.as_ref())));
    (!entries.is_empty() || reordered).then_some(entries)
}

/// The fields along with the merge key of the entry.
fn keyed(key: &str, entry: &Value, mut fields: Map<String, Value>) -> Value {
    if let Some(value) = entry.get(key) {
        fields.insert(key.to_string(), value.clone());
    }
    Value::Object(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unchanged_object_is_a_noop() {
        let object = json!({"metadata": {"labels": {"a": "b"}}, "spec": {"list": [1, 2]}});
        let patch = diff(&object, &object).unwrap();
        assert!(patch.is_empty());
    }

    #[test]
    fn nested_changes() {
        let old = json!({
            "metadata": {"name": "cspi", "labels": {"openebs.io/version": "1.11.0", "keep": "me"}},
            "versionDetails": {"desired": "1.11.0"},
            "spec": {"list": [1, 2, 3], "gone": true}
        });
        let new = json!({
            "metadata": {"name": "cspi", "labels": {"openebs.io/version": "2.0.0", "keep": "me"}},
            "versionDetails": {"desired": "2.0.0"},
            "spec": {"list": [1, 2]}
        });
        let patch = diff(&old, &new).unwrap();
        assert_eq!(
            patch.value(),
            &json!({
                "metadata": {"labels": {"openebs.io/version": "2.0.0"}},
                "versionDetails": {"desired": "2.0.0"},
                "spec": {"list": [1, 2], "gone": null}
            })
        );
    }

    #[test]
    fn strategic_list_removal() {
        let old = json!({"spec": {"template": {"spec": {
            "volumes": [{"name": "device", "hostPath": {"path": "/dev"}}, {"name": "sockfile", "emptyDir": {}}],
            "tolerations": [{"key": "a"}, {"key": "b"}]
        }}}});
        let new = json!({"spec": {"template": {"spec": {
            "volumes": [{"name": "device", "hostPath": {"path": "/dev"}}],
            "tolerations": [{"key": "a"}]
        }}}});
        let patch = strategic_diff(&old, &new).unwrap();
        assert_eq!(
            patch.value(),
            &json!({"spec": {"template": {"spec": {
                "$setElementOrder/volumes": [{"name": "device"}],
                "volumes": [{"name": "sockfile", "$patch": "delete"}],
                "tolerations": [{"key": "a"}]
            }}}})
        );
    }

    #[test]
    fn strategic_list_entries() {
        let old = json!({"spec": {"containers": [
            {"name": "pool", "image": "openebs/cstor-pool:1.12.0", "args": ["-a"]},
            {"name": "mgmt", "image": "openebs/cstor-pool-mgmt:1.12.0"}
        ]}});
        let new = json!({"spec": {"containers": [
            {"name": "pool", "image": "openebs/cstor-pool:2.0.0", "args": ["-a"]},
            {"name": "mgmt", "image": "openebs/cstor-pool-mgmt:1.12.0"},
            {"name": "exporter", "image": "openebs/m-exporter:2.0.0"}
        ]}});
        let patch = strategic_diff(&old, &new).unwrap();
        assert_eq!(
            patch.value(),
            &json!({"spec": {
                "$setElementOrder/containers": [{"name": "pool"}, {"name": "mgmt"}, {"name": "exporter"}],
                "containers": [
                    {"name": "pool", "image": "openebs/cstor-pool:2.0.0"},
                    {"name": "exporter", "image": "openebs/m-exporter:2.0.0"}
                ]
            }})
        );
        assert!(strategic_diff(&new, &new).unwrap().is_empty());
    }

    #[test]
    fn resource_version_precondition() {
        let old = json!({"metadata": {"name": "a"}, "spec": {"size": 1}});
        let new = json!({"metadata": {"name": "a"}, "spec": {"size": 2}});
        let patch = diff(&old, &new)
            .unwrap()
            .with_resource_version(Some("42".to_string()));
        assert_eq!(
            patch.into_value(),
            json!({"metadata": {"resourceVersion": "42"}, "spec": {"size": 2}})
        );
    }
}
