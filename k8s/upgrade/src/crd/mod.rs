/// The cstor.openebs.io/v1 resources of the CSI cStor control plane.
pub mod cstor;
/// The JivaVolume custom resource.
pub mod jiva;
/// The openebs.io/v1alpha1 resources of the legacy (non-CSI) cStor control plane.
pub mod legacy;
/// The node disk manager block devices and claims.
pub mod ndm;
/// The CSI volume snapshot resources.
pub mod snapshot;
/// The MigrationTask and UpgradeTask custom resources.
pub mod task;

/// Implement `kube::Resource` for a custom resource which carries fields next to its spec and
/// status (eg: `versionDetails`), which the `CustomResource` derive cannot express.
/// The type must have `types: Option<TypeMeta>` and `metadata: ObjectMeta` fields.
macro_rules! custom_resource {
    ($kind:ident, $group:literal, $version:literal, $plural:literal, $scope:ty) => {
        impl kube::Resource for $kind {
            type DynamicType = ();
            type Scope = $scope;

            fn kind(_: &()) -> std::borrow::Cow<'_, str> {
                stringify!($kind).into()
            }
            fn group(_: &()) -> std::borrow::Cow<'_, str> {
                $group.into()
            }
            fn version(_: &()) -> std::borrow::Cow<'_, str> {
                $version.into()
            }
            fn plural(_: &()) -> std::borrow::Cow<'_, str> {
                $plural.into()
            }
            fn meta(&self) -> &kube::api::ObjectMeta {
                &self.metadata
            }
            fn meta_mut(&mut self) -> &mut kube::api::ObjectMeta {
                &mut self.metadata
            }
        }

        impl $kind {
            /// The type information of the resource, required when creating it.
            pub fn type_meta() -> kube::core::TypeMeta {
                kube::core::TypeMeta {
                    api_version: format!("{}/{}", $group, $version),
                    kind: stringify!($kind).to_string(),
                }
            }
        }
    };
}
pub(crate) use custom_resource;

/// Clear the server populated metadata of an object, so that it can be created as a new object.
pub(crate) fn fresh_metadata(metadata: &kube::api::ObjectMeta) -> kube::api::ObjectMeta {
    kube::api::ObjectMeta {
        name: metadata.name.clone(),
        namespace: metadata.namespace.clone(),
        labels: metadata.labels.clone(),
        annotations: metadata.annotations.clone(),
        finalizers: metadata.finalizers.clone(),
        ..Default::default()
    }
}
