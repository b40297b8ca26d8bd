/// Kubernetes api helpers: paginated lists, tolerant creates and deletes, patches and exec.
pub(crate) mod client;
/// Labels, annotations and other well known names of the OpenEBS resources.
pub mod constants;
/// Container image helpers.
pub mod image;
/// JSON merge patch generation.
pub mod patch;
/// Bounded polling and conflict retries.
pub mod retry;
/// Rollout status of deployments and statefulsets.
pub mod rollout;
/// Version checks of resources and control plane components.
pub mod version;
