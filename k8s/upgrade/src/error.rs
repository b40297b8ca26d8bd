use snafu::Snafu;
use std::time::Duration;

/// Errors generated while migrating or upgrading a resource.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    #[snafu(display("Kubernetes client error: {}", source))]
    /// k8s client error
    Kube { source: kube::Error },
    #[snafu(display("Failed to serialize '{}': {}", what, source))]
    Serialize {
        what: String,
        source: serde_json::Error,
    },
    #[snafu(display("Failed to parse cas config of '{}': {}", name, source))]
    CasConfig {
        name: String,
        source: serde_yaml::Error,
    },
    #[snafu(display("Invalid cas config value '{}' for '{}': {}", value, key, reason))]
    CasConfigValue {
        key: String,
        value: String,
        reason: String,
    },
    #[snafu(display("{} '{}' has no field '{}'", kind, name, field))]
    MissingField {
        kind: String,
        name: String,
        field: String,
    },
    #[snafu(display("{} {} version {} is neither {} nor {}", kind, name, version, from, to))]
    VersionMismatch {
        kind: String,
        name: String,
        version: String,
        from: String,
        to: String,
    },
    #[snafu(display("{} pod missing", component))]
    OperatorPodMissing { component: String },
    #[snafu(display(
        "{} pod {} is in {} version, but required version is {}",
        component,
        pod,
        found,
        expected
    ))]
    OperatorVersion {
        component: String,
        pod: String,
        found: String,
        expected: String,
    },
    #[snafu(display("Expected exactly one {} for '{}', found {}", kind, selector, count))]
    ObjectCount {
        kind: String,
        selector: String,
        count: usize,
    },
    #[snafu(display(
        "Timed out waiting for {} after {} attempts every {:?}",
        what,
        attempts,
        interval
    ))]
    Timeout {
        what: String,
        attempts: u32,
        interval: Duration,
    },
    #[snafu(display("Failed to exec into pod {}: {}", pod, message))]
    Exec { pod: String, message: String },
    #[snafu(display("No version tag found on image {}", image))]
    InvalidImage { image: String },
    #[snafu(display("Invalid task status {}", status))]
    InvalidStatus { status: String },
    #[snafu(display("Missing {} for {}", field, kind))]
    MissingTaskField { kind: String, field: String },
    #[snafu(display("Task {} is already in terminal phase {}", task, phase))]
    TerminalTask { task: String, phase: String },
    #[snafu(display("{}", message))]
    NamingConflict { message: String },
    #[snafu(display("Volume {} is mounted by pod {}/{}, scale down the application first", pv, namespace, pod))]
    VolumeMounted {
        pv: String,
        namespace: String,
        pod: String,
    },
    #[snafu(display("{}", message))]
    Precondition { message: String },
    #[snafu(display("{}: {}", message, source))]
    Step {
        step: String,
        message: String,
        source: Box<Error>,
    },
    #[snafu(display("{}", message))]
    Generic { message: String },
}

impl From<kube::Error> for Error {
    fn from(source: kube::Error) -> Self {
        Self::Kube { source }
    }
}

impl Error {
    /// Wrap the error with a short human readable message, as recorded in the task ledger.
    pub fn step(self, step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Step {
            step: step.into(),
            message: message.into(),
            source: Box::new(self),
        }
    }
    /// The short message and the underlying reason of a failed step.
    pub fn message_and_reason(&self) -> (String, String) {
        match self {
            Self::Step {
                message, source, ..
            } => (message.clone(), source.to_string()),
            other => (other.to_string(), other.to_string()),
        }
    }
    /// Check if the error is a kubernetes NotFound error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Kube { source } => is_not_found(source),
            Self::Step { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
    /// Check if the error is a kubernetes Conflict error.
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Kube { source } => is_conflict(source),
            Self::Step { source, .. } => source.is_conflict(),
            _ => false,
        }
    }
}

const NOT_FOUND: u16 = 404;
const CONFLICT: u16 = 409;

/// Check if the kube error is a NotFound api error.
pub(crate) fn is_not_found(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(e) if e.code == NOT_FOUND)
}

/// Check if the kube error is a Conflict api error, ie the object was modified concurrently.
pub(crate) fn is_conflict(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(e) if e.code == CONFLICT && e.reason != "AlreadyExists")
}

/// Check if the kube error is an AlreadyExists api error.
pub(crate) fn is_already_exists(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(e) if e.code == CONFLICT && e.reason == "AlreadyExists")
}

/// Helper to wrap errors of a pipeline step with its ledger message.
pub(crate) trait StepContext<T> {
    /// Add the step name and ledger message to the error.
    fn step(self, step: &str, message: &str) -> Result<T, Error>;
}

impl<T> StepContext<T> for Result<T, Error> {
    fn step(self, step: &str, message: &str) -> Result<T, Error> {
        self.map_err(|error| error.step(step, message))
    }
}

impl<T> StepContext<T> for Result<T, kube::Error> {
    fn step(self, step: &str, message: &str) -> Result<T, Error> {
        self.map_err(|error| Error::from(error).step(step, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::error::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "test".to_string(),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn classification() {
        assert!(is_not_found(&api_error(404, "NotFound")));
        assert!(is_conflict(&api_error(409, "Conflict")));
        assert!(!is_conflict(&api_error(409, "AlreadyExists")));
        assert!(is_already_exists(&api_error(409, "AlreadyExists")));

        let error = Error::from(api_error(404, "NotFound")).step("Migrate", "failed to get pv");
        assert!(error.is_not_found());
        let (message, reason) = error.message_and_reason();
        assert_eq!(message, "failed to get pv");
        assert!(reason.starts_with("Kubernetes client error"));
    }
}
