//! Various common constants used by the migration and upgrade jobs.

use std::time::Duration;

/// Namespace where the OpenEBS control plane components run by default.
pub const DEFAULT_OPENEBS_NAMESPACE: &str = "openebs";

/// Default request timeout for any kubernetes api request.
pub const DEFAULT_REQ_TIMEOUT: &str = "30s";

/// Default interval between two polls of a converging resource.
pub const DEFAULT_RETRY_INTERVAL: &str = "10s";

/// Default number of polls of a converging resource before giving up.
pub const DEFAULT_RETRY_ATTEMPTS: &str = "60";

/// Interval between two polls of a rolling out workload.
pub const ROLLOUT_POLL_PERIOD: Duration = Duration::from_secs(5);

/// Number of polls of a rolling out workload before giving up.
pub const ROLLOUT_POLL_ATTEMPTS: u32 = 60;

/// Page size used when listing resources.
pub const PAGINATION_LIMIT: u32 = 100;

/// Default backoff limit of a kubernetes job, when the job does not set one.
pub const DEFAULT_JOB_BACKOFF_LIMIT: i32 = 6;

/// Environment variable carrying the OpenEBS namespace.
pub const OPENEBS_NAMESPACE_ENV: &str = "OPENEBS_NAMESPACE";

/// Environment variable carrying the label selector of the upgrade tasks to process.
pub const UPGRADE_TASK_LABEL_ENV: &str = "UPGRADE_TASK_LABEL";

/// Environment variable carrying the name of the pod running the job.
pub const POD_NAME_ENV: &str = "POD_NAME";

/// Environment variable carrying the service account of the cstor operators.
pub const CSTOR_OPERATOR_SERVICE_ACCOUNT_ENV: &str = "OPENEBS_IO_CSTOR_OPERATOR_SERVICE_ACCOUNT";

/// Service account used by the cstor operators when not overridden.
pub const DEFAULT_CSTOR_OPERATOR_SERVICE_ACCOUNT: &str = "openebs-cstor-operator";
