use crate::error::Error;
use std::{future::Future, time::Duration};
use tracing::{debug, warn};
use utils::{ROLLOUT_POLL_ATTEMPTS, ROLLOUT_POLL_PERIOD};

/// How many times, and how often, a converging condition is checked.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of probes.
    pub attempts: u32,
    /// Time between two probes.
    pub interval: Duration,
}

impl RetryPolicy {
    /// A new policy with the given attempts and interval.
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }
    /// Policy used to wait for a workload rollout.
    pub fn rollout() -> Self {
        Self::new(ROLLOUT_POLL_ATTEMPTS, ROLLOUT_POLL_PERIOD)
    }
    /// Policy used to wait for a controller to converge a resource.
    pub fn convergence() -> Self {
        Self::new(60, Duration::from_secs(10))
    }
    /// Policy used to retry writes which lost an optimistic concurrency race.
    pub fn conflict() -> Self {
        Self::new(5, Duration::from_secs(2))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::convergence()
    }
}

/// Probe until it yields a value, sleeping for the policy interval between probes.
/// `Ok(None)` means the condition is not met yet, whereas an error aborts the poll.
pub async fn poll<T, F, Fut>(policy: RetryPolicy, what: &str, mut probe: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, Error>>,
{
    for attempt in 1 ..= policy.attempts {
        if let Some(value) = probe().await? {
            return Ok(value);
        }
        debug!(what, attempt, "Condition not met yet");
        if attempt < policy.attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }
    Err(Error::Timeout {
        what: what.to_string(),
        attempts: policy.attempts,
        interval: policy.interval,
    })
}

/// Run the operation again while it fails with a conflict error, up to the policy attempts.
/// Any other error is returned right away.
pub async fn retry_on_conflict<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(error) if error.is_conflict() && attempt < policy.attempts => {
                warn!(%error, attempt, "Conflict while updating resource, retrying");
                attempt += 1;
                tokio::time::sleep(policy.interval).await;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::error::ErrorResponse;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1))
    }

    #[test]
    fn presets() {
        assert_eq!(RetryPolicy::rollout(), RetryPolicy::new(60, Duration::from_secs(5)));
        assert_eq!(RetryPolicy::convergence(), RetryPolicy::new(60, Duration::from_secs(10)));
    }

    #[tokio::test]
    async fn poll_converges() {
        let probes = AtomicU32::new(0);
        let value = poll(quick(5), "counter", || async {
            let n = probes.fetch_add(1, Ordering::SeqCst) + 1;
            Ok((n == 3).then_some(n))
        })
        .await
        .unwrap();
        assert_eq!(value, 3);
        assert_eq!(probes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn poll_times_out() {
        let probes = AtomicU32::new(0);
        let result: Result<(), _> = poll(quick(4), "never", || async {
            probes.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        })
        .await;
        assert!(matches!(result, Err(Error::Timeout { attempts: 4, .. })));
        assert_eq!(probes.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn poll_stops_on_error() {
        let probes = AtomicU32::new(0);
        let result: Result<(), _> = poll(quick(10), "failing", || async {
            probes.fetch_add(1, Ordering::SeqCst);
            Err(Error::Generic {
                message: "boom".to_string(),
            })
        })
        .await;
        assert!(matches!(result, Err(Error::Generic { .. })));
        assert_eq!(probes.load(Ordering::SeqCst), 1);
    }

    fn conflict() -> Error {
        Error::from(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "the object has been modified".to_string(),
            reason: "Conflict".to_string(),
            code: 409,
        }))
    }

    #[tokio::test]
    async fn conflicts_are_retried() {
        let calls = AtomicU32::new(0);
        let result = retry_on_conflict(quick(5), || async {
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 | 1 => Err(conflict()),
                n => Ok(n),
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);

        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_on_conflict(quick(3), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(conflict())
        })
        .await;
        assert!(result.unwrap_err().is_conflict());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
