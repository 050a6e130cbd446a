//! Retry and readiness-wait policies
//!
//! Two distinct mechanisms live here. `RetryPolicy` governs re-running a
//! whole operation after a transiently failing provider call, classified
//! by `is_retryable`. `WaitPolicy`/`wait_until` poll for a resource to
//! reach a terminal provisioning state after a create has been accepted.

use crate::error::{CloudError, Result};
use std::time::Duration;
use tracing::{debug, warn};

/// Provider error fragments that indicate eventual consistency rather
/// than a real failure. Deletes racing detachment report
/// `DependencyViolation`; keypair and profile propagation surface the
/// other two for a few seconds after creation.
pub const RETRYABLE_PATTERNS: &[&str] = &[
    "DependencyViolation",
    "does not exist in default VPC",
    "Invalid IamInstanceProfile",
];

/// Whether an error is worth retrying with backoff.
///
/// Only raw provider errors are ever retryable; preconditions, timeouts
/// and engine-level failures are final.
pub fn is_retryable(err: &CloudError) -> bool {
    let CloudError::Provider { code, message } = err else {
        return false;
    };
    if RETRYABLE_PATTERNS
        .iter()
        .any(|p| code.contains(p) || message.contains(p))
    {
        return true;
    }
    // Freshly created instance profiles propagate slowly; the parameter
    // rejection names the profile rather than a dependency.
    code == "InvalidParameterValue" && message.contains("IamInstanceProfile")
}

/// Capped exponential backoff for retryable provider errors.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,

    /// Delay before the second attempt.
    pub initial_delay: Duration,

    /// Upper bound for any single delay.
    pub max_delay: Duration,

    /// Backoff multiplier.
    pub backoff_multiplier: f64,

    /// Total time budget across all attempts of one operation.
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            max_elapsed: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Destroy runs against dependency-violation churn, so it gets a
    /// longer leash than the apply path.
    pub fn destroy() -> Self {
        Self {
            max_attempts: 20,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            max_elapsed: Duration::from_secs(600),
        }
    }

    /// Delay before attempt `attempt + 1` (zero-based), capped.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis((delay as u64).min(self.max_delay.as_millis() as u64))
    }

    /// Whether another attempt fits the policy.
    pub fn allows(&self, attempt: u32, elapsed: Duration) -> bool {
        attempt + 1 < self.max_attempts && elapsed < self.max_elapsed
    }
}

/// Fixed-interval polling budget for readiness waits.
#[derive(Debug, Clone)]
pub struct WaitPolicy {
    pub max_attempts: usize,
    pub interval: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            interval: Duration::from_secs(2),
        }
    }
}

/// Poll `probe` until it yields a value or the policy is exhausted.
///
/// The probe reports `Ok(Some(v))` when the awaited condition holds,
/// `Ok(None)` to keep waiting. Probe errors abort the wait immediately.
pub async fn wait_until<T, F, Fut>(what: &str, policy: &WaitPolicy, mut probe: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    for attempt in 0..policy.max_attempts {
        if let Some(value) = probe().await? {
            debug!(what = %what, attempt, "Wait condition met");
            return Ok(value);
        }
        if attempt + 1 < policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    warn!(what = %what, attempts = policy.max_attempts, "Wait budget exhausted");
    Err(CloudError::WaitTimeout {
        what: what.to_string(),
        attempts: policy.max_attempts,
    })
}
