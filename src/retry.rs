//! Timeouts and bounded retries for network-bound calls.
//!
//! Every remote call goes through [`with_timeout`] so a stalled service
//! surfaces as [`ServiceError::Timeout`] instead of hanging the caller.
//! Idempotent reads (embedding, vector search) additionally go through
//! [`with_retries`]; generation never does.
//!
//! Backoff doubles per attempt from `base_delay`, capped at `base_delay × 2^5`:
//! with the default 1s base that is 1s, 2s, 4s, 8s, 16s, 32s.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::ServiceError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Deadline for each individual attempt.
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, timeout: Duration) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_secs(1),
            timeout,
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << (attempt - 1).min(5))
    }
}

/// Run `fut`, failing with [`ServiceError::Timeout`] after `timeout`.
pub async fn with_timeout<T, F>(
    service: &str,
    timeout: Duration,
    fut: F,
) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ServiceError::Timeout {
            service: service.to_string(),
        }),
    }
}

/// Run `op` with a per-attempt timeout, retrying retryable failures.
///
/// Non-retryable errors (client errors, malformed responses) are returned
/// immediately. After `max_retries` retries the last error is returned.
pub async fn with_retries<T, F, Fut>(
    service: &str,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut attempt = 0u32;
    loop {
        if attempt > 0 {
            tokio::time::sleep(policy.backoff(attempt)).await;
        }

        match with_timeout(service, policy.timeout, op()).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                warn!(service, attempt, error = %e, "retrying request");
            }
            Err(e) => return Err(e),
        }
    }
}
