// Retry Helper
// Bounded exponential backoff around a capability call, with per-attempt timeout and cancellation

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::services::capability::CapabilityError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts = max_retries + 1
    pub max_retries: u32,
    pub backoff_unit: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_unit: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Wait before the retry following attempt `attempt` (0-based): unit * 2^attempt
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_unit
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OperationFailure {
    #[error("{0}")]
    Terminal(CapabilityError),
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: CapabilityError },
    #[error("cancelled")]
    Cancelled,
}

/// Run `op` until it succeeds, fails terminally, runs out of retries or is cancelled.
///
/// `op` receives the 0-based attempt number. A timed-out attempt counts as a
/// transient failure.
pub async fn retry_with_backoff<T, F, Fut>(
    label: &str,
    policy: RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, OperationFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, CapabilityError>>,
{
    let mut attempt: u32 = 0;
    loop {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(OperationFailure::Cancelled),
            res = tokio::time::timeout(policy.attempt_timeout, op(attempt)) => res,
        };

        let err = match outcome {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) if e.is_terminal() => return Err(OperationFailure::Terminal(e)),
            Ok(Err(e)) => e,
            Err(_) => CapabilityError::EvaluationFailed(format!(
                "timed out after {}ms",
                policy.attempt_timeout.as_millis()
            )),
        };

        if attempt >= policy.max_retries {
            return Err(OperationFailure::Exhausted {
                attempts: attempt + 1,
                last: err,
            });
        }

        let delay = policy.backoff_delay(attempt);
        warn!(
            "[RETRY] {} attempt {} failed: {}; retrying in {}ms",
            label,
            attempt + 1,
            err,
            delay.as_millis()
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(OperationFailure::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}
