//! Bounded retry with exponential backoff for transient provider errors.
//!
//! Classification happens at the adapter boundary; this wrapper only asks the
//! error whether it is transient. Permanent input errors, conflicts, and
//! internal failures pass through on the first attempt.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-based): initial * 2^(attempt-1),
    /// capped at max_backoff.
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Run `op` until it succeeds, fails permanently, or exhausts the policy's
/// attempt budget.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> PipelineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PipelineResult<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_err: Option<PipelineError> = None;

    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < attempts => {
                let delay = policy.backoff(attempt);
                warn!(
                    "{what} attempt {attempt}/{attempts} failed ({err}), retrying in {:?}",
                    delay
                );
                sleep(delay).await;
                last_err = Some(err);
            }
            Err(err) => return Err(err),
        }
    }

    // Unreachable with attempts >= 1, but keep the compiler honest.
    Err(last_err.unwrap_or_else(|| PipelineError::transient("retry budget exhausted")))
}
