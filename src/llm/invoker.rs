//! One explicit retry policy for every caller that needs resilience against
//! the inference service, so no two layers grow divergent retry semantics.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use super::{CompletionClient, CompletionRequest};
use crate::error::InvocationError;

/// Backoff schedule and ceilings for [`Invoker::invoke`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub base_delay: Duration,
    /// Cap on any single inter-attempt delay.
    pub max_delay: Duration,
    /// Elapsed wall-clock budget across all attempts.
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_elapsed: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Delay before the k-th retry (1-indexed): `base_delay * 2^(k-1)`,
    /// capped at `max_delay`. Non-decreasing by construction.
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow((retry - 1).min(31));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Wraps a [`CompletionClient`] with retry and exponential backoff.
///
/// Every underlying failure is treated as retryable until the attempt
/// ceiling or the elapsed-time budget is reached, at which point the caller
/// gets a terminal [`InvocationError`] and decides whether to fail the run
/// or substitute a degraded result. Holds no per-run state; clones share the
/// client and are safe to use across concurrent runs.
#[derive(Clone)]
pub struct Invoker {
    client: Arc<dyn CompletionClient>,
    policy: RetryPolicy,
}

impl Invoker {
    pub fn new(client: Arc<dyn CompletionClient>, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Call the inference service, retrying per the policy.
    ///
    /// The backoff sleep suspends only the calling task; unrelated nodes keep
    /// running. Each attempt and its outcome is logged with structured fields.
    pub async fn invoke(&self, request: &CompletionRequest) -> Result<String, InvocationError> {
        let started = Instant::now();
        let mut last_error = String::new();

        for attempt in 1..=self.policy.max_attempts {
            if attempt > 1 {
                let delay = self.policy.delay_for(attempt - 1);
                let elapsed = started.elapsed();
                if elapsed + delay > self.policy.max_elapsed {
                    warn!(
                        attempts = attempt - 1,
                        elapsed_ms = elapsed.as_millis() as u64,
                        budget_ms = self.policy.max_elapsed.as_millis() as u64,
                        "retry time budget exhausted"
                    );
                    return Err(InvocationError::BudgetExhausted {
                        attempts: attempt - 1,
                        elapsed,
                        last_error,
                    });
                }
                info!(
                    attempt,
                    max_attempts = self.policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    model = %request.model,
                    "backing off before retry"
                );
                sleep(delay).await;
            }

            match self.client.complete(request).await {
                Ok(content) => {
                    info!(
                        attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        model = %request.model,
                        "inference call succeeded"
                    );
                    return Ok(content);
                }
                Err(err) => {
                    last_error = format!("{err:#}");
                    warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        model = %request.model,
                        error = %last_error,
                        "inference call failed"
                    );
                }
            }
        }

        Err(InvocationError::Exhausted {
            attempts: self.policy.max_attempts,
            last_error,
        })
    }
}
