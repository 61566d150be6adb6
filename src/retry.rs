//! Bounded exponential backoff

use crate::{classify, OperationContext, ProviderError, ProviderResult, ReconcileObserver};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Retry policy for backend calls
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of calls, including the first
    pub max_attempts: u32,
    /// Delay before the first retry (milliseconds)
    pub initial_delay_millis: u64,
    /// Maximum delay cap (milliseconds)
    pub max_delay_millis: u64,
    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_millis: 500,
            max_delay_millis: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after a failed attempt (0-indexed): `min(initial * multiplier^attempt, max)`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let delay = self.initial_delay_millis as f64 * self.backoff_multiplier.powi(exponent);
        let capped = delay.min(self.max_delay_millis as f64);
        Duration::from_millis(capped as u64)
    }

    fn attempt_budget(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable category, or the
/// budget is spent.
///
/// - non-retryable failure: [`ProviderError::NonRetryable`] after one call
/// - budget spent: [`ProviderError::RetriesExhausted`] wrapping the last error
/// - cancelled during a call: [`ProviderError::Cancelled`]
/// - cancelled during a backoff sleep: [`ProviderError::Interrupted`] wrapping
///   the error that caused the sleep
pub async fn execute_with_retry<T, F, Fut>(
    ctx: &OperationContext,
    policy: &RetryPolicy,
    observer: &dyn ReconcileObserver,
    mut op: F,
) -> ProviderResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    let budget = policy.attempt_budget();
    let mut attempt: u32 = 0;

    loop {
        if ctx.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }

        let result = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(ProviderError::Cancelled),
            result = op() => result,
        };

        let error = match result {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        let category = classify(&error);
        if !category.is_retryable() {
            tracing::debug!(
                operation = %ctx.operation,
                correlation_id = ctx.correlation_id,
                category = %category,
                error = %error,
                "Non-retryable failure"
            );
            return Err(ProviderError::NonRetryable {
                category,
                source: Box::new(error),
            });
        }

        attempt += 1;
        if attempt >= budget {
            tracing::warn!(
                operation = %ctx.operation,
                correlation_id = ctx.correlation_id,
                attempts = attempt,
                error = %error,
                "Retry budget exhausted"
            );
            return Err(ProviderError::RetriesExhausted {
                attempts: attempt,
                source: Box::new(error),
            });
        }

        let delay = policy.delay_for_attempt(attempt - 1);
        observer.on_retry(ctx, attempt, delay, &error);

        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                return Err(ProviderError::Interrupted { source: Box::new(error) });
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
