//! Timeout, cancellation and retry wrappers for external calls.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::CapabilityError;

/// Runs `future` under an independent deadline and the query's cancellation token.
///
/// Cancellation wins over completion when both are ready, so a cancelled query
/// never yields a result produced after the signal.
pub async fn guard<T, F>(
    timeout: Duration,
    cancel: &CancellationToken,
    future: F,
) -> Result<T, CapabilityError>
where
    F: Future<Output = Result<T, CapabilityError>>,
{
    if cancel.is_cancelled() {
        return Err(CapabilityError::Cancelled);
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CapabilityError::Cancelled),
        result = tokio::time::timeout(timeout, future) => match result {
            Ok(inner) => inner,
            Err(_) => Err(CapabilityError::Timeout { after: timeout }),
        },
    }
}

/// Bounded retry of transient failures with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: usize,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Backoff before retry number `attempt` (1-based), capped at 32x the base.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let capped = attempt.saturating_sub(1).min(5) as u32;
        self.base_backoff * (1 << capped)
    }
}

/// Calls `operation` until it succeeds, fails non-transiently, or the retry
/// budget is spent.
pub async fn retry_transient<T, F, Fut>(
    policy: RetryPolicy,
    what: &str,
    mut operation: F,
) -> Result<T, CapabilityError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CapabilityError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                let backoff = policy.backoff(attempt);
                warn!(
                    "{what} failed ({e}), retry {attempt}/{} in {}ms",
                    policy.max_retries,
                    backoff.as_millis()
                );
                tokio::time::sleep(backoff).await;
            }
            other => return other,
        }
    }
}
