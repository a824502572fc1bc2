/// Bounded retry with exponential backoff for transient store failures
use crate::config::StorageConfig;
use crate::error::DirectoryResult;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Add random jitter to backoff (±30%)
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            max_attempts: config.retry_attempts.max(1),
            initial_backoff: Duration::from_millis(config.retry_backoff_ms),
            ..Default::default()
        }
    }

    /// Single attempt, no waiting
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter: false,
        }
    }
}

/// Run `f` until it succeeds, fails with a non-transient error, or the
/// attempt budget is spent. Only `StoreUnavailable` is retried.
pub async fn with_store_retry<F, Fut, T>(policy: &RetryPolicy, operation: &str, mut f: F) -> DirectoryResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DirectoryResult<T>>,
{
    let mut attempt = 1;
    let mut backoff = policy.initial_backoff;

    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = calculate_backoff(backoff, policy.jitter);
                warn!(
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "Transient store failure, retrying in {:?}",
                    delay
                );

                tokio::time::sleep(delay).await;

                attempt += 1;
                backoff = (backoff * 2).min(policy.max_backoff);
            }
            Err(e) => return Err(e),
        }
    }
}

fn calculate_backoff(base: Duration, jitter: bool) -> Duration {
    if jitter && !base.is_zero() {
        let jitter_factor = 1.0 + rand::thread_rng().gen_range(-0.3..0.3);
        Duration::from_millis((base.as_millis() as f64 * jitter_factor) as u64)
    } else {
        base
    }
}
