//! Bounded retry with backoff for transient store failures
//!
//! Applies to one-shot reads and writes only. Subscriptions are never
//! retried here; stream reconnection is the backend's own concern.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::debug;

use crate::error::Error;

/// Retry policy for one-shot store operations
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Jitter as a fraction of the computed delay, `0.0..=1.0`
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 3,
            initial_delay: Duration::from_millis(400),
            max_delay: Duration::from_secs(4),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        RetryPolicy {
            attempts: 1,
            ..RetryPolicy::default()
        }
    }

    pub fn with_attempts(attempts: u32) -> Self {
        RetryPolicy {
            attempts: attempts.max(1),
            ..RetryPolicy::default()
        }
    }

    fn delay_at(&self, attempt: u32) -> Duration {
        let exp = attempt.min(16);
        let base = self.initial_delay.saturating_mul(1u32 << exp);
        let capped = base.min(self.max_delay);
        let offset = capped.as_secs_f64() * self.jitter * rand::thread_rng().gen_range(-1.0..=1.0);
        let jittered = (capped.as_secs_f64() + offset).max(0.0);
        Duration::from_secs_f64(jittered)
    }
}

/// Run `op`, retrying transient store failures per the policy
pub async fn retry_async<F, Fut, T>(policy: &RetryPolicy, mut op: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= policy.attempts || !err.is_transient() {
                    return Err(err);
                }
                let delay = policy.delay_at(attempt - 1);
                debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying store operation"
                );
                sleep(delay).await;
            }
        }
    }
}
