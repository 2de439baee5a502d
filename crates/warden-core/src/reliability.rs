//! Retry with backoff for ledger queries.
//!
//! Tracker reads and the guardian's startup sweep retry transient failures
//! (`ChainUnavailable`) through [`RetryPolicy`]. Cancellation submissions are
//! never retried here; they are bounded by the operation's due time instead.

use crate::WardenError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Backoff strategy for retry delays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// Linear increase: delay * attempt
    Linear,
    /// Exponential increase: delay * 2^attempt
    Exponential,
    /// Exponential with up to 10% random jitter
    ExponentialWithJitter,
}

impl BackoffStrategy {
    /// Delay before retry number `attempt` (0 = first retry), capped at `max_delay`
    pub fn calculate_delay(
        &self,
        attempt: u32,
        initial_delay: Duration,
        max_delay: Duration,
    ) -> Duration {
        use rand::Rng;

        let delay = match self {
            BackoffStrategy::Fixed => initial_delay,
            BackoffStrategy::Linear => initial_delay.saturating_mul(attempt.saturating_add(1)),
            BackoffStrategy::Exponential => {
                initial_delay.saturating_mul(2u32.saturating_pow(attempt))
            }
            BackoffStrategy::ExponentialWithJitter => {
                let base_delay = initial_delay.saturating_mul(2u32.saturating_pow(attempt));
                let jitter =
                    (base_delay.as_millis() as f64 * 0.1 * rand::thread_rng().gen::<f64>()) as u64;
                base_delay.saturating_add(Duration::from_millis(jitter))
            }
        };

        delay.min(max_delay)
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt (0 = no retries)
    pub max_attempts: u32,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Backoff strategy to use
    pub strategy: BackoffStrategy,
    /// Whether to add jitter to delays
    pub jitter: bool,
    /// Timeout for individual attempts
    pub timeout: Option<Duration>,
}

impl RetryPolicy {
    /// Exponential backoff, 3 retries, 100ms initial delay
    pub fn exponential() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            strategy: BackoffStrategy::Exponential,
            jitter: false,
            timeout: None,
        }
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            ..Self::exponential()
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, enable: bool) -> Self {
        self.jitter = enable;
        if enable {
            self.strategy = BackoffStrategy::ExponentialWithJitter;
        }
        self
    }

    /// Set timeout for individual attempts
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Calculate delay for a specific attempt
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let strategy = if self.jitter {
            BackoffStrategy::ExponentialWithJitter
        } else {
            self.strategy
        };

        strategy.calculate_delay(attempt, self.initial_delay, self.max_delay)
    }

    /// Run `operation`, retrying only errors for which [`WardenError::is_transient`] holds.
    ///
    /// An attempt exceeding `timeout` counts as a transient `ChainUnavailable`.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, WardenError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, WardenError>>,
    {
        let mut attempt = 0;

        loop {
            let outcome = match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, operation()).await {
                    Ok(result) => result,
                    Err(_) => Err(WardenError::chain_unavailable(format!(
                        "attempt timed out after {limit:?}"
                    ))),
                },
                None => operation().await,
            };

            match outcome {
                Ok(result) => return Ok(result),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.calculate_delay(attempt);
                    tracing::debug!(attempt, ?delay, error = %err, "retrying after transient failure");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_strategies() {
        let initial = Duration::from_millis(100);
        let max = Duration::from_secs(10);

        assert_eq!(
            BackoffStrategy::Fixed.calculate_delay(5, initial, max),
            Duration::from_millis(100)
        );
        assert_eq!(
            BackoffStrategy::Linear.calculate_delay(2, initial, max),
            Duration::from_millis(300)
        );
        assert_eq!(
            BackoffStrategy::Exponential.calculate_delay(3, initial, max),
            Duration::from_millis(800)
        );
        assert_eq!(
            BackoffStrategy::Exponential.calculate_delay(20, initial, max),
            max
        );

        let jittered = BackoffStrategy::ExponentialWithJitter.calculate_delay(1, initial, max);
        assert!(jittered >= Duration::from_millis(200));
        assert!(jittered <= Duration::from_millis(220));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::exponential().with_max_attempts(3);

        let result = policy
            .execute(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(WardenError::chain_unavailable("node restarting"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::exponential().with_max_attempts(5);

        let result: Result<(), _> = policy
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(WardenError::invalid("bad filter")) }
            })
            .await;

        assert!(matches!(result, Err(WardenError::Invalid { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::exponential().with_max_attempts(2);

        let result: Result<(), _> = policy
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(WardenError::chain_unavailable("down")) }
            })
            .await;

        assert!(matches!(result, Err(WardenError::ChainUnavailable { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
