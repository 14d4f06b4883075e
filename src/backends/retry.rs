//! Retry configuration, delay calculation, and the retry executor.
//!
//! [`RetryExecutor`] wraps one remote operation with bounded exponential
//! backoff. Each failure is classified as transient (retried) or fatal
//! (returned immediately). Running out of attempts yields
//! [`MuninnError::RetriesExhausted`], so callers can tell "gave up after N
//! tries" apart from "first try failed fatally".

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::ErrorClass;
use crate::telemetry;
use crate::{MuninnError, Result};

/// Configuration for retry behaviour on transient errors.
///
/// Uses exponential backoff capped at `max_delay`:
///
/// ```rust
/// # use muninn::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(5)
///     .initial_delay(Duration::from_millis(200));
/// assert_eq!(config.delay_for_attempt(2), Duration::from_millis(800));
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial request).
    /// 1 = no retry. Default: 3.
    pub max_attempts: u32,
    /// Base delay before the first retry. Default: 500ms.
    pub initial_delay: Duration,
    /// Maximum delay between retries (caps exponential growth). Default: 30s.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set maximum attempts (including the initial request). Clamped to ≥ 1.
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n.max(1);
        self
    }

    /// Set the base delay before the first retry.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay between retries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Backoff before retry number `attempt + 1` (0-indexed).
    ///
    /// `initial_delay * 2^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_delay)
    }

    /// Backoff honouring a backend `retry_after` hint, still capped at
    /// `max_delay`.
    pub fn effective_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        retry_after
            .map(|hint| hint.min(self.max_delay))
            .unwrap_or_else(|| self.delay_for_attempt(attempt))
    }
}

/// Runs async operations under a [`RetryConfig`].
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `f`, retrying failures that [`MuninnError::classify()`] marks
    /// transient.
    pub async fn run<F, Fut, T>(&self, backend: &str, operation: &str, f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_classified(backend, operation, MuninnError::classify, f)
            .await
    }

    /// Run `f` with a caller-supplied failure classifier.
    ///
    /// Fatal failures are returned as-is after one call. Transient failures
    /// are retried after `delay_for_attempt(n)` (or the backend's
    /// `retry_after` hint) until `max_attempts` calls have been made, then
    /// the last one is wrapped in [`MuninnError::RetriesExhausted`].
    pub async fn run_classified<F, Fut, T, C>(
        &self,
        backend: &str,
        operation: &str,
        classify: C,
        mut f: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        C: Fn(&MuninnError) -> ErrorClass,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            let err = match f().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            if classify(&err) == ErrorClass::Fatal {
                return Err(err);
            }

            attempt += 1;
            if attempt >= max_attempts {
                return Err(MuninnError::RetriesExhausted {
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            metrics::counter!(telemetry::RETRIES_TOTAL,
                "backend" => backend.to_owned(),
                "operation" => operation.to_owned(),
            )
            .increment(1);
            let delay = self.config.effective_delay(attempt - 1, err.retry_after());
            warn!(
                backend,
                operation,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying after transient error"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let config = RetryConfig::new()
            .initial_delay(Duration::from_millis(100))
            .max_delay(Duration::from_millis(500));
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(500));
        assert_eq!(config.delay_for_attempt(40), Duration::from_millis(500));
    }

    #[test]
    fn retry_after_hint_wins_but_is_capped() {
        let config = RetryConfig::new().max_delay(Duration::from_secs(10));
        assert_eq!(
            config.effective_delay(0, Some(Duration::from_secs(3))),
            Duration::from_secs(3)
        );
        assert_eq!(
            config.effective_delay(0, Some(Duration::from_secs(60))),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn zero_attempts_clamped_to_one() {
        assert_eq!(RetryConfig::new().max_attempts(0).max_attempts, 1);
    }
}
