// Bounded retry with exponential backoff for store writes.

use std::time::Duration;
use log::{debug, warn};

use crate::config::subsystems::StorageConfig;
use crate::error::{Error, Result};
use super::metrics::StorageMetrics;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: usize,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), base_delay }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.retry_attempts, config.retry_base_delay())
    }

    /// Runs `op` until it succeeds, fails permanently, or runs out of attempts.
    ///
    /// Only errors for which [`Error::is_transient`] holds are retried. Running
    /// out of attempts yields [`Error::RetryExhausted`].
    pub fn run<T, F>(&self, operation: &str, metrics: &StorageMetrics, mut op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    metrics.increment_retries();
                    debug!("{} failed (attempt {}), retrying: {}", operation, attempt, e);
                    self.apply_backoff(attempt);
                }
                Err(e) if e.is_transient() => {
                    metrics.increment_failed_ops();
                    warn!("{} failed after {} attempts: {}", operation, attempt, e);
                    return Err(Error::RetryExhausted {
                        attempts: attempt,
                        last: format!("{}: {}", operation, e),
                    });
                }
                Err(e) => {
                    metrics.increment_failed_ops();
                    return Err(e);
                }
            }
        }
    }

    fn apply_backoff(&self, attempt: usize) {
        let exp_factor = 2u32.saturating_pow(attempt as u32 - 1);
        let jitter = Duration::from_millis(fastrand::u64(0..10));
        let delay = self.base_delay.saturating_mul(exp_factor) + jitter;
        debug!("Retry {} - sleeping for {:?}", attempt, delay);
        std::thread::sleep(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn busy() -> Error {
        Error::Io(io::Error::from(io::ErrorKind::WouldBlock))
    }

    #[test]
    fn transient_failures_are_retried_until_success() {
        let metrics = StorageMetrics::new();
        let policy = RetryPolicy::new(5, Duration::from_millis(0));
        let mut calls = 0;
        let value = policy
            .run("append", &metrics, || {
                calls += 1;
                if calls < 3 { Err(busy()) } else { Ok(calls) }
            })
            .unwrap();
        assert_eq!(value, 3);
        assert_eq!(metrics.get_stats().retries, 2);
    }

    #[test]
    fn exhaustion_is_a_terminal_error() {
        let metrics = StorageMetrics::new();
        let policy = RetryPolicy::new(3, Duration::from_millis(0));
        let mut calls = 0;
        let err = policy
            .run("append", &metrics, || -> Result<()> {
                calls += 1;
                Err(busy())
            })
            .unwrap_err();
        assert_eq!(calls, 3);
        assert!(matches!(err, Error::RetryExhausted { attempts: 3, .. }));
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        let metrics = StorageMetrics::new();
        let policy = RetryPolicy::new(5, Duration::from_millis(0));
        let mut calls = 0;
        let err = policy
            .run("append", &metrics, || -> Result<()> {
                calls += 1;
                Err(Error::storage("schema mismatch"))
            })
            .unwrap_err();
        assert_eq!(calls, 1);
        assert!(matches!(err, Error::Storage(_)));
    }
}
