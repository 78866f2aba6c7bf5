//! Retry Policy
//!
//! Exponential-backoff retry for batch processing. Retries run as an explicit
//! loop with an attempt counter rather than by recursive self-call, so a large
//! retry budget cannot grow the call stack. The backoff wait parks only the
//! calling consumer's thread and is interrupted promptly by a shutdown signal.

use crate::consumer::processor::ProcessingError;
use crate::consumer::shutdown::ShutdownSignal;
use std::time::Duration;
use tracing::warn;

/// Terminal outcome of a retried unit of work
#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    #[error("retries exhausted after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("non-retryable failure: {0}")]
    NonRetryable(#[source] anyhow::Error),

    #[error("interrupted by shutdown during backoff")]
    Interrupted,
}

impl RetryError {
    /// The last observed error message, for dead-letter diagnostics
    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// Exponential-backoff retry policy
///
/// Attempt `n` (zero-based) that fails transiently waits
/// `base_delay * 2^n` before the next attempt, up to `max_retries` waits.
/// With `max_retries = 2` and `base_delay = 0.5s` the attempts land at
/// t ≈ 0, 0.5s and 1.5s.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// Create a new retry policy
    ///
    /// # Arguments
    /// * `max_retries` - Number of backoff retries after the initial attempt
    /// * `base_delay` - Delay before the first retry; doubles each attempt
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// The configured retry budget
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Backoff delay before retry number `attempt` (zero-based)
    ///
    /// Computed in floating-point seconds; the config layer caps the retry
    /// budget so this cannot overflow a `Duration`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let secs = self.base_delay.as_secs_f64() * 2f64.powi(attempt as i32);
        Duration::from_secs_f64(secs)
    }

    /// Execute `work`, retrying transient failures with exponential backoff
    ///
    /// The first attempt runs immediately. Transient failures wait
    /// `backoff_delay(attempt)` and retry until the budget is exhausted;
    /// permanent failures short-circuit. A shutdown trigger during a backoff
    /// wait aborts with `RetryError::Interrupted` without consuming further
    /// attempts.
    ///
    /// # Errors
    /// Never panics or escalates: the terminal failure is returned to the
    /// caller, which decides about dead-lettering.
    pub fn execute<F>(&self, mut work: F, shutdown: &ShutdownSignal) -> Result<(), RetryError>
    where
        F: FnMut() -> Result<(), ProcessingError>,
    {
        let mut attempt = 0u32;
        loop {
            match work() {
                Ok(()) => return Ok(()),
                Err(ProcessingError::Permanent(source)) => {
                    return Err(RetryError::NonRetryable(source));
                }
                Err(ProcessingError::Transient(source)) => {
                    if attempt >= self.max_retries {
                        return Err(RetryError::Exhausted {
                            attempts: attempt + 1,
                            source,
                        });
                    }
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %source,
                        "transient failure, backing off before retry"
                    );
                    if shutdown.wait_timeout(delay) {
                        return Err(RetryError::Interrupted);
                    }
                    attempt += 1;
                }
            }
        }
    }
}
