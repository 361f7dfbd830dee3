//! Bounded-retry combinator used by every lifecycle operation.

use crate::CoreError;
use std::fmt::Display;
use std::time::Duration;

/// Delay growth between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    /// Delay multiplied by the attempt number just failed.
    Linear,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
            backoff: Backoff::Linear,
        }
    }
}

impl RetryPolicy {
    /// Zero-delay variant for tests and dry runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay: Duration::ZERO,
            backoff: Backoff::Fixed,
        }
    }

    fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Linear => self.delay * attempt,
        }
    }
}

/// Ephemeral record of one failed attempt, used for logging and the
/// retry/abort decision. Never persisted.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub operation: String,
    pub attempt: u32,
    pub max_attempts: u32,
    pub delay: Duration,
    pub last_error: String,
}

/// Run `op` up to `policy.max_attempts` times. Attempts are not
/// cancellable mid-flight; a blocking call either returns or the
/// underlying tool's own timeout fires. Exhaustion maps to
/// [`CoreError::OperationFailed`] carrying the final error text.
pub fn with_retry<T, E, F>(policy: RetryPolicy, operation: &str, mut op: F) -> Result<T, CoreError>
where
    E: Display,
    F: FnMut() -> Result<T, E>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts => {
                let record = AttemptRecord {
                    operation: operation.to_owned(),
                    attempt,
                    max_attempts,
                    delay: policy.delay_after(attempt),
                    last_error: err.to_string(),
                };
                tracing::warn!(
                    "{} attempt {}/{} failed: {} (retrying in {:?})",
                    record.operation,
                    record.attempt,
                    record.max_attempts,
                    record.last_error,
                    record.delay
                );
                if !record.delay.is_zero() {
                    std::thread::sleep(record.delay);
                }
            }
            Err(err) => {
                return Err(CoreError::OperationFailed {
                    operation: operation.to_owned(),
                    attempts: attempt,
                    last_error: err.to_string(),
                });
            }
        }
    }
}
