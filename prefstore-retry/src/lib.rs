//! Bounded retry logic for Prefstore file coordination
//!
//! Contention on the instance lock file is short-lived (another instance is in the
//! middle of starting up or shutting down), so retries use a fixed pause and a hard
//! attempt cap instead of an open-ended exponential schedule.

use backoff::backoff::Backoff;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Common retry error types
#[derive(Error, Debug)]
pub enum RetryError {
    #[error("Operation '{operation}' failed after {attempts} attempts: {source}")]
    MaxRetriesExceeded {
        operation: &'static str,
        attempts: usize,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Transient error in '{operation}': {source}")]
    Transient {
        operation: &'static str,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Permanent error in '{operation}': {source}")]
    Permanent {
        operation: &'static str,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Result type for retry operations
pub type RetryResult<T> = std::result::Result<T, RetryError>;

/// How often and how patiently an operation is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: usize,
    /// Pause between two consecutive attempts
    pub pause: Duration,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: usize, pause: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            pause,
        }
    }

    /// A single attempt, no retries
    pub fn once() -> Self {
        Self::fixed(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(5, Duration::from_millis(200))
    }
}

/// Constant pause that gives up once the retry budget is spent
struct BoundedConstant {
    pause: Duration,
    retries: usize,
    remaining: usize,
}

impl BoundedConstant {
    fn new(policy: &RetryPolicy) -> Self {
        let retries = policy.max_attempts.saturating_sub(1);
        Self {
            pause: policy.pause,
            retries,
            remaining: retries,
        }
    }
}

impl Backoff for BoundedConstant {
    fn reset(&mut self) {
        self.remaining = self.retries;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.pause)
    }
}

/// Execute a blocking operation, retrying transient failures with a fixed pause
///
/// The closure receives the 1-based attempt number. A `RetryError::Permanent`
/// stops immediately and is returned as-is; any other error is retried until the
/// policy's attempt budget runs out, which yields `RetryError::MaxRetriesExceeded`.
pub fn with_fixed_retry<F, T>(op_name: &'static str, policy: &RetryPolicy, mut f: F) -> RetryResult<T>
where
    F: FnMut(usize) -> RetryResult<T>,
{
    let mut attempt = 0usize;

    let operation = || {
        attempt += 1;
        debug!("Attempting operation '{}' (attempt {})", op_name, attempt);

        match f(attempt) {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        "Operation '{}' succeeded after {} attempts",
                        op_name, attempt
                    );
                }
                Ok(result)
            }
            Err(err @ RetryError::Permanent { .. }) => Err(backoff::Error::permanent(err)),
            Err(err) => Err(backoff::Error::transient(err)),
        }
    };

    let notify = |err: RetryError, pause: Duration| {
        warn!(
            "Operation '{}' failed, retrying in {:?}: {}",
            op_name, pause, err
        );
    };

    match backoff::retry_notify(BoundedConstant::new(policy), operation, notify) {
        Ok(result) => Ok(result),
        Err(backoff::Error::Permanent(err)) => {
            warn!("Operation '{}' failed permanently: {}", op_name, err);
            Err(err)
        }
        Err(backoff::Error::Transient { err, .. }) => Err(RetryError::MaxRetriesExceeded {
            operation: op_name,
            attempts: policy.max_attempts,
            source: Box::new(err),
        }),
    }
}

/// Trait for categorizing errors as transient or permanent
pub trait RetryableError {
    /// Returns true if the error is transient and the operation should be retried
    fn is_transient(&self) -> bool;

    /// Returns true if the error is permanent and retries should stop
    fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

impl RetryableError for std::io::Error {
    fn is_transient(&self) -> bool {
        use std::io::ErrorKind;
        matches!(
            self.kind(),
            ErrorKind::WouldBlock
                | ErrorKind::Interrupted
                | ErrorKind::NotFound
                | ErrorKind::UnexpectedEof
                | ErrorKind::TimedOut
        )
    }
}

/// Helper macro for creating transient errors
#[macro_export]
macro_rules! transient_error {
    ($op:expr, $err:expr) => {
        $crate::RetryError::Transient {
            operation: $op,
            source: Box::new($err),
        }
    };
}

/// Helper macro for creating permanent errors
#[macro_export]
macro_rules! permanent_error {
    ($op:expr, $err:expr) => {
        $crate::RetryError::Permanent {
            operation: $op,
            source: Box::new($err),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn quick(attempts: usize) -> RetryPolicy {
        RetryPolicy::fixed(attempts, Duration::from_millis(1))
    }

    #[test]
    fn test_successful_operation() {
        let result = with_fixed_retry("test_op", &quick(3), |_attempt| Ok("success"));
        assert_eq!(result.unwrap(), "success");
    }

    #[test]
    fn test_transient_failure_then_success() {
        let mut calls = 0;
        let result = with_fixed_retry("test_op", &quick(5), |attempt| {
            calls += 1;
            if attempt < 3 {
                Err(transient_error!(
                    "test_op",
                    io::Error::new(io::ErrorKind::WouldBlock, "locked")
                ))
            } else {
                Ok(attempt)
            }
        });

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_budget_exhausted() {
        let mut calls = 0;
        let result: RetryResult<()> = with_fixed_retry("test_op", &quick(4), |_attempt| {
            calls += 1;
            Err(transient_error!(
                "test_op",
                io::Error::new(io::ErrorKind::WouldBlock, "still locked")
            ))
        });

        assert_eq!(calls, 4);
        match result {
            Err(RetryError::MaxRetriesExceeded { attempts, .. }) => assert_eq!(attempts, 4),
            other => panic!("expected MaxRetriesExceeded, got {other:?}"),
        }
    }

    #[test]
    fn test_permanent_failure_stops_immediately() {
        let mut calls = 0;
        let result: RetryResult<()> = with_fixed_retry("test_op", &quick(5), |_attempt| {
            calls += 1;
            Err(permanent_error!(
                "test_op",
                io::Error::new(io::ErrorKind::PermissionDenied, "permission denied")
            ))
        });

        assert_eq!(calls, 1);
        assert!(matches!(result, Err(RetryError::Permanent { .. })));
    }

    #[test]
    fn test_once_policy_never_retries() {
        let mut calls = 0;
        let result: RetryResult<()> = with_fixed_retry("test_op", &RetryPolicy::once(), |_| {
            calls += 1;
            Err(transient_error!("test_op", io::Error::other("nope")))
        });

        assert_eq!(calls, 1);
        assert!(result.is_err());
    }

    #[test]
    fn test_io_error_classification() {
        assert!(io::Error::new(io::ErrorKind::WouldBlock, "x").is_transient());
        assert!(io::Error::new(io::ErrorKind::PermissionDenied, "x").is_permanent());
    }
}
