//! Bounded retry with exponential backoff for storage I/O.

use std::thread;
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VdbError};

/// How often and how patiently a failing I/O operation is retried before
/// the error is surfaced as [`VdbError::StorageUnavailable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Zero is treated as one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Upper bound on any single delay, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    10
}

fn default_max_backoff_ms() -> u64 {
    200
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// attempts are used up.
    ///
    /// Only I/O errors are retried. `recover` runs between attempts so the
    /// caller can undo a partial write before trying again.
    pub fn run<T, F, R>(&self, what: &str, mut op: F, mut recover: R) -> Result<T>
    where
        F: FnMut() -> Result<T>,
        R: FnMut() -> Result<()>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err @ (VdbError::Io(_) | VdbError::StorageUnavailable(_))) => {
                    if attempt >= attempts {
                        return Err(VdbError::storage_unavailable(format!(
                            "{what} failed after {attempts} attempt(s): {err}"
                        )));
                    }
                    warn!("{what} failed (attempt {attempt}/{attempts}): {err}");
                    thread::sleep(self.backoff(attempt));
                    if let Err(recover_err) = recover() {
                        return Err(VdbError::storage_unavailable(format!(
                            "{what} failed and could not be rolled back: {recover_err}"
                        )));
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    #[test]
    fn test_succeeds_after_transient_failures() {
        let mut calls = 0;
        let mut recovered = 0;
        let value = fast_policy(3)
            .run(
                "append",
                || {
                    calls += 1;
                    if calls < 3 {
                        Err(VdbError::Io(io::Error::other("flaky")))
                    } else {
                        Ok(42)
                    }
                },
                || {
                    recovered += 1;
                    Ok(())
                },
            )
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(calls, 3);
        assert_eq!(recovered, 2);
    }

    #[test]
    fn test_gives_up_with_storage_unavailable() {
        let err = fast_policy(2)
            .run::<(), _, _>(
                "append",
                || Err(VdbError::Io(io::Error::other("disk gone"))),
                || Ok(()),
            )
            .unwrap_err();
        assert!(matches!(err, VdbError::StorageUnavailable(_)));
    }

    #[test]
    fn test_does_not_retry_input_errors() {
        let mut calls = 0;
        let err = fast_policy(5)
            .run::<(), _, _>(
                "append",
                || {
                    calls += 1;
                    Err(VdbError::invalid_argument("bad"))
                },
                || Ok(()),
            )
            .unwrap_err();
        assert!(matches!(err, VdbError::InvalidArgument(_)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff_ms: 10,
            max_backoff_ms: 50,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(10));
        assert_eq!(policy.backoff(2), Duration::from_millis(20));
        assert_eq!(policy.backoff(4), Duration::from_millis(50));
        assert_eq!(policy.backoff(40), Duration::from_millis(50));
    }
}
