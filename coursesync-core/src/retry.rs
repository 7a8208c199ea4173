//! Bounded fixed-backoff retry for operations that can hit transient
//! contention (locked scratch files, flaky remote deletes).

use std::thread::sleep;
use std::time::Duration;

/// How many times to try and how long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// Local files held open by another process (editor previews, indexers).
    pub const LOCKED_FILE: RetryPolicy = RetryPolicy {
        attempts: 5,
        delay: Duration::from_millis(500),
    };

    /// Remote deletions during pruning.
    pub const REMOTE_DELETE: RetryPolicy = RetryPolicy {
        attempts: 3,
        delay: Duration::from_millis(500),
    };

    pub const fn immediate(attempts: u32) -> Self {
        RetryPolicy {
            attempts,
            delay: Duration::ZERO,
        }
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// policy's attempts are used up. The last error is returned.
pub fn retry<T, E>(
    policy: RetryPolicy,
    is_transient: impl Fn(&E) -> bool,
    mut op: impl FnMut() -> Result<T, E>,
) -> Result<T, E> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts && is_transient(&err) => {
                tracing::debug!(attempt, attempts, "transient failure, retrying");
                if !policy.delay.is_zero() {
                    sleep(policy.delay);
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn succeeds_after_transient_failures() {
        let mut calls = 0;
        let result: Result<u32, &str> = retry(RetryPolicy::immediate(3), |_| true, || {
            calls += 1;
            if calls < 3 {
                Err("locked")
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result, Ok(3));
    }

    #[test]
    fn gives_up_after_attempts() {
        let mut calls = 0;
        let result: Result<(), &str> = retry(RetryPolicy::immediate(4), |_| true, || {
            calls += 1;
            Err("locked")
        });
        assert_eq!(result, Err("locked"));
        assert_eq!(calls, 4);
    }

    #[test]
    fn permanent_error_is_not_retried() {
        let mut calls = 0;
        let result: Result<(), &str> = retry(RetryPolicy::immediate(5), |e| *e == "locked", || {
            calls += 1;
            Err("denied")
        });
        assert_eq!(result, Err("denied"));
        assert_eq!(calls, 1);
    }
}
