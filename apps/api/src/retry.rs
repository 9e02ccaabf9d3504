//! Bounded retry with exponential backoff.
//!
//! Wraps a single fallible async operation (in practice the evaluator call)
//! with an explicit policy struct. Errors classify themselves as retryable
//! or fatal: only retryable errors consume attempts, a fatal error aborts
//! on the spot. Each call site gets its own fresh budget.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::warn;

/// Split of an underlying error into the two classes the controller cares
/// about. Timeout, rate-limit and transient network failures are retryable;
/// auth failures, invalid requests and malformed results are fatal.
pub trait ClassifyError {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, Error)]
pub enum RetryError<E: std::error::Error> {
    #[error("retries exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("{0}")]
    Fatal(E),
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before attempt k (k >= 2) is `base_delay * 2^(k-2)`.
    pub base_delay: Duration,
    /// Adds up to 50% random extra delay to avoid synchronized retries.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Backoff before the given 1-based attempt number. Attempt 1 runs
    /// immediately.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let backoff = self.base_delay * 2u32.saturating_pow(attempt - 2);
        if self.jitter {
            let factor: f64 = rand::thread_rng().gen_range(1.0..1.5);
            backoff.mul_f64(factor)
        } else {
            backoff
        }
    }

    /// Runs `op` until it succeeds, fails fatally, or the attempt budget is
    /// spent. `op_name` labels the call site in logs. A zero `max_attempts`
    /// is treated as one attempt: the operation always runs at least once.
    pub async fn run<T, E, F, Fut>(&self, op_name: &str, mut op: F) -> Result<T, RetryError<E>>
    where
        E: std::error::Error + ClassifyError,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let budget = self.max_attempts.max(1);
        let mut last: Option<E> = None;

        for attempt in 1..=budget {
            let delay = self.delay_before(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    warn!("{op_name}: attempt {attempt}/{budget} failed with retryable error: {e}");
                    last = Some(e);
                }
                Err(e) => {
                    warn!("{op_name}: fatal error on attempt {attempt}, not retrying: {e}");
                    return Err(RetryError::Fatal(e));
                }
            }
        }

        Err(RetryError::Exhausted {
            attempts: budget,
            last: last.expect("at least one attempt ran"),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[derive(Debug, Error)]
    enum StubError {
        #[error("transient")]
        Transient,
        #[error("fatal")]
        Fatal,
    }

    impl ClassifyError for StubError {
        fn is_retryable(&self) -> bool {
            matches!(self, StubError::Transient)
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            jitter: false,
        }
    }

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let policy = policy();
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_secs(1));
        assert_eq!(policy.delay_before(3), Duration::from_secs(2));
        assert_eq!(policy.delay_before(4), Duration::from_secs(4));
        assert_eq!(policy.delay_before(5), Duration::from_secs(8));
    }

    #[test]
    fn test_jitter_stays_within_band() {
        let policy = RetryPolicy {
            jitter: true,
            ..policy()
        };
        for _ in 0..32 {
            let d = policy.delay_before(3);
            assert!(d >= Duration::from_secs(2));
            assert!(d < Duration::from_secs(3));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = policy()
            .run("stub", || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 5 {
                        Err(StubError::Transient)
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        // Fails 4 times then succeeds on the final budgeted attempt.
        assert_eq!(result.unwrap(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_budget_on_persistent_transient_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy()
            .run("stub", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(StubError::Transient) }
            })
            .await;
        match result.unwrap_err() {
            RetryError::Exhausted { attempts, .. } => assert_eq!(attempts, 5),
            other => panic!("expected Exhausted, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_zero_attempt_budget_still_runs_once() {
        let policy = RetryPolicy {
            max_attempts: 0,
            ..policy()
        };

        let calls = AtomicU32::new(0);
        let result: Result<u32, RetryError<StubError>> = policy
            .run("stub", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(7) }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // A failing operation under a zero budget exhausts after that one
        // attempt instead of panicking.
        let result: Result<(), _> = policy
            .run("stub", || async { Err(StubError::Transient) })
            .await;
        match result.unwrap_err() {
            RetryError::Exhausted { attempts, .. } => assert_eq!(attempts, 1),
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_short_circuits() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy()
            .run("stub", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(StubError::Fatal) }
            })
            .await;
        assert!(matches!(result.unwrap_err(), RetryError::Fatal(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
