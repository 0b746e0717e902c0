//! One retry policy for every transient-failure site.
//!
//! Callers report each attempt as [`Attempt::Done`] or [`Attempt::Again`];
//! the policy owns the waiting and the give-up decision. Fatal errors pass
//! straight through untouched.

use std::time::Duration;

use crate::Result;

const LOG_TARGET: &str = "     retry";

/// Outcome of a single attempt.
pub enum Attempt<T> {
    /// The operation finished; stop retrying.
    Done(T),
    /// Transient failure with a human-readable reason; try again.
    Again(String),
}

/// How often and how patiently an operation is retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: Option<u32>,
    delay: Duration,
}

impl RetryPolicy {
    /// Retry forever with a fixed delay between attempts.
    #[must_use]
    pub const fn unbounded(delay: Duration) -> Self {
        Self { max_attempts: None, delay }
    }

    /// Retry at most `max_attempts` times in total, with a fixed delay
    /// between attempts.
    #[must_use]
    pub const fn bounded(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            delay,
        }
    }

    /// Drive `op` until it completes, a fatal error surfaces, or the attempt
    /// budget runs out. `Ok(None)` means the budget was exhausted on
    /// transient failures.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Attempt<T>>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match op().await? {
                Attempt::Done(value) => return Ok(Some(value)),
                Attempt::Again(reason) => {
                    if let Some(max) = self.max_attempts
                        && attempt >= max
                    {
                        log::warn!(target: LOG_TARGET, "Giving up on {what} after {attempt} attempts: {reason}");
                        return Ok(None);
                    }

                    log::warn!(
                        target: LOG_TARGET,
                        "Attempt {attempt} at {what} failed ({reason}); retrying in {}s",
                        self.delay.as_secs()
                    );
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use ohno::app_err;

    use super::*;

    #[tokio::test]
    async fn succeeds_first_try_without_waiting() {
        let policy = RetryPolicy::bounded(3, Duration::from_secs(60));
        let outcome = policy.run("op", || async { Ok(Attempt::Done(7)) }).await.unwrap();
        assert_eq!(outcome, Some(7));
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "miri doesn't support the tokio runtime's timers")]
    async fn retries_until_done() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::unbounded(Duration::from_millis(5));

        let outcome = policy
            .run("op", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Ok(Attempt::Again("not yet".to_owned()))
                    } else {
                        Ok(Attempt::Done(n))
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(outcome, Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "miri doesn't support the tokio runtime's timers")]
    async fn bounded_budget_gives_up() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::bounded(3, Duration::from_millis(1));

        let outcome: Option<u32> = policy
            .run("op", || {
                let _ = calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(Attempt::Again("still down".to_owned())) }
            })
            .await
            .unwrap();

        assert_eq!(outcome, None);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_pass_through() {
        let policy = RetryPolicy::bounded(3, Duration::from_secs(60));
        let outcome: crate::Result<Option<u32>> = policy.run("op", || async { Err(app_err!("bad token")) }).await;
        assert!(outcome.is_err());
    }
}
