use std::time::Duration;

use rand::Rng;

use crate::config::CommitConfig;
use crate::error::StoreResult;

/// Bounded exponential backoff with jitter.
///
/// [`run`](RetryPolicy::run) retries only errors for which
/// [`StoreError::is_retryable`](crate::StoreError::is_retryable) holds, and
/// must only wrap idempotent operations: reads and writes of immutable
/// objects. Reference updates are never retried through it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts in total, including the first.
    pub max_attempts: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            min_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn from_config(config: &CommitConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            min_backoff: config.retry_backoff_min(),
            max_backoff: config.retry_backoff_max(),
        }
    }

    /// Sleep before retry number `attempt` (1-based): a random duration in
    /// `[b/2, b]` where `b = min_backoff * 2^(attempt-1)`, capped at
    /// `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        let ceiling = self.min_backoff.saturating_mul(factor).min(self.max_backoff);
        let floor = ceiling / 2;
        if ceiling <= floor {
            return ceiling;
        }
        rand::thread_rng().gen_range(floor..=ceiling)
    }

    /// Run `op`, retrying transient failures.
    pub fn run<T>(&self, operation: &str, mut op: impl FnMut() -> StoreResult<T>) -> StoreResult<T> {
        let mut attempt = 1;
        loop {
            match op() {
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(operation, attempt, ?delay, error = %e, "retrying transient failure");
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use std::cell::Cell;

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            min_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    #[test]
    fn retries_transient_errors_until_success() {
        let calls = Cell::new(0);
        let result = fast().run("read", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(StoreError::Connection("flaky".into()))
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: StoreResult<()> = fast().run("read", || {
            calls.set(calls.get() + 1);
            Err(StoreError::Connection("down".into()))
        });
        assert!(matches!(result, Err(StoreError::Connection(_))));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn does_not_retry_permanent_errors() {
        let calls = Cell::new(0);
        let result: StoreResult<()> = fast().run("read", || {
            calls.set(calls.get() + 1);
            Err(StoreError::InvalidArgument("bad".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            min_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
        };
        for _ in 0..20 {
            let first = policy.backoff(1);
            assert!(first >= Duration::from_millis(5) && first <= Duration::from_millis(10));
            let late = policy.backoff(8);
            assert!(late >= Duration::from_millis(25) && late <= Duration::from_millis(50));
        }
    }
}
