use std::thread::sleep;
use std::time::Duration;

use crate::error::CoreError;

/// Retry policy for transient I/O: 3 attempts, 100ms base delay, factor 2 —
/// the same numbers the registry, policy store and ledger persistence all
/// share (spec's Transient I/O / Persistent I/O split).
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub backoff_factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            backoff_factor: 2,
        }
    }
}

/// Run `f`, retrying on `CoreError::TransientIo` up to `policy.max_retries`
/// additional times with exponential backoff. Any other error kind, or the
/// final exhausted attempt, is returned as `CoreError::PersistentIo`.
pub fn with_retry<T>(
    policy: RetryPolicy,
    mut f: impl FnMut() -> Result<T, CoreError>,
) -> Result<T, CoreError> {
    let mut attempt = 0;
    let mut delay = policy.base_delay;
    loop {
        match f() {
            Ok(v) => return Ok(v),
            Err(CoreError::TransientIo(msg)) => {
                if attempt >= policy.max_retries {
                    tracing::error!(attempts = attempt + 1, %msg, "persistent I/O failure after exhausting retries");
                    return Err(CoreError::PersistentIo(msg));
                }
                tracing::warn!(attempt, %msg, "transient I/O error, retrying");
                sleep(delay);
                delay *= policy.backoff_factor;
                attempt += 1;
            }
            Err(other) => return Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn succeeds_after_transient_failures() {
        let calls = Cell::new(0);
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            backoff_factor: 2,
        };
        let result = with_retry(policy, || {
            let n = calls.get() + 1;
            calls.set(n);
            if n < 3 {
                Err(CoreError::TransientIo("disk busy".into()))
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn gives_up_after_max_retries() {
        let policy = RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            backoff_factor: 2,
        };
        let result: Result<(), CoreError> =
            with_retry(policy, || Err(CoreError::TransientIo("nope".into())));
        assert!(matches!(result, Err(CoreError::PersistentIo(_))));
    }

    #[test]
    fn non_transient_errors_do_not_retry() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::default();
        let result: Result<(), CoreError> = with_retry(policy, || {
            calls.set(calls.get() + 1);
            Err(CoreError::Validation("bad input".into()))
        });
        assert!(matches!(result, Err(CoreError::Validation(_))));
        assert_eq!(calls.get(), 1);
    }
}
