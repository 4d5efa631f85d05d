use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::config::RetryConfig;
use super::error::{RetryError, Retryable};
use crate::observability::engine_counters;

type Classifier<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Runs an async operation under a retry policy.
pub struct RetryExecutor<E> {
    config: RetryConfig,
    classifier: Classifier<E>,
}

impl<E: Retryable> RetryExecutor<E> {
    /// Executor that retries only errors reporting `is_retryable()`.
    pub fn new(config: RetryConfig) -> Self {
        Self::with_classifier(config, |e: &E| e.is_retryable())
    }
}

impl<E> RetryExecutor<E> {
    /// Executor with a custom retryability predicate.
    pub fn with_classifier<F>(config: RetryConfig, classifier: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self {
            config,
            classifier: Arc::new(classifier),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn is_retryable(&self, error: &E) -> bool {
        (self.classifier)(error)
    }

    /// Run `operation` until it succeeds, hits a non-retryable error or runs
    /// out of attempts. On exhaustion the last error is returned.
    pub async fn execute_with_retry<T, F, Fut>(&self, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let max_attempts = self.config.effective_max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            engine_counters().record_retry_attempt();

            let error = match operation().await {
                Ok(value) => {
                    debug!(attempt, max_attempts, "Operation succeeded");
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !self.is_retryable(&error) {
                error!(attempt, error = %error, "Operation failed (non-retryable)");
                return Err(RetryError::NonRetryable { attempt, error });
            }

            if attempt >= max_attempts {
                error!(attempt, error = %error, "Retries exhausted");
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last_error: error,
                });
            }

            let delay = self.config.delay_for_attempt(attempt);
            warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Operation failed (retryable), backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Like [`execute_with_retry`](Self::execute_with_retry), but when the
    /// primary operation finally fails the fallback runs and its result is
    /// returned instead.
    pub async fn execute_with_retry_and_fallback<T, F, Fut, G, GFut>(
        &self,
        operation: F,
        fallback: G,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let primary = match self.execute_with_retry(operation).await {
            Ok(value) => return Ok(value),
            Err(primary) => primary,
        };

        let attempts = primary.attempts();
        warn!(attempts, error = %primary, "Primary operation failed, running fallback");
        fallback()
            .await
            .map_err(|error| RetryError::FallbackFailed { attempts, error })
    }
}

impl<E> Clone for RetryExecutor<E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            classifier: Arc::clone(&self.classifier),
        }
    }
}

impl<E> fmt::Debug for RetryExecutor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("config", &self.config)
            .finish()
    }
}

/// Retry `operation` under `config`, retrying only errors tagged retryable.
pub async fn execute_with_retry<T, E, F, Fut>(
    operation: F,
    config: &RetryConfig,
) -> Result<T, RetryError<E>>
where
    E: Retryable + fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    RetryExecutor::new(config.clone())
        .execute_with_retry(operation)
        .await
}

pub async fn execute_with_retry_and_fallback<T, E, F, Fut, G, GFut>(
    operation: F,
    fallback: G,
    config: &RetryConfig,
) -> Result<T, RetryError<E>>
where
    E: Retryable + fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    G: FnOnce() -> GFut,
    GFut: Future<Output = Result<T, E>>,
{
    RetryExecutor::new(config.clone())
        .execute_with_retry_and_fallback(operation, fallback)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{RetryStrategy, TaskFailure};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    fn counter() -> Arc<AtomicU32> {
        Arc::new(AtomicU32::new(0))
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_success_after_failure() {
        let attempts = counter();
        let config = RetryConfig::fixed(3, 10);

        let result = execute_with_retry(
            || {
                let attempts = Arc::clone(&attempts);
                async move {
                    let count = attempts.fetch_add(1, Ordering::SeqCst);
                    if count < 2 {
                        Err(TaskFailure::retryable("connection refused"))
                    } else {
                        Ok("success")
                    }
                }
            },
            &config,
        )
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_fails_immediately() {
        let attempts = counter();
        let config = RetryConfig::fixed(5, 10);

        let result: Result<(), _> = execute_with_retry(
            || {
                let attempts = Arc::clone(&attempts);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(TaskFailure::permanent("bad credentials"))
                }
            },
            &config,
        )
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, RetryError::NonRetryable { attempt: 1, .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_jittered_backoff_schedule() {
        let config = RetryConfig {
            strategy: RetryStrategy::ExponentialJitter,
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 10_000,
        };
        let started = Instant::now();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let result: Result<(), _> = execute_with_retry(
            || {
                let seen = Arc::clone(&seen);
                async move {
                    let n = {
                        let mut seen = seen.lock().unwrap();
                        seen.push(started.elapsed());
                        seen.len()
                    };
                    Err(TaskFailure::retryable(format!("net error {n}")))
                }
            },
            &config,
        )
        .await;

        let err = result.unwrap_err();
        assert!(err.is_exhausted());
        assert_eq!(err.attempts(), 3);
        assert_eq!(err.into_inner().message, "net error 3");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        let first_gap = seen[1] - seen[0];
        let second_gap = seen[2] - seen[1];
        assert!(first_gap >= Duration::from_millis(80) && first_gap <= Duration::from_millis(120));
        assert!(second_gap >= Duration::from_millis(160) && second_gap <= Duration::from_millis(240));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_runs_on_exhaustion() {
        let attempts = counter();
        let config = RetryConfig::exponential(2, 10, 100);

        let result = execute_with_retry_and_fallback(
            || {
                let attempts = Arc::clone(&attempts);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err::<&str, _>(TaskFailure::retryable("primary down"))
                }
            },
            || async { Ok("cached") },
            &config,
        )
        .await;

        assert_eq!(result.unwrap(), "cached");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_failure_is_reported() {
        let config = RetryConfig::fixed(2, 1);

        let result: Result<(), _> = execute_with_retry_and_fallback(
            || async { Err(TaskFailure::retryable("primary down")) },
            || async { Err(TaskFailure::permanent("fallback down")) },
            &config,
        )
        .await;

        match result.unwrap_err() {
            RetryError::FallbackFailed { attempts, error } => {
                assert_eq!(attempts, 2);
                assert_eq!(error.message, "fallback down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_classifier() {
        let executor: RetryExecutor<String> =
            RetryExecutor::with_classifier(RetryConfig::fixed(4, 5), |e: &String| e.contains("timeout"));
        let attempts = counter();

        let result: Result<(), _> = executor
            .execute_with_retry(|| {
                let attempts = Arc::clone(&attempts);
                async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    if n == 0 {
                        Err("timeout talking to worker".to_string())
                    } else {
                        Err("schema mismatch".to_string())
                    }
                }
            })
            .await;

        assert!(matches!(result.unwrap_err(), RetryError::NonRetryable { attempt: 2, .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_fallback_runs_after_non_retryable_error() {
        let config = RetryConfig::fixed(3, 0);
        let result = tokio_test::block_on(execute_with_retry_and_fallback(
            || async { Err::<u32, _>(TaskFailure::permanent("corrupt input")) },
            || async { Ok(7) },
            &config,
        ));
        tokio_test::assert_ok!(result);
    }

    #[test]
    fn test_anyhow_errors_need_explicit_tag() {
        let tagged = anyhow::Error::new(TaskFailure::retryable("flaky"));
        let untagged = anyhow::anyhow!("flaky");
        assert!(tagged.is_retryable());
        assert!(!untagged.is_retryable());
    }
}
