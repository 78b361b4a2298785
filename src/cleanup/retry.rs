//! Retry logic for deletion calls, with exponential backoff.
//!
//! Each item moves through a bounded attempt loop: attempt, classify the
//! failure, wait, attempt again, up to the configured retry count. Only
//! retryable failure classes (transient network, timeout, rate limit) are
//! retried; a rate-limit response that carries a server-suggested wait
//! stretches the backoff to honor it.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{client::ClientError, config::RetryConfig};

/// Execute a homeserver operation with retry logic.
///
/// Returns the first success, or the terminal error once retries are
/// exhausted, a non-retryable failure occurs, or the run is cancelled
/// during a backoff wait.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation: &str,
    cancel: &CancellationToken,
    make_call: F,
) -> Result<T, ClientError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    if !config.enabled {
        return make_call().await;
    }

    let max_attempts = config.max_retries + 1; // +1 for the initial attempt

    for attempt in 0..max_attempts {
        match make_call().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(
                        operation,
                        attempt = attempt + 1,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(error) => {
                if !error.is_retryable() || attempt == max_attempts - 1 {
                    if attempt > 0 {
                        warn!(
                            operation,
                            error = %error,
                            attempts = attempt + 1,
                            "Operation failed after all retry attempts"
                        );
                    }
                    return Err(error);
                }

                let mut delay = config.delay_for_attempt(attempt);
                if let Some(retry_after) = error.retry_after() {
                    delay = delay.max(retry_after);
                }
                warn!(
                    operation,
                    error = %error,
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = delay.as_millis(),
                    "Retryable error, will retry after delay"
                );

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        warn!(operation, "Run cancelled during retry backoff, giving up");
                        return Err(error);
                    }
                }
            }
        }
    }

    unreachable!("Retry loop should have returned")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay_ms: 10,
            max_delay_ms: 50,
            jitter: 0.0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_succeeds_first_attempt() {
        let attempts = AtomicU32::new(0);

        let result = with_retry(
            &fast_config(3),
            "delete_room",
            &CancellationToken::new(),
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Ok(42) }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let attempts = AtomicU32::new(0);

        let result = with_retry(
            &fast_config(3),
            "delete_room",
            &CancellationToken::new(),
            || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ClientError::Network("reset".into()))
                    } else {
                        Ok(42)
                    }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_retries() {
        let attempts = AtomicU32::new(0);

        let result: Result<(), _> = with_retry(
            &fast_config(2),
            "delete_room",
            &CancellationToken::new(),
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(ClientError::Timeout(std::time::Duration::from_secs(5))) }
            },
        )
        .await;

        assert!(matches!(result, Err(ClientError::Timeout(_))));
        // max_retries=2 means 3 total attempts (initial + 2 retries).
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let attempts = AtomicU32::new(0);

        let result: Result<(), _> = with_retry(
            &fast_config(3),
            "delete_room",
            &CancellationToken::new(),
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(ClientError::NotFound("!gone:x".into())) }
            },
        )
        .await;

        assert!(matches!(result, Err(ClientError::NotFound(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disabled_config_never_retries() {
        let config = RetryConfig {
            enabled: false,
            ..fast_config(3)
        };
        let attempts = AtomicU32::new(0);

        let result: Result<(), _> = with_retry(
            &config,
            "delete_room",
            &CancellationToken::new(),
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(ClientError::Network("reset".into())) }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_during_backoff_stops_retrying() {
        let config = RetryConfig {
            max_retries: 3,
            initial_delay_ms: 60_000, // long enough that only cancellation ends the wait
            jitter: 0.0,
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        cancel.cancel();
        let attempts = AtomicU32::new(0);

        let result: Result<(), _> = with_retry(&config, "delete_room", &cancel, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(ClientError::Network("reset".into())) }
        })
        .await;

        assert!(matches!(result, Err(ClientError::Network(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_honors_server_retry_after() {
        tokio::time::pause();
        let config = RetryConfig {
            max_retries: 1,
            initial_delay_ms: 10,
            jitter: 0.0,
            ..Default::default()
        };
        let attempts = AtomicU32::new(0);
        let start = tokio::time::Instant::now();

        let result = with_retry(
            &config,
            "delete_media",
            &CancellationToken::new(),
            || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(ClientError::RateLimited {
                            retry_after: Some(std::time::Duration::from_secs(2)),
                        })
                    } else {
                        Ok(())
                    }
                }
            },
        )
        .await;

        assert!(result.is_ok());
        assert!(start.elapsed() >= std::time::Duration::from_secs(2));
    }
}
