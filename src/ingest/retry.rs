//! Bounded retry for blocking storage writes

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

use super::IngestConfig;
use crate::error::{ServerError, ServerResult, StorageError};

/// Exponential backoff bounds
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            max_attempts: config.retry_count.max(1),
            base_delay_ms: config.retry_base_ms,
            max_delay_ms: config.retry_max_delay_ms.max(config.retry_base_ms),
        }
    }
}

/// Whether a failed append may succeed when rebuilt and retried
///
/// A chain conflict means another writer moved the durable head; the retry
/// re-reads it.
pub fn is_retryable(e: &ServerError) -> bool {
    match e {
        ServerError::Storage(StorageError::ChainConflict { .. }) => true,
        ServerError::Storage(s) => s.is_transient(),
        _ => false,
    }
}

/// Run a blocking operation on the blocking pool, retrying retryable errors
pub async fn run_blocking_with_retry<T, F>(
    policy: RetryPolicy,
    operation: &'static str,
    f: F,
) -> ServerResult<T>
where
    T: Send + 'static,
    F: Fn() -> ServerResult<T> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    let mut attempt = 0;
    let mut delay_ms = policy.base_delay_ms;

    loop {
        // Use spawn_blocking for sync SQLite operation
        let f = Arc::clone(&f);
        let result = tokio::task::spawn_blocking(move || f())
            .await
            .map_err(|e| ServerError::Internal(format!("spawn_blocking failed: {}", e)))?;

        match result {
            Ok(value) => return Ok(value),
            Err(e) if is_retryable(&e) => {
                attempt += 1;
                if attempt >= policy.max_attempts {
                    error!(
                        attempt,
                        operation,
                        error = %e,
                        "Storage operation failed, retries exhausted"
                    );
                    return Err(e);
                }

                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms,
                    operation,
                    error = %e,
                    "Storage operation failed, retrying"
                );

                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = (delay_ms * 2).min(policy.max_delay_ms);
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts: attempts,
            base_delay_ms: 1,
            max_delay_ms: 4,
        }
    }

    fn transient() -> ServerError {
        ServerError::Storage(StorageError::ConnectionFailed("busy".into()))
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = run_blocking_with_retry(policy(3), "test", move || {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(transient())
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: ServerResult<()> = run_blocking_with_retry(policy(3), "test", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(transient())
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_fail_fast() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: ServerResult<()> = run_blocking_with_retry(policy(3), "test", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(ServerError::Validation("bad".into()))
        })
        .await;

        assert!(matches!(result, Err(ServerError::Validation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_chain_conflict_is_retryable() {
        assert!(is_retryable(&ServerError::Storage(
            StorageError::ChainConflict {
                chain_key: "u1".into(),
                expected: 1,
                found: 0,
            }
        )));
        assert!(!is_retryable(&ServerError::Storage(StorageError::Corruption(
            "x".into()
        ))));
    }

    #[test]
    fn test_policy_from_config() {
        let p = RetryPolicy::from_config(&IngestConfig::default());
        assert_eq!(p.max_attempts, 3);
        assert_eq!(p.base_delay_ms, 10);
        assert!(p.max_delay_ms >= p.base_delay_ms);
    }
}
