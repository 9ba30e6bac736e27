//! Database retry logic
//!
//! Exponential backoff for transient SQLite lock errors. The maximum wait
//! is controlled per call site (usually from the settings table).

use crate::{Error, Result};
use std::time::{Duration, Instant};

/// Retry a database operation with exponential backoff until max_wait_ms elapses.
///
/// 1. Attempt operation
/// 2. On success, return result
/// 3. On "database is locked": backoff and retry while elapsed < max_wait_ms
/// 4. On any other error: return immediately (no retry)
pub async fn retry_on_lock<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let start_time = Instant::now();
    let max_duration = Duration::from_millis(max_wait_ms);
    let mut attempt = 0u32;
    let mut backoff_ms = 10u64;

    loop {
        attempt += 1;

        if attempt > 1 {
            tracing::debug!(
                operation = operation_name,
                attempt,
                "Retrying database operation"
            );
        }

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Database operation succeeded after retries"
                    );
                }
                return Ok(result);
            }
            Err(e) if is_lock_error(&e) => {
                if start_time.elapsed() >= max_duration {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        max_wait_ms,
                        "Database operation failed: lock contention exceeded max wait"
                    );
                    return Err(e);
                }
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(1000);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Transient lock errors are the only retriable database failures
fn is_lock_error(error: &Error) -> bool {
    match error {
        Error::Database(sqlx::Error::Database(db_err)) => {
            let msg = db_err.message();
            msg.contains("database is locked") || msg.contains("database table is locked")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn returns_first_success() {
        let calls = AtomicU32::new(0);
        let result: Result<i32> = retry_on_lock("test", 100, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(42)
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_lock_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<i32> = retry_on_lock("test", 100, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Validation("nope".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
