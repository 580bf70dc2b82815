//! Database retry logic
//!
//! Retries whole units of work that hit transient SQLite lock contention
//! (`SQLITE_BUSY`, including the WAL snapshot variant raised when a read
//! transaction tries to upgrade after another writer committed). The
//! operation closure must start a fresh transaction on every attempt.

use crate::error::RegistryResult;
use std::time::{Duration, Instant};

const INITIAL_BACKOFF_MS: u64 = 10;
const MAX_BACKOFF_MS: u64 = 1000;

/// Retry a database operation with exponential backoff until `max_wait_ms` elapses.
///
/// Non-lock errors are returned immediately. Backoff starts at 10ms and
/// doubles up to 1s.
pub async fn retry_on_lock<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    operation: F,
) -> RegistryResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = RegistryResult<T>>,
{
    retry_on_lock_with_attempts(operation_name, max_wait_ms, operation)
        .await
        .map(|(result, _)| result)
}

/// `retry_on_lock`, also returning the number of attempts made
///
/// More than one attempt means lock contention was recovered from.
pub async fn retry_on_lock_with_attempts<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> RegistryResult<(T, u32)>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = RegistryResult<T>>,
{
    let start_time = Instant::now();
    let max_duration = Duration::from_millis(max_wait_ms);
    let mut attempt = 0u32;
    let mut backoff_ms = INITIAL_BACKOFF_MS;

    loop {
        attempt += 1;

        if attempt > 1 {
            tracing::debug!(operation = operation_name, attempt, "Retrying database operation");
        }

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    let elapsed_ms = start_time.elapsed().as_millis();
                    if elapsed_ms > 2000 {
                        tracing::warn!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms,
                            "Database operation succeeded after significant retry period (>2s)"
                        );
                    } else {
                        tracing::debug!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms,
                            "Database operation succeeded after retry"
                        );
                    }
                }
                return Ok((result, attempt));
            }
            Err(err) => {
                if !err.is_lock_contention() {
                    return Err(err);
                }

                let elapsed = start_time.elapsed();
                if elapsed >= max_duration {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = elapsed.as_millis(),
                        max_wait_ms,
                        "Database operation failed: max retry time exceeded"
                    );
                    return Err(err);
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    elapsed_ms = elapsed.as_millis(),
                    backoff_ms,
                    remaining_ms = max_duration.saturating_sub(elapsed).as_millis(),
                    "Database locked, will retry after backoff"
                );

                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
            }
        }
    }
}
