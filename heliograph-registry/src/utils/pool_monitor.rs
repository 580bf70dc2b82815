//! Connection pool monitoring utilities
//!
//! Instrumented transaction begin/commit/rollback that logs how long a
//! caller waited for a pooled connection and how long it held it.

use crate::error::{RegistryError, RegistryResult};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::ops::{Deref, DerefMut};
use std::time::Instant;

/// Transaction wrapper that logs acquisition and release timing
pub struct MonitoredTransaction {
    tx: Option<Transaction<'static, Sqlite>>,
    caller: &'static str,
    acquired_at: Instant,
}

impl MonitoredTransaction {
    fn take(&mut self) -> RegistryResult<Transaction<'static, Sqlite>> {
        self.tx
            .take()
            .ok_or_else(|| RegistryError::Internal("transaction already consumed".to_string()))
    }

    /// Commit the transaction and log release timing
    pub async fn commit(mut self) -> RegistryResult<()> {
        let tx = self.take()?;
        tx.commit().await?;

        let held_ms = self.acquired_at.elapsed().as_millis();
        if held_ms > 2000 {
            tracing::warn!(
                caller = self.caller,
                held_ms,
                "LONG TRANSACTION - connection held for extended period"
            );
        } else {
            tracing::debug!(caller = self.caller, held_ms, "Connection released (commit)");
        }
        Ok(())
    }

    /// Roll back the transaction and log release timing
    pub async fn rollback(mut self) -> RegistryResult<()> {
        let tx = self.take()?;
        tx.rollback().await?;

        tracing::debug!(
            caller = self.caller,
            held_ms = self.acquired_at.elapsed().as_millis(),
            "Connection released (rollback)"
        );
        Ok(())
    }
}

impl Deref for MonitoredTransaction {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        match &self.tx {
            Some(tx) => &**tx,
            None => unreachable!("MonitoredTransaction used after commit/rollback"),
        }
    }
}

impl DerefMut for MonitoredTransaction {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.tx {
            Some(tx) => &mut **tx,
            None => unreachable!("MonitoredTransaction used after commit/rollback"),
        }
    }
}

impl Drop for MonitoredTransaction {
    fn drop(&mut self) {
        if self.tx.is_some() {
            // sqlx rolls the transaction back when it is dropped
            tracing::debug!(
                caller = self.caller,
                held_ms = self.acquired_at.elapsed().as_millis(),
                "Connection released (drop)"
            );
        }
    }
}

/// Begin a monitored transaction
///
/// ```ignore
/// let mut tx = begin_monitored(&pool, "registration::register").await?;
/// documents::get_by_id(&mut tx, id).await?;
/// tx.commit().await?;
/// ```
pub async fn begin_monitored(
    pool: &sqlx::SqlitePool,
    caller: &'static str,
) -> RegistryResult<MonitoredTransaction> {
    let start = Instant::now();
    tracing::debug!(caller, "Connection acquisition requested");

    let tx = pool.begin().await?;

    let wait_ms = start.elapsed().as_millis();
    if wait_ms > 1000 {
        tracing::warn!(
            caller,
            wait_ms,
            "SLOW CONNECTION ACQUISITION - pool may be saturated"
        );
    } else {
        tracing::debug!(caller, wait_ms, "Connection acquired");
    }

    Ok(MonitoredTransaction {
        tx: Some(tx),
        caller,
        acquired_at: Instant::now(),
    })
}
