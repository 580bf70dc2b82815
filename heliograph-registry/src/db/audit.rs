//! State transition audit trail (append-only)

use super::documents::parse_uuid;
use crate::error::{RegistryError, RegistryResult};
use crate::models::{DocumentStatus, StateAuditRecord};
use chrono::{DateTime, Utc};
use heliograph_common::time::{parse_db_timestamp, to_db_timestamp};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

fn audit_from_row(row: &SqliteRow) -> RegistryResult<StateAuditRecord> {
    let parse_status = |s: String| s.parse::<DocumentStatus>().map_err(RegistryError::Internal);

    let previous: Option<String> = row.try_get("previous_state")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(StateAuditRecord {
        audit_id: parse_uuid(&row.try_get::<String, _>("audit_id")?)?,
        document_id: parse_uuid(&row.try_get::<String, _>("document_id")?)?,
        previous_state: previous.map(parse_status).transpose()?,
        new_state: parse_status(row.try_get("new_state")?)?,
        worker_id: row.try_get("worker_id")?,
        error_message: row.try_get("error_message")?,
        created_at: parse_db_timestamp(&created_at)?,
    })
}

/// Append one audit record
///
/// Called by `documents::update_status` inside the same transaction as the
/// status write.
pub async fn record_transition(
    conn: &mut SqliteConnection,
    document_id: Uuid,
    previous_state: Option<DocumentStatus>,
    new_state: DocumentStatus,
    worker_id: Option<&str>,
    error_message: Option<&str>,
    at: &DateTime<Utc>,
) -> RegistryResult<StateAuditRecord> {
    let record = StateAuditRecord {
        audit_id: Uuid::new_v4(),
        document_id,
        previous_state,
        new_state,
        worker_id: worker_id.map(str::to_string),
        error_message: error_message.map(str::to_string),
        created_at: *at,
    };

    sqlx::query(
        r#"
        INSERT INTO document_state_audit
            (audit_id, document_id, previous_state, new_state, worker_id, error_message, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.audit_id.to_string())
    .bind(document_id.to_string())
    .bind(previous_state.map(|s| s.as_str()))
    .bind(new_state.as_str())
    .bind(&record.worker_id)
    .bind(&record.error_message)
    .bind(to_db_timestamp(at))
    .execute(&mut *conn)
    .await?;

    Ok(record)
}

/// Audit trail for a document, oldest first
pub async fn list_audit(
    conn: &mut SqliteConnection,
    document_id: Uuid,
) -> RegistryResult<Vec<StateAuditRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT audit_id, document_id, previous_state, new_state, worker_id, error_message, created_at
        FROM document_state_audit
        WHERE document_id = ?
        ORDER BY created_at ASC, rowid ASC
        "#,
    )
    .bind(document_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(audit_from_row).collect()
}
