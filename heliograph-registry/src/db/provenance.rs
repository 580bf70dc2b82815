//! Provenance persistence (append-only)

use super::documents::parse_uuid;
use crate::error::RegistryResult;
use crate::models::{NewProvenance, ProvenanceRecord};
use heliograph_common::time::{now, parse_db_timestamp, to_db_timestamp};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

fn provenance_from_row(row: &SqliteRow) -> RegistryResult<ProvenanceRecord> {
    let optional_uuid = |value: Option<String>| value.as_deref().map(parse_uuid).transpose();

    let snapshot: String = row.try_get("metadata_snapshot")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(ProvenanceRecord {
        provenance_id: parse_uuid(&row.try_get::<String, _>("provenance_id")?)?,
        document_id: parse_uuid(&row.try_get::<String, _>("document_id")?)?,
        source: row.try_get("source")?,
        source_query: row.try_get("source_query")?,
        source_identifier: row.try_get("source_identifier")?,
        connector_job_id: optional_uuid(row.try_get("connector_job_id")?)?,
        upload_id: optional_uuid(row.try_get("upload_id")?)?,
        user_id: parse_uuid(&row.try_get::<String, _>("user_id")?)?,
        metadata_snapshot: serde_json::from_str(&snapshot)?,
        created_at: parse_db_timestamp(&created_at)?,
    })
}

/// Record where a document came from
pub async fn add_provenance(
    conn: &mut SqliteConnection,
    document_id: Uuid,
    provenance: &NewProvenance,
) -> RegistryResult<ProvenanceRecord> {
    let record = ProvenanceRecord {
        provenance_id: Uuid::new_v4(),
        document_id,
        source: provenance.source.clone(),
        source_query: provenance.source_query.clone(),
        source_identifier: provenance.source_identifier.clone(),
        connector_job_id: provenance.connector_job_id,
        upload_id: provenance.upload_id,
        user_id: provenance.user_id,
        metadata_snapshot: provenance.metadata_snapshot.clone(),
        created_at: now(),
    };

    sqlx::query(
        r#"
        INSERT INTO document_provenance (
            provenance_id, document_id, source, source_query, source_identifier,
            connector_job_id, upload_id, user_id, metadata_snapshot, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.provenance_id.to_string())
    .bind(document_id.to_string())
    .bind(&record.source)
    .bind(&record.source_query)
    .bind(&record.source_identifier)
    .bind(record.connector_job_id.map(|id| id.to_string()))
    .bind(record.upload_id.map(|id| id.to_string()))
    .bind(record.user_id.to_string())
    .bind(serde_json::to_string(&record.metadata_snapshot)?)
    .bind(to_db_timestamp(&record.created_at))
    .execute(&mut *conn)
    .await?;

    tracing::debug!(
        document_id = %document_id,
        source = %record.source,
        "Provenance recorded"
    );

    Ok(record)
}

/// All provenance records for a document, oldest first
pub async fn list_provenance(
    conn: &mut SqliteConnection,
    document_id: Uuid,
) -> RegistryResult<Vec<ProvenanceRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT provenance_id, document_id, source, source_query, source_identifier,
               connector_job_id, upload_id, user_id, metadata_snapshot, created_at
        FROM document_provenance
        WHERE document_id = ?
        ORDER BY created_at ASC, rowid ASC
        "#,
    )
    .bind(document_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(provenance_from_row).collect()
}
