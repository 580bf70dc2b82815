//! Document persistence
//!
//! All functions take a `&mut SqliteConnection` so callers decide the
//! transaction scope: a pooled connection, a `MonitoredTransaction`, or a
//! plain `sqlx::Transaction` all deref to one.
//!
//! Mutual exclusion between concurrent writers is left to SQLite: creation
//! relies on the unique constraints, status changes on a conditional
//! `UPDATE ... WHERE status = ?`. No in-process locks are taken.

use crate::error::{RegistryError, RegistryResult};
use crate::models::{DocumentPage, DocumentRecord, DocumentStatus, ListQuery, NewDocument, StatusUpdate};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use heliograph_common::config::CreateStrategy;
use heliograph_common::time::{now, parse_db_timestamp, to_db_timestamp};
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Connection, QueryBuilder, Row, Sqlite, SqliteConnection};
use std::collections::BTreeMap;
use tracing::{debug, warn};
use uuid::Uuid;

use super::audit;

const DOCUMENT_COLUMNS: &str = "document_id, doi, content_hash, title, title_normalized, \
     subtitle, journal, year, authors, source_metadata, status, error_message, \
     artifact_pointers, created_at, updated_at, last_processed_at, deleted_at";

/// Compare-and-swap attempts for `update_status` without an expected status
const MAX_CAS_ATTEMPTS: u32 = 8;

/// Map a `documents` row
pub(crate) fn document_from_row(row: &SqliteRow) -> RegistryResult<DocumentRecord> {
    let id_str: String = row.try_get("document_id")?;
    let document_id = parse_uuid(&id_str)?;

    let status_str: String = row.try_get("status")?;
    let status = status_str
        .parse::<DocumentStatus>()
        .map_err(RegistryError::Internal)?;

    let authors_json: String = row.try_get("authors")?;
    let metadata_json: String = row.try_get("source_metadata")?;
    let pointers_json: String = row.try_get("artifact_pointers")?;

    let year: Option<i64> = row.try_get("year")?;

    Ok(DocumentRecord {
        document_id,
        doi: row.try_get("doi")?,
        content_hash: row.try_get("content_hash")?,
        title: row.try_get("title")?,
        title_normalized: row.try_get("title_normalized")?,
        subtitle: row.try_get("subtitle")?,
        journal: row.try_get("journal")?,
        year: year.map(|y| y as i32),
        authors: serde_json::from_str(&authors_json)?,
        source_metadata: serde_json::from_str(&metadata_json)?,
        status,
        error_message: row.try_get("error_message")?,
        artifact_pointers: serde_json::from_str(&pointers_json)?,
        created_at: parse_db_timestamp(&row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_db_timestamp(&row.try_get::<String, _>("updated_at")?)?,
        last_processed_at: parse_optional_timestamp(row.try_get("last_processed_at")?)?,
        deleted_at: parse_optional_timestamp(row.try_get("deleted_at")?)?,
    })
}

pub(crate) fn parse_uuid(value: &str) -> RegistryResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| RegistryError::Internal(format!("Invalid UUID '{}': {}", value, e)))
}

pub(crate) fn parse_optional_timestamp(
    value: Option<String>,
) -> RegistryResult<Option<chrono::DateTime<chrono::Utc>>> {
    Ok(value.as_deref().map(parse_db_timestamp).transpose()?)
}

async fn fetch_one_by(
    conn: &mut SqliteConnection,
    column: &str,
    value: &str,
) -> RegistryResult<Option<DocumentRecord>> {
    let sql = format!("SELECT {} FROM documents WHERE {} = ?", DOCUMENT_COLUMNS, column);
    let row = sqlx::query(&sql).bind(value).fetch_optional(&mut *conn).await?;
    row.as_ref().map(document_from_row).transpose()
}

/// Load a document by id (soft-deleted documents included)
pub async fn get_by_id(
    conn: &mut SqliteConnection,
    document_id: Uuid,
) -> RegistryResult<Option<DocumentRecord>> {
    fetch_one_by(conn, "document_id", &document_id.to_string()).await
}

/// Load a document by normalized DOI
pub async fn get_by_doi(conn: &mut SqliteConnection, doi: &str) -> RegistryResult<Option<DocumentRecord>> {
    fetch_one_by(conn, "doi", doi).await
}

pub async fn get_by_content_hash(
    conn: &mut SqliteConnection,
    content_hash: &str,
) -> RegistryResult<Option<DocumentRecord>> {
    fetch_one_by(conn, "content_hash", content_hash).await
}

/// Load a document by (content_hash, title_normalized, year)
///
/// `year` compares null-safely: a missing year only matches a missing year.
pub async fn get_by_composite_key(
    conn: &mut SqliteConnection,
    content_hash: &str,
    title_normalized: &str,
    year: Option<i32>,
) -> RegistryResult<Option<DocumentRecord>> {
    let sql = format!(
        "SELECT {} FROM documents WHERE content_hash = ? AND title_normalized = ? AND year IS ?",
        DOCUMENT_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(content_hash)
        .bind(title_normalized)
        .bind(year)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(document_from_row).transpose()
}

/// Documents published in `year`, oldest first
///
/// `limit = None` scans every document of that year.
pub async fn find_fuzzy_candidates(
    conn: &mut SqliteConnection,
    year: i32,
    limit: Option<u32>,
) -> RegistryResult<Vec<DocumentRecord>> {
    let sql = format!(
        "SELECT {} FROM documents WHERE year = ? ORDER BY created_at ASC, rowid ASC LIMIT ?",
        DOCUMENT_COLUMNS
    );
    // SQLite treats a negative LIMIT as unbounded
    let limit = limit.map(i64::from).unwrap_or(-1);
    let rows = sqlx::query(&sql)
        .bind(year)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(document_from_row).collect()
}

/// Create a document unless one with the same key already exists
///
/// Returns the stored record and whether this call created it. Of N
/// concurrent calls with the same content hash or DOI, exactly one sees
/// `created = true`; the rest get the winner's record.
pub async fn create(
    conn: &mut SqliteConnection,
    document: &NewDocument,
    strategy: CreateStrategy,
) -> RegistryResult<(DocumentRecord, bool)> {
    match strategy {
        CreateStrategy::ConditionalInsert => create_conditional(conn, document).await,
        CreateStrategy::CheckThenInsert => create_check_then_insert(conn, document).await,
    }
}

fn insert_sql(on_conflict: &str) -> String {
    format!(
        r#"
        INSERT INTO documents (
            document_id, doi, content_hash, title, title_normalized, subtitle, journal,
            year, authors, source_metadata, status, artifact_pointers, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'registered', '{{}}', ?, ?)
        {}
        RETURNING {}
        "#,
        on_conflict, DOCUMENT_COLUMNS
    )
}

async fn insert_document(
    conn: &mut SqliteConnection,
    document: &NewDocument,
    on_conflict: &str,
) -> RegistryResult<Option<DocumentRecord>> {
    let document_id = Uuid::new_v4();
    let timestamp = to_db_timestamp(&now());
    let sql = insert_sql(on_conflict);

    let row = sqlx::query(&sql)
        .bind(document_id.to_string())
        .bind(&document.doi)
        .bind(&document.content_hash)
        .bind(&document.title)
        .bind(&document.title_normalized)
        .bind(&document.subtitle)
        .bind(&document.journal)
        .bind(document.year)
        .bind(serde_json::to_string(&document.authors)?)
        .bind(serde_json::to_string(&document.source_metadata)?)
        .bind(&timestamp)
        .bind(&timestamp)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(document_from_row).transpose()
}

/// Whichever stored document holds this document's content hash or DOI
async fn find_existing(
    conn: &mut SqliteConnection,
    document: &NewDocument,
) -> RegistryResult<Option<DocumentRecord>> {
    if let Some(hash) = document.content_hash.as_deref() {
        if let Some(existing) = get_by_content_hash(conn, hash).await? {
            return Ok(Some(existing));
        }
    }
    if let Some(doi) = document.doi.as_deref() {
        return get_by_doi(conn, doi).await;
    }
    Ok(None)
}

/// Single-statement `INSERT ... ON CONFLICT DO NOTHING RETURNING`
///
/// The conflict clause has no target, so it covers the primary key and all
/// three unique constraints.
async fn create_conditional(
    conn: &mut SqliteConnection,
    document: &NewDocument,
) -> RegistryResult<(DocumentRecord, bool)> {
    if let Some(created) = insert_document(conn, document, "ON CONFLICT DO NOTHING").await? {
        debug!(document_id = %created.document_id, "Document row created");
        return Ok((created, true));
    }

    match find_existing(conn, document).await? {
        Some(existing) => {
            debug!(document_id = %existing.document_id, "Conditional insert lost to existing document");
            Ok((existing, false))
        }
        None => Err(RegistryError::Internal(
            "Conditional insert skipped but no conflicting document was found".to_string(),
        )),
    }
}

/// Lookup, then a plain insert guarded by the unique constraints
///
/// Narrower guarantee than the conditional insert: the lookup and insert are
/// separate statements, so a concurrent creator is only detected through the
/// unique-constraint violation it causes. Single creation still holds for
/// content hash and DOI collisions because those columns carry unique
/// constraints.
async fn create_check_then_insert(
    conn: &mut SqliteConnection,
    document: &NewDocument,
) -> RegistryResult<(DocumentRecord, bool)> {
    if let Some(existing) = find_existing(conn, document).await? {
        return Ok((existing, false));
    }

    match insert_document(conn, document, "").await {
        Ok(Some(created)) => Ok((created, true)),
        Ok(None) => Err(RegistryError::Internal("Insert returned no row".to_string())),
        Err(RegistryError::Database(sqlx::Error::Database(db_err))) if db_err.is_unique_violation() => {
            warn!(
                content_hash = ?document.content_hash,
                doi = ?document.doi,
                "Unique constraint violation on create, re-fetching winner"
            );
            find_existing(conn, document).await?.map(|e| (e, false)).ok_or_else(|| {
                RegistryError::Internal(
                    "Unique violation on create but no conflicting document was found".to_string(),
                )
            })
        }
        Err(e) => Err(e),
    }
}

async fn get_status(
    conn: &mut SqliteConnection,
    document_id: Uuid,
) -> RegistryResult<Option<DocumentStatus>> {
    let status: Option<String> = sqlx::query_scalar("SELECT status FROM documents WHERE document_id = ?")
        .bind(document_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    status
        .map(|s| s.parse::<DocumentStatus>().map_err(RegistryError::Internal))
        .transpose()
}

/// Conditionally change a document's status
///
/// The write only applies while the stored status equals the expected one
/// (`update.expected_status`, or the status read just before the write when
/// none is given). On a match, in one transaction: pointers are merged,
/// `last_processed_at` is stamped for INDEXED/FAILED, `error_message` is set
/// when entering FAILED and cleared otherwise, and one audit record is
/// written.
///
/// Returns `(current record, false)` when nothing was written; the record is
/// `None` if the document does not exist. Edge validity is not checked here.
pub async fn update_status(
    conn: &mut SqliteConnection,
    update: &StatusUpdate,
) -> RegistryResult<(Option<DocumentRecord>, bool)> {
    // Nested inside a caller's transaction this becomes a savepoint
    let mut tx = conn.begin().await?;
    let result = update_status_in(&mut tx, update).await?;
    tx.commit().await?;
    Ok(result)
}

async fn update_status_in(
    conn: &mut SqliteConnection,
    update: &StatusUpdate,
) -> RegistryResult<(Option<DocumentRecord>, bool)> {
    let document_id = update.document_id;
    let new_status = update.new_status;
    let pointer_patch = serde_json::to_string(&update.artifact_pointer_updates)?;
    let error_message = match new_status {
        DocumentStatus::Failed => update.error_message.clone(),
        _ => None,
    };

    let sql = format!(
        r#"
        UPDATE documents
        SET status = ?,
            error_message = ?,
            artifact_pointers = json_patch(artifact_pointers, ?),
            last_processed_at = COALESCE(?, last_processed_at),
            updated_at = ?
        WHERE document_id = ? AND status = ?
        RETURNING {}
        "#,
        DOCUMENT_COLUMNS
    );

    let mut attempt = 0;
    loop {
        attempt += 1;

        let expected = match update.expected_status {
            Some(expected) => expected,
            None => match get_status(conn, document_id).await? {
                Some(current) => current,
                None => return Ok((None, false)),
            },
        };

        let changed_at = now();
        let timestamp = to_db_timestamp(&changed_at);
        let processed_at = new_status.ends_processing().then(|| timestamp.clone());

        let row = sqlx::query(&sql)
            .bind(new_status.as_str())
            .bind(&error_message)
            .bind(&pointer_patch)
            .bind(processed_at)
            .bind(&timestamp)
            .bind(document_id.to_string())
            .bind(expected.as_str())
            .fetch_optional(&mut *conn)
            .await?;

        if let Some(row) = row {
            let updated = document_from_row(&row)?;
            audit::record_transition(
                conn,
                document_id,
                Some(expected),
                new_status,
                update.worker_id.as_deref(),
                error_message.as_deref(),
                &changed_at,
            )
            .await?;

            debug!(
                document_id = %document_id,
                from = %expected,
                to = %new_status,
                "Document status updated"
            );
            return Ok((Some(updated), true));
        }

        let current = get_by_id(conn, document_id).await?;
        if update.expected_status.is_some() || current.is_none() || attempt >= MAX_CAS_ATTEMPTS {
            debug!(
                document_id = %document_id,
                expected = %expected,
                actual = ?current.as_ref().map(|d| d.status),
                "Conditional status update matched no row"
            );
            return Ok((current, false));
        }
    }
}

/// Shallow-merge `new_metadata` into `source_metadata` (new keys win)
pub async fn merge_metadata(
    conn: &mut SqliteConnection,
    document_id: Uuid,
    new_metadata: &Map<String, Value>,
) -> RegistryResult<DocumentRecord> {
    let mut tx = conn.begin().await?;

    let mut merged = get_by_id(&mut tx, document_id)
        .await?
        .ok_or(RegistryError::NotFound(document_id))?
        .source_metadata;
    merged.extend(new_metadata.iter().map(|(k, v)| (k.clone(), v.clone())));

    let sql = format!(
        "UPDATE documents SET source_metadata = ?, updated_at = ? WHERE document_id = ? RETURNING {}",
        DOCUMENT_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(serde_json::to_string(&merged)?)
        .bind(to_db_timestamp(&now()))
        .bind(document_id.to_string())
        .fetch_one(&mut *tx)
        .await?;
    let updated = document_from_row(&row)?;

    tx.commit().await?;
    Ok(updated)
}

/// Merge artifact pointers without changing status
pub async fn update_artifact_pointers(
    conn: &mut SqliteConnection,
    document_id: Uuid,
    pointers: &BTreeMap<String, String>,
) -> RegistryResult<DocumentRecord> {
    let sql = format!(
        r#"
        UPDATE documents
        SET artifact_pointers = json_patch(artifact_pointers, ?), updated_at = ?
        WHERE document_id = ?
        RETURNING {}
        "#,
        DOCUMENT_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(serde_json::to_string(pointers)?)
        .bind(to_db_timestamp(&now()))
        .bind(document_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => document_from_row(&row),
        None => Err(RegistryError::NotFound(document_id)),
    }
}

/// Mark a document deleted; its contents are left untouched
pub async fn soft_delete(conn: &mut SqliteConnection, document_id: Uuid) -> RegistryResult<DocumentRecord> {
    let sql = format!(
        "UPDATE documents SET deleted_at = ? WHERE document_id = ? AND deleted_at IS NULL RETURNING {}",
        DOCUMENT_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(to_db_timestamp(&now()))
        .bind(document_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => document_from_row(&row),
        None => match get_by_id(conn, document_id).await? {
            Some(_) => Err(RegistryError::AlreadyDeleted(document_id)),
            None => Err(RegistryError::NotFound(document_id)),
        },
    }
}

/// Clear the soft-delete marker
pub async fn restore(conn: &mut SqliteConnection, document_id: Uuid) -> RegistryResult<DocumentRecord> {
    let sql = format!(
        "UPDATE documents SET deleted_at = NULL WHERE document_id = ? AND deleted_at IS NOT NULL RETURNING {}",
        DOCUMENT_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(document_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => document_from_row(&row),
        None => match get_by_id(conn, document_id).await? {
            Some(_) => Err(RegistryError::NotDeleted(document_id)),
            None => Err(RegistryError::NotFound(document_id)),
        },
    }
}

/// Physically delete a document; provenance and audit rows cascade
pub async fn hard_delete(conn: &mut SqliteConnection, document_id: Uuid) -> RegistryResult<()> {
    let result = sqlx::query("DELETE FROM documents WHERE document_id = ?")
        .bind(document_id.to_string())
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(RegistryError::NotFound(document_id));
    }
    warn!(document_id = %document_id, "Document permanently deleted");
    Ok(())
}

fn push_filters(
    builder: &mut QueryBuilder<'_, Sqlite>,
    status: Option<DocumentStatus>,
    include_deleted: bool,
) {
    builder.push(" WHERE 1 = 1");
    if !include_deleted {
        builder.push(" AND deleted_at IS NULL");
    }
    if let Some(status) = status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
}

/// Offset listing, newest first
pub async fn list_documents(
    conn: &mut SqliteConnection,
    query: &ListQuery,
) -> RegistryResult<Vec<DocumentRecord>> {
    let mut builder = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM documents", DOCUMENT_COLUMNS));
    push_filters(&mut builder, query.status, query.include_deleted);
    builder
        .push(" ORDER BY created_at DESC, document_id DESC LIMIT ")
        .push_bind(i64::from(query.effective_limit()))
        .push(" OFFSET ")
        .push_bind(i64::from(query.offset.unwrap_or(0)));

    let rows = builder.build().fetch_all(&mut *conn).await?;
    rows.iter().map(document_from_row).collect()
}

pub async fn count_documents(
    conn: &mut SqliteConnection,
    status: Option<DocumentStatus>,
    include_deleted: bool,
) -> RegistryResult<i64> {
    let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM documents");
    push_filters(&mut builder, status, include_deleted);

    let count = builder
        .build_query_scalar::<i64>()
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

fn encode_cursor(document: &DocumentRecord) -> String {
    let raw = format!("{}|{}", to_db_timestamp(&document.created_at), document.document_id);
    URL_SAFE_NO_PAD.encode(raw.as_bytes())
}

fn decode_cursor(cursor: &str) -> RegistryResult<(String, Uuid)> {
    let invalid = || RegistryError::InvalidCursor(cursor.to_string());

    let bytes = URL_SAFE_NO_PAD.decode(cursor).map_err(|_| invalid())?;
    let raw = String::from_utf8(bytes).map_err(|_| invalid())?;
    let (created_at, document_id) = raw.split_once('|').ok_or_else(invalid)?;

    let created_at = parse_db_timestamp(created_at).map_err(|_| invalid())?;
    let document_id = Uuid::parse_str(document_id).map_err(|_| invalid())?;
    Ok((to_db_timestamp(&created_at), document_id))
}

/// Keyset pagination, newest first
///
/// The cursor is opaque to callers; pass `next_cursor` from the previous
/// page to continue. Pages stay stable when documents are inserted between
/// calls.
pub async fn list_documents_cursor(
    conn: &mut SqliteConnection,
    query: &ListQuery,
    cursor: Option<&str>,
) -> RegistryResult<DocumentPage> {
    let limit = query.effective_limit();
    let position = cursor.map(decode_cursor).transpose()?;

    let mut builder = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM documents", DOCUMENT_COLUMNS));
    push_filters(&mut builder, query.status, query.include_deleted);
    if let Some((created_at, document_id)) = position {
        builder
            .push(" AND (created_at < ")
            .push_bind(created_at.clone())
            .push(" OR (created_at = ")
            .push_bind(created_at)
            .push(" AND document_id < ")
            .push_bind(document_id.to_string())
            .push("))");
    }
    builder
        .push(" ORDER BY created_at DESC, document_id DESC LIMIT ")
        .push_bind(i64::from(limit) + 1);

    let rows = builder.build().fetch_all(&mut *conn).await?;
    let mut items = rows
        .iter()
        .map(document_from_row)
        .collect::<RegistryResult<Vec<_>>>()?;

    let has_more = items.len() > limit as usize;
    items.truncate(limit as usize);
    let next_cursor = if has_more { items.last().map(encode_cursor) } else { None };

    let total = count_documents(conn, query.status, query.include_deleted).await?;

    Ok(DocumentPage {
        items,
        total,
        limit,
        next_cursor,
        has_more,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record_at(created_at: chrono::DateTime<Utc>) -> DocumentRecord {
        DocumentRecord {
            document_id: Uuid::new_v4(),
            doi: None,
            content_hash: Some("h".to_string()),
            title: "t".to_string(),
            title_normalized: "t".to_string(),
            subtitle: None,
            journal: None,
            year: None,
            authors: Vec::new(),
            source_metadata: Map::new(),
            status: DocumentStatus::Registered,
            error_message: None,
            artifact_pointers: BTreeMap::new(),
            created_at,
            updated_at: created_at,
            last_processed_at: None,
            deleted_at: None,
        }
    }

    #[test]
    fn test_cursor_decodes_to_position() {
        let record = record_at(Utc::now());
        let (created_at, document_id) = decode_cursor(&encode_cursor(&record)).unwrap();
        assert_eq!(created_at, to_db_timestamp(&record.created_at));
        assert_eq!(document_id, record.document_id);
    }

    #[test]
    fn test_garbage_cursor_rejected() {
        let no_separator = URL_SAFE_NO_PAD.encode("no-separator");
        for cursor in ["not base64!", "", no_separator.as_str()] {
            assert!(matches!(
                decode_cursor(cursor),
                Err(RegistryError::InvalidCursor(_))
            ));
        }
    }
}
