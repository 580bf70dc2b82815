//! Database initialization
//!
//! Opens (creating if needed) the registry's SQLite database and applies the
//! schema idempotently. Per-connection pragmas are set through
//! `SqliteConnectOptions` so every pooled connection enforces foreign keys
//! and shares the same busy timeout.

use crate::config::RegistryConfig;
use crate::Result;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Current schema version recorded in `schema_version`
pub const SCHEMA_VERSION: i64 = 1;

/// Initialize database connection pool and create tables if needed
pub async fn init_database(db_path: &Path, settings: &RegistryConfig) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_millis(settings.lock_retry_ms));

    let pool = SqlitePoolOptions::new()
        .max_connections(settings.connection_pool_size)
        .acquire_timeout(Duration::from_millis(settings.max_lock_wait_ms.max(1000)))
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    info!(
        pool_size = settings.connection_pool_size,
        busy_timeout_ms = settings.lock_retry_ms,
        "Registry database ready"
    );

    Ok(pool)
}

/// Create all registry tables (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_documents_table(pool).await?;
    create_provenance_table(pool).await?;
    create_state_audit_table(pool).await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the documents table
///
/// NULLs never collide in SQLite unique constraints, so the three unique
/// keys only bind rows where the key columns are populated.
pub async fn create_documents_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            document_id TEXT PRIMARY KEY,
            doi TEXT UNIQUE,
            content_hash TEXT UNIQUE,
            title TEXT NOT NULL,
            title_normalized TEXT NOT NULL,
            subtitle TEXT,
            journal TEXT,
            year INTEGER,
            authors TEXT NOT NULL DEFAULT '[]',
            source_metadata TEXT NOT NULL DEFAULT '{}',
            status TEXT NOT NULL DEFAULT 'registered'
                CHECK (status IN ('registered', 'processing', 'indexed', 'failed')),
            error_message TEXT,
            artifact_pointers TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            last_processed_at TEXT,
            deleted_at TEXT,
            CHECK (doi IS NOT NULL OR content_hash IS NOT NULL),
            UNIQUE (content_hash, title_normalized, year)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_year ON documents(year)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_created_at ON documents(created_at, document_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_deleted_at ON documents(deleted_at)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the document_provenance table (append-only)
pub async fn create_provenance_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_provenance (
            provenance_id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL REFERENCES documents(document_id) ON DELETE CASCADE,
            source TEXT NOT NULL,
            source_query TEXT,
            source_identifier TEXT,
            connector_job_id TEXT,
            upload_id TEXT,
            user_id TEXT NOT NULL,
            metadata_snapshot TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_provenance_document_id ON document_provenance(document_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_provenance_user_id ON document_provenance(user_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the document_state_audit table (append-only)
pub async fn create_state_audit_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_state_audit (
            audit_id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL REFERENCES documents(document_id) ON DELETE CASCADE,
            previous_state TEXT,
            new_state TEXT NOT NULL,
            worker_id TEXT,
            error_message TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_state_audit_document_id ON document_state_audit(document_id, created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
