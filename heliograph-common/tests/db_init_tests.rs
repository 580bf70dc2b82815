//! Database initialization tests

use heliograph_common::config::RegistryConfig;
use heliograph_common::db::init::{init_database, SCHEMA_VERSION};
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("data").join("registry.db");
    assert!(!db_path.exists());

    let result = init_database(&db_path, &RegistryConfig::default()).await;
    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("registry.db");
    let settings = RegistryConfig::default();

    let pool1 = init_database(&db_path, &settings).await.unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path, &settings).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());

    let versions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_version")
        .fetch_one(&pool2.unwrap())
        .await
        .unwrap();
    assert_eq!(versions, 1);
}

#[tokio::test]
async fn test_registry_tables_created() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("registry.db"), &RegistryConfig::default())
        .await
        .unwrap();

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    assert_eq!(
        tables,
        vec!["document_provenance", "document_state_audit", "documents", "schema_version"]
    );

    let version: i64 = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(version, SCHEMA_VERSION);
}

#[tokio::test]
async fn test_foreign_keys_enforced() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("registry.db"), &RegistryConfig::default())
        .await
        .unwrap();

    let enabled: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(enabled, 1);

    let orphan = sqlx::query(
        "INSERT INTO document_provenance (provenance_id, document_id, source, user_id, created_at) \
         VALUES ('p1', 'no-such-document', 'upload', 'u1', '2024-01-01T00:00:00.000000Z')",
    )
    .execute(&pool)
    .await;
    assert!(orphan.is_err(), "Provenance row without a document was accepted");
}

#[tokio::test]
async fn test_document_requires_an_identifier() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("registry.db"), &RegistryConfig::default())
        .await
        .unwrap();

    let result = sqlx::query(
        "INSERT INTO documents (document_id, title, title_normalized, created_at, updated_at) \
         VALUES ('d1', 'T', 't', '2024-01-01T00:00:00.000000Z', '2024-01-01T00:00:00.000000Z')",
    )
    .execute(&pool)
    .await;
    assert!(result.is_err(), "Document with neither doi nor content_hash was accepted");
}
