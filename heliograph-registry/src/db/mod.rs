//! Database access for heliograph-registry
//!
//! Schema creation lives in `heliograph_common::db`; this module holds the
//! registry's queries.

pub mod audit;
pub mod documents;
pub mod provenance;

use crate::error::RegistryResult;
use heliograph_common::config::RegistryConfig;
use sqlx::SqlitePool;
use std::path::Path;

/// Open the registry database and ensure the schema exists
pub async fn init_database_pool(db_path: &Path, settings: &RegistryConfig) -> RegistryResult<SqlitePool> {
    tracing::debug!("Connecting to database: {}", db_path.display());
    let pool = heliograph_common::db::init_database(db_path, settings).await?;
    Ok(pool)
}
