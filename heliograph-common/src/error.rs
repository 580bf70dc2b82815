//! Common error types for Heliograph

use thiserror::Error;

/// Common result type for Heliograph operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across Heliograph services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when the underlying SQLite error is transient lock contention
    /// (`SQLITE_BUSY` and its extended codes).
    pub fn is_lock_contention(&self) -> bool {
        match self {
            #[cfg(feature = "sqlx")]
            Error::Database(db_err) => is_sqlite_locked(db_err),
            _ => false,
        }
    }
}

/// Check a raw sqlx error for "database is locked"
#[cfg(feature = "sqlx")]
pub fn is_sqlite_locked(err: &sqlx::Error) -> bool {
    err.to_string().contains("database is locked")
}
