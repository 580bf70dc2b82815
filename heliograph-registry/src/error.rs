//! Error types for heliograph-registry

use crate::models::DocumentStatus;
use thiserror::Error;
use uuid::Uuid;

/// Registry error type
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Malformed request, rejected before touching the store (not retried)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Document absent
    #[error("Document not found: {0}")]
    NotFound(Uuid),

    /// Edge not in the lifecycle state machine (not retried)
    #[error("Invalid transition from {current} to {target}")]
    InvalidTransition {
        current: DocumentStatus,
        target: DocumentStatus,
    },

    /// Conditional update matched zero rows; caller re-reads and decides
    #[error("Optimistic lock conflict on {document_id}: expected {expected}, found {actual:?}")]
    OptimisticLockConflict {
        document_id: Uuid,
        expected: DocumentStatus,
        actual: Option<DocumentStatus>,
    },

    /// Broker did not accept the registration event; transaction rolled back
    #[error("Event publish failed for {document_id}; registration rolled back")]
    EventPublishFailure { document_id: Uuid },

    #[error("Document already deleted: {0}")]
    AlreadyDeleted(Uuid),

    #[error("Document is not deleted: {0}")]
    NotDeleted(Uuid),

    /// Invalid pagination cursor
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Common error: {0}")]
    Common(#[from] heliograph_common::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RegistryError {
    /// Transient failures the caller may retry as-is
    pub fn is_retryable(&self) -> bool {
        match self {
            RegistryError::EventPublishFailure { .. } => true,
            _ => self.is_lock_contention(),
        }
    }

    /// SQLite reported "database is locked"
    pub fn is_lock_contention(&self) -> bool {
        match self {
            RegistryError::Database(err) => heliograph_common::error::is_sqlite_locked(err),
            RegistryError::Common(err) => err.is_lock_contention(),
            _ => false,
        }
    }
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_message_names_both_states() {
        let err = RegistryError::InvalidTransition {
            current: DocumentStatus::Registered,
            target: DocumentStatus::Indexed,
        };
        assert_eq!(err.to_string(), "Invalid transition from registered to indexed");
    }

    #[test]
    fn test_retryability() {
        let id = Uuid::new_v4();
        assert!(RegistryError::EventPublishFailure { document_id: id }.is_retryable());
        assert!(!RegistryError::NotFound(id).is_retryable());
        assert!(!RegistryError::Validation("no title".to_string()).is_retryable());
        assert!(!RegistryError::InvalidTransition {
            current: DocumentStatus::Indexed,
            target: DocumentStatus::Processing,
        }
        .is_retryable());
    }
}
