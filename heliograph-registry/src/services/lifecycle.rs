//! Document lifecycle service
//!
//! Worker-facing state transitions plus read and maintenance operations on
//! registered documents.

use crate::db::{audit, documents, provenance};
use crate::error::{RegistryError, RegistryResult};
use crate::models::{
    DocumentDetail, DocumentPage, DocumentRecord, DocumentStatus, ListQuery, StatusUpdate,
    TransitionOutcome, TransitionRequest,
};
use crate::services::event_publisher::DocumentEventPublisher;
use crate::services::metrics::RegistryMetrics;
use crate::services::state_machine;
use crate::utils::{begin_monitored, retry_on_lock_with_attempts};
use crate::RegistryContext;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct LifecycleService {
    db: SqlitePool,
    publisher: Arc<DocumentEventPublisher>,
    metrics: Arc<RegistryMetrics>,
    max_lock_wait_ms: u64,
}

impl LifecycleService {
    pub fn new(ctx: &RegistryContext) -> Self {
        Self {
            db: ctx.db.clone(),
            publisher: Arc::clone(&ctx.publisher),
            metrics: Arc::clone(&ctx.metrics),
            max_lock_wait_ms: ctx.settings.max_lock_wait_ms,
        }
    }

    /// Move a document to `request.target_state`
    ///
    /// The edge is validated from `expected_state` if given, otherwise from
    /// the status read here; the conditional update is then bound to that
    /// same status so the validated edge is the one performed.
    pub async fn transition(
        &self,
        document_id: Uuid,
        request: &TransitionRequest,
    ) -> RegistryResult<TransitionOutcome> {
        validate_transition_request(request)?;

        let correlation_id = request
            .correlation_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut conn = self.db.acquire().await?;
        let current = documents::get_by_id(&mut conn, document_id)
            .await?
            .ok_or(RegistryError::NotFound(document_id))?;
        drop(conn);

        let from = request.expected_state.unwrap_or(current.status);
        if let Err(e) = state_machine::validate_transition(from, request.target_state) {
            self.metrics.record_rejected_transition();
            warn!(
                document_id = %document_id,
                from = %from,
                to = %request.target_state,
                worker_id = %request.worker_id,
                "Rejected invalid state transition"
            );
            return Err(e);
        }

        let mut update = StatusUpdate::new(document_id, request.target_state)
            .expecting(from)
            .by_worker(request.worker_id.clone())
            .with_artifacts(request.artifact_pointer_updates.clone());
        update.error_message = request.error_message.clone();

        let ((document, success), attempts) =
            retry_on_lock_with_attempts("lifecycle::transition", self.max_lock_wait_ms, || async {
                let mut conn = self.db.acquire().await?;
                documents::update_status(&mut conn, &update).await
            })
            .await?;
        if attempts > 1 {
            self.metrics.record_lock_retry();
        }

        let document = match (document, success) {
            (Some(document), true) => document,
            (None, _) => return Err(RegistryError::NotFound(document_id)),
            (Some(actual), false) => {
                self.metrics.record_conflict();
                warn!(
                    document_id = %document_id,
                    expected = %from,
                    actual = %actual.status,
                    worker_id = %request.worker_id,
                    "Optimistic lock conflict on state transition"
                );
                self.publisher
                    .publish_state_transition_failed(
                        document_id,
                        Some(from),
                        request.target_state,
                        format!(
                            "Optimistic lock conflict: expected {}, found {}",
                            from, actual.status
                        ),
                        &request.worker_id,
                        &correlation_id,
                    )
                    .await;
                return Err(RegistryError::OptimisticLockConflict {
                    document_id,
                    expected: from,
                    actual: Some(actual.status),
                });
            }
        };

        self.metrics.record_transition();
        if state_machine::can_retry(from) {
            info!(document_id = %document_id, worker_id = %request.worker_id, "Retrying failed document");
        }
        info!(
            document_id = %document_id,
            from = %from,
            to = %request.target_state,
            terminal = state_machine::is_terminal_state(document.status),
            worker_id = %request.worker_id,
            correlation_id = %correlation_id,
            "State transition"
        );

        Ok(TransitionOutcome {
            previous_state: from,
            new_state: document.status,
            document,
        })
    }

    /// Fetch one document (soft-deleted documents included)
    pub async fn get_document(&self, document_id: Uuid) -> RegistryResult<DocumentRecord> {
        let mut conn = self.db.acquire().await?;
        documents::get_by_id(&mut conn, document_id)
            .await?
            .ok_or(RegistryError::NotFound(document_id))
    }

    /// Document with its provenance and audit trail, read in one transaction
    pub async fn get_document_detail(&self, document_id: Uuid) -> RegistryResult<DocumentDetail> {
        let mut tx = begin_monitored(&self.db, "lifecycle::get_document_detail").await?;

        let document = documents::get_by_id(&mut tx, document_id)
            .await?
            .ok_or(RegistryError::NotFound(document_id))?;
        let provenance = provenance::list_provenance(&mut tx, document_id).await?;
        let audit_trail = audit::list_audit(&mut tx, document_id).await?;

        tx.commit().await?;

        Ok(DocumentDetail {
            document,
            provenance,
            audit_trail,
        })
    }

    pub async fn list(&self, query: &ListQuery) -> RegistryResult<Vec<DocumentRecord>> {
        let mut conn = self.db.acquire().await?;
        documents::list_documents(&mut conn, query).await
    }

    /// Cursor-paginated listing; `offset` in the query is ignored
    pub async fn list_page(&self, query: &ListQuery, cursor: Option<&str>) -> RegistryResult<DocumentPage> {
        let mut conn = self.db.acquire().await?;
        documents::list_documents_cursor(&mut conn, query, cursor).await
    }

    pub async fn count(&self, status: Option<DocumentStatus>, include_deleted: bool) -> RegistryResult<i64> {
        let mut conn = self.db.acquire().await?;
        documents::count_documents(&mut conn, status, include_deleted).await
    }

    pub async fn soft_delete(&self, document_id: Uuid) -> RegistryResult<DocumentRecord> {
        let mut conn = self.db.acquire().await?;
        let document = documents::soft_delete(&mut conn, document_id).await?;
        info!(document_id = %document_id, "Document soft-deleted");
        Ok(document)
    }

    pub async fn restore(&self, document_id: Uuid) -> RegistryResult<DocumentRecord> {
        let mut conn = self.db.acquire().await?;
        let document = documents::restore(&mut conn, document_id).await?;
        info!(document_id = %document_id, "Document restored");
        Ok(document)
    }

    /// Permanent removal, cascading provenance and audit records
    pub async fn hard_delete(&self, document_id: Uuid) -> RegistryResult<()> {
        let mut conn = self.db.acquire().await?;
        documents::hard_delete(&mut conn, document_id).await
    }

    pub async fn update_artifact_pointers(
        &self,
        document_id: Uuid,
        pointers: &BTreeMap<String, String>,
    ) -> RegistryResult<DocumentRecord> {
        let mut conn = self.db.acquire().await?;
        documents::update_artifact_pointers(&mut conn, document_id, pointers).await
    }
}

/// FAILED needs an error message; other targets must not carry one
pub fn validate_transition_request(request: &TransitionRequest) -> RegistryResult<()> {
    if request.worker_id.trim().is_empty() {
        return Err(RegistryError::Validation("worker_id must not be empty".to_string()));
    }

    let has_message = request
        .error_message
        .as_deref()
        .is_some_and(|m| !m.trim().is_empty());

    match (request.target_state, has_message) {
        (DocumentStatus::Failed, false) => Err(RegistryError::Validation(
            "error_message is required when transitioning to failed".to_string(),
        )),
        (DocumentStatus::Failed, true) => Ok(()),
        (target, true) => Err(RegistryError::Validation(format!(
            "error_message is only allowed when transitioning to failed, not {}",
            target
        ))),
        (_, false) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_requires_error_message() {
        let request = TransitionRequest::new(DocumentStatus::Failed, "worker-1");
        assert!(matches!(
            validate_transition_request(&request),
            Err(RegistryError::Validation(_))
        ));
        assert!(validate_transition_request(&request.with_error("parse error")).is_ok());
    }

    #[test]
    fn test_error_message_rejected_for_other_targets() {
        let request = TransitionRequest::new(DocumentStatus::Indexed, "worker-1").with_error("oops");
        assert!(matches!(
            validate_transition_request(&request),
            Err(RegistryError::Validation(_))
        ));
        assert!(validate_transition_request(&TransitionRequest::new(DocumentStatus::Processing, "w")).is_ok());
    }

    #[test]
    fn test_worker_id_required() {
        let request = TransitionRequest::new(DocumentStatus::Processing, " ");
        assert!(validate_transition_request(&request).is_err());
    }
}
