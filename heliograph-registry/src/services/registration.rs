//! Registration coordinator
//!
//! Runs one registration as a single transaction:
//! dedup check → (merge into existing | create) → provenance → publish → commit.
//!
//! The `DocumentRegistered` event is published before the commit and a
//! rejected publish rolls the whole registration back, so a committed
//! document always has an accepted event. The converse does not hold: if
//! the commit itself fails after a successful publish, consumers may see an
//! event for a document that does not exist and must tolerate that.

use crate::db::{documents, provenance};
use crate::error::{RegistryError, RegistryResult};
use crate::models::{Author, NewDocument, NewProvenance, RegistrationOutcome, RegistrationRequest};
use crate::services::deduplicator::{DeduplicationEngine, DuplicateCheck};
use crate::services::event_publisher::DocumentEventPublisher;
use crate::services::metrics::RegistryMetrics;
use crate::services::normalizer::{normalize_author_name, normalize_doi, normalize_title};
use crate::utils::{begin_monitored, retry_on_lock_with_attempts};
use crate::RegistryContext;
use heliograph_common::config::CreateStrategy;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct RegistrationCoordinator {
    db: SqlitePool,
    publisher: Arc<DocumentEventPublisher>,
    metrics: Arc<RegistryMetrics>,
    dedup: DeduplicationEngine,
    create_strategy: CreateStrategy,
    max_lock_wait_ms: u64,
}

impl RegistrationCoordinator {
    pub fn new(ctx: &RegistryContext) -> Self {
        let settings = &ctx.settings;
        Self {
            db: ctx.db.clone(),
            publisher: Arc::clone(&ctx.publisher),
            metrics: Arc::clone(&ctx.metrics),
            dedup: DeduplicationEngine::new(settings.fuzzy_match_threshold)
                .with_candidate_limit(settings.fuzzy_candidate_limit),
            create_strategy: settings.create_strategy,
            max_lock_wait_ms: settings.max_lock_wait_ms,
        }
    }

    /// Register a document, or fold the request into an existing one
    ///
    /// Retries the whole unit on SQLite lock contention; a retry re-runs the
    /// dedup check, so it never registers twice.
    pub async fn register(&self, request: &RegistrationRequest) -> RegistryResult<RegistrationOutcome> {
        validate_request(request)?;

        let correlation_id = request
            .correlation_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let correlation_id = correlation_id.as_str();

        let (outcome, attempts) =
            retry_on_lock_with_attempts("registration::register", self.max_lock_wait_ms, || {
                self.register_once(request, correlation_id)
            })
            .await?;
        if attempts > 1 {
            self.metrics.record_lock_retry();
        }
        Ok(outcome)
    }

    async fn register_once(
        &self,
        request: &RegistrationRequest,
        correlation_id: &str,
    ) -> RegistryResult<RegistrationOutcome> {
        let mut tx = begin_monitored(&self.db, "registration::register").await?;

        let check = self
            .dedup
            .check_duplicate(
                &mut tx,
                request.doi.as_deref(),
                request.content_hash.as_deref(),
                &request.title,
                request.year,
            )
            .await?;

        let new_provenance = provenance_from_request(request);

        if let DuplicateCheck::Duplicate {
            match_type,
            existing,
            score,
        } = check
        {
            self.dedup
                .handle_duplicate(&mut tx, &existing, request.source_metadata.as_ref(), &new_provenance)
                .await?;
            tx.commit().await?;

            self.metrics.record_duplicate(match_type);
            info!(
                document_id = %existing.document_id,
                match_type = %match_type,
                score,
                source = %request.source,
                correlation_id,
                "Registration matched existing document"
            );

            // Best effort: the merge is already committed
            self.publisher
                .publish_duplicate(
                    request.request_identifier(&existing),
                    existing.document_id,
                    match_type,
                    request.user_id,
                    correlation_id,
                )
                .await;

            return Ok(RegistrationOutcome::duplicate(existing.document_id, Some(match_type)));
        }

        let new_document = document_from_request(request);
        let (document, created) = documents::create(&mut tx, &new_document, self.create_strategy).await?;

        if !created {
            tx.rollback().await?;
            self.metrics.record_creation_race();
            info!(
                document_id = %document.document_id,
                correlation_id,
                "Lost creation race, returning existing document"
            );
            return Ok(RegistrationOutcome::duplicate(document.document_id, None));
        }

        provenance::add_provenance(&mut tx, document.document_id, &new_provenance).await?;

        let storage_locator = request.storage_locator_for(document.document_id);
        let published = self
            .publisher
            .publish_registered(&document, storage_locator, request.user_id, correlation_id)
            .await;

        match published {
            Some(message_id) => {
                tx.commit().await?;
                self.metrics.record_queued();
                info!(
                    document_id = %document.document_id,
                    message_id = %message_id,
                    source = %request.source,
                    correlation_id,
                    "Document registered"
                );
                Ok(RegistrationOutcome::queued(document.document_id))
            }
            None => {
                tx.rollback().await?;
                self.metrics.record_rollback();
                warn!(
                    document_id = %document.document_id,
                    correlation_id,
                    "DocumentRegistered not accepted, registration rolled back"
                );
                Err(RegistryError::EventPublishFailure {
                    document_id: document.document_id,
                })
            }
        }
    }
}

/// Reject requests that cannot identify a document
pub fn validate_request(request: &RegistrationRequest) -> RegistryResult<()> {
    let has_doi = normalize_doi(request.doi.as_deref()).is_some();
    let has_hash = request
        .content_hash
        .as_deref()
        .is_some_and(|h| !h.trim().is_empty());

    if !has_doi && !has_hash {
        return Err(RegistryError::Validation(
            "either doi or content_hash is required".to_string(),
        ));
    }
    if request.title.trim().is_empty() {
        return Err(RegistryError::Validation("title must not be empty".to_string()));
    }
    if request.source.trim().is_empty() {
        return Err(RegistryError::Validation("source must not be empty".to_string()));
    }
    Ok(())
}

fn document_from_request(request: &RegistrationRequest) -> NewDocument {
    NewDocument {
        doi: normalize_doi(request.doi.as_deref()),
        content_hash: request.content_hash.clone().filter(|h| !h.is_empty()),
        title: request.title.clone(),
        title_normalized: normalize_title(&request.title),
        subtitle: request.subtitle.clone(),
        journal: request.journal.clone(),
        year: request.year,
        authors: distinct_authors(&request.authors),
        source_metadata: request.source_metadata.clone().unwrap_or_default(),
    }
}

/// Byline order, without blank names or repeats of the same person
fn distinct_authors(authors: &[Author]) -> Vec<Author> {
    let mut seen = HashSet::new();
    authors
        .iter()
        .filter(|author| {
            let key = normalize_author_name(&author.name);
            !key.is_empty() && seen.insert(key)
        })
        .cloned()
        .collect()
}

fn provenance_from_request(request: &RegistrationRequest) -> NewProvenance {
    NewProvenance {
        source: request.source.clone(),
        source_query: request.source_query.clone(),
        source_identifier: request.source_identifier.clone(),
        connector_job_id: request.connector_job_id,
        upload_id: request.upload_id,
        user_id: request.user_id,
        metadata_snapshot: request.source_metadata.clone().unwrap_or_default(),
    }
}
