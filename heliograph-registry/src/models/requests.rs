//! Inbound requests and their outcomes

use super::{Author, DocumentRecord, DocumentStatus, ProvenanceRecord, StateAuditRecord};
use crate::services::deduplicator::MatchType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Registration request
///
/// At least one of `doi` / `content_hash` must be present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrationRequest {
    #[serde(default)]
    pub doi: Option<String>,
    /// SHA-256 of the document content
    #[serde(default)]
    pub content_hash: Option<String>,
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub journal: Option<String>,
    #[serde(default)]
    pub authors: Vec<Author>,
    #[serde(default)]
    pub year: Option<i32>,
    pub source: String,
    pub user_id: Uuid,
    #[serde(default)]
    pub upload_id: Option<Uuid>,
    #[serde(default)]
    pub connector_job_id: Option<Uuid>,
    #[serde(default)]
    pub source_query: Option<String>,
    #[serde(default)]
    pub source_identifier: Option<String>,
    /// Explicit storage key; derived from upload/job/document id otherwise
    #[serde(default)]
    pub storage_locator: Option<String>,
    #[serde(default)]
    pub source_metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

impl RegistrationRequest {
    /// Identifier reported in `DocumentDuplicate` events
    pub fn request_identifier(&self, existing: &DocumentRecord) -> String {
        if let Some(hash) = self.content_hash.as_deref().filter(|h| !h.is_empty()) {
            return hash.to_string();
        }
        if let Some(hash) = existing.content_hash.as_deref() {
            return hash.to_string();
        }
        let doi = self
            .doi
            .as_deref()
            .filter(|d| !d.is_empty())
            .or(existing.doi.as_deref())
            .unwrap_or_default();
        format!("doi:{}", doi)
    }

    /// Storage key carried by `DocumentRegistered`
    pub fn storage_locator_for(&self, document_id: Uuid) -> String {
        if let Some(locator) = self.storage_locator.as_deref().filter(|l| !l.is_empty()) {
            locator.to_string()
        } else if let Some(upload_id) = self.upload_id {
            format!("uploads/{}/document.pdf", upload_id)
        } else if let Some(job_id) = self.connector_job_id {
            format!("imports/{}/{}.pdf", job_id, document_id)
        } else {
            format!("documents/{}/document.pdf", document_id)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    /// New document committed and its event accepted
    Queued,
    /// Matched an existing document
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationOutcome {
    pub status: RegistrationStatus,
    pub document_id: Uuid,
    pub existing_document_id: Option<Uuid>,
    /// None for new documents and for lost creation races
    pub match_type: Option<MatchType>,
}

impl RegistrationOutcome {
    pub fn queued(document_id: Uuid) -> Self {
        Self {
            status: RegistrationStatus::Queued,
            document_id,
            existing_document_id: None,
            match_type: None,
        }
    }

    pub fn duplicate(existing_id: Uuid, match_type: Option<MatchType>) -> Self {
        Self {
            status: RegistrationStatus::Duplicate,
            document_id: existing_id,
            existing_document_id: Some(existing_id),
            match_type,
        }
    }
}

/// Worker-issued state transition request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub target_state: DocumentStatus,
    #[serde(default)]
    pub expected_state: Option<DocumentStatus>,
    pub worker_id: String,
    /// Required iff `target_state` is FAILED
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub artifact_pointer_updates: BTreeMap<String, String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

impl TransitionRequest {
    pub fn new(target_state: DocumentStatus, worker_id: impl Into<String>) -> Self {
        Self {
            target_state,
            expected_state: None,
            worker_id: worker_id.into(),
            error_message: None,
            artifact_pointer_updates: BTreeMap::new(),
            correlation_id: None,
        }
    }

    pub fn expecting(mut self, expected: DocumentStatus) -> Self {
        self.expected_state = Some(expected);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_artifact(mut self, key: impl Into<String>, pointer: impl Into<String>) -> Self {
        self.artifact_pointer_updates.insert(key.into(), pointer.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionOutcome {
    pub document: DocumentRecord,
    pub previous_state: DocumentStatus,
    pub new_state: DocumentStatus,
}

/// Repository-level status update
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub document_id: Uuid,
    pub new_status: DocumentStatus,
    pub worker_id: Option<String>,
    pub error_message: Option<String>,
    pub artifact_pointer_updates: BTreeMap<String, String>,
    /// Optimistic lock: the write only applies if the persisted status equals this
    pub expected_status: Option<DocumentStatus>,
}

impl StatusUpdate {
    pub fn new(document_id: Uuid, new_status: DocumentStatus) -> Self {
        Self {
            document_id,
            new_status,
            worker_id: None,
            error_message: None,
            artifact_pointer_updates: BTreeMap::new(),
            expected_status: None,
        }
    }

    pub fn expecting(mut self, expected: DocumentStatus) -> Self {
        self.expected_status = Some(expected);
        self
    }

    pub fn by_worker(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_artifacts(mut self, pointers: BTreeMap<String, String>) -> Self {
        self.artifact_pointer_updates = pointers;
        self
    }
}

/// Listing filter
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub status: Option<DocumentStatus>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub include_deleted: bool,
}

impl ListQuery {
    /// Hard cap on page size
    pub const MAX_LIMIT: u32 = 1000;
    pub const DEFAULT_LIMIT: u32 = 100;

    pub fn effective_limit(&self) -> u32 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }
}

/// Cursor-paginated listing result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentPage {
    pub items: Vec<DocumentRecord>,
    /// Matching documents across all pages
    pub total: i64,
    pub limit: u32,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// Document with provenance and audit trail
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentDetail {
    pub document: DocumentRecord,
    pub provenance: Vec<ProvenanceRecord>,
    pub audit_trail: Vec<StateAuditRecord>,
}
