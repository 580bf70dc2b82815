//! Provenance and state audit records

use super::DocumentStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Origin of one ingestion event for a document (append-only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub provenance_id: Uuid,
    pub document_id: Uuid,
    /// upload, crossref, semantic_scholar, arxiv, scixplorer, ...
    pub source: String,
    pub source_query: Option<String>,
    pub source_identifier: Option<String>,
    pub connector_job_id: Option<Uuid>,
    pub upload_id: Option<Uuid>,
    pub user_id: Uuid,
    pub metadata_snapshot: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

/// Provenance fields supplied by the caller
#[derive(Debug, Clone)]
pub struct NewProvenance {
    pub source: String,
    pub source_query: Option<String>,
    pub source_identifier: Option<String>,
    pub connector_job_id: Option<Uuid>,
    pub upload_id: Option<Uuid>,
    pub user_id: Uuid,
    pub metadata_snapshot: Map<String, Value>,
}

/// One committed status change (append-only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateAuditRecord {
    pub audit_id: Uuid,
    pub document_id: Uuid,
    /// Status matched by the conditional write; None only when no prior state existed
    pub previous_state: Option<DocumentStatus>,
    pub new_state: DocumentStatus,
    pub worker_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}
