//! Document records and lifecycle status

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Document processing status
///
/// REGISTERED → PROCESSING → INDEXED (terminal) or FAILED; FAILED → PROCESSING.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Initial state, awaiting processing
    Registered,
    Processing,
    /// Processing complete (terminal)
    Indexed,
    /// Processing error, may be retried
    Failed,
}

impl DocumentStatus {
    pub const ALL: [DocumentStatus; 4] = [
        DocumentStatus::Registered,
        DocumentStatus::Processing,
        DocumentStatus::Indexed,
        DocumentStatus::Failed,
    ];

    /// Persisted representation
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Registered => "registered",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Indexed => "indexed",
            DocumentStatus::Failed => "failed",
        }
    }

    /// States that stamp `last_processed_at`
    pub fn ends_processing(&self) -> bool {
        matches!(self, DocumentStatus::Indexed | DocumentStatus::Failed)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "registered" => Ok(DocumentStatus::Registered),
            "processing" => Ok(DocumentStatus::Processing),
            "indexed" => Ok(DocumentStatus::Indexed),
            "failed" => Ok(DocumentStatus::Failed),
            other => Err(format!("unknown document status '{}'", other)),
        }
    }
}

/// Document author, in byline order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orcid: Option<String>,
}

impl Author {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            affiliation: None,
            orcid: None,
        }
    }
}

/// Persisted document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Assigned at creation, never changes
    pub document_id: Uuid,
    /// Normalized DOI
    pub doi: Option<String>,
    pub content_hash: Option<String>,
    pub title: String,
    pub title_normalized: String,
    pub subtitle: Option<String>,
    pub journal: Option<String>,
    pub year: Option<i32>,
    pub authors: Vec<Author>,
    /// Merged metadata from every source that submitted this document
    pub source_metadata: Map<String, Value>,
    pub status: DocumentStatus,
    pub error_message: Option<String>,
    pub artifact_pointers: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_processed_at: Option<DateTime<Utc>>,
    /// Soft-delete marker
    pub deleted_at: Option<DateTime<Utc>>,
}

impl DocumentRecord {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Insert payload for `documents::create`
///
/// `doi` must already be normalized and `title_normalized` computed.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub doi: Option<String>,
    pub content_hash: Option<String>,
    pub title: String,
    pub title_normalized: String,
    pub subtitle: Option<String>,
    pub journal: Option<String>,
    pub year: Option<i32>,
    pub authors: Vec<Author>,
    pub source_metadata: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_string_round_trip() {
        for status in DocumentStatus::ALL {
            assert_eq!(status.as_str().parse::<DocumentStatus>().unwrap(), status);
        }
        assert_eq!("FAILED".parse::<DocumentStatus>().unwrap(), DocumentStatus::Failed);
        assert!("archived".parse::<DocumentStatus>().is_err());
    }

    #[test]
    fn test_status_serde_is_lowercase() {
        let json = serde_json::to_string(&DocumentStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }

    #[test]
    fn test_ends_processing() {
        assert!(DocumentStatus::Indexed.ends_processing());
        assert!(DocumentStatus::Failed.ends_processing());
        assert!(!DocumentStatus::Registered.ends_processing());
        assert!(!DocumentStatus::Processing.ends_processing());
    }
}
