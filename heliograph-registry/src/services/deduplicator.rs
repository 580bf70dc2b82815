//! Duplicate detection for incoming registrations
//!
//! Strategies run in a fixed order and the first hit wins:
//! 1. exact DOI
//! 2. exact content hash
//! 3. composite (content hash + normalized title + year)
//! 4. fuzzy title among documents of the same year
//!
//! Exact lookups see soft-deleted documents too, since the unique
//! constraints they mirror do.

use crate::db::{documents, provenance};
use crate::error::RegistryResult;
use crate::models::{DocumentRecord, NewProvenance};
use crate::services::normalizer::{normalize_doi, normalize_title};
use crate::services::similarity::similarity_ratio;
use heliograph_common::config::RegistryConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::SqliteConnection;
use std::fmt;

/// Which strategy identified a duplicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Doi,
    ContentHash,
    Composite,
    FuzzyTitle,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Doi => "doi",
            MatchType::ContentHash => "content_hash",
            MatchType::Composite => "composite",
            MatchType::FuzzyTitle => "fuzzy_title",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Duplicate check result
#[derive(Debug, Clone, PartialEq)]
pub enum DuplicateCheck {
    /// No strategy fired
    Unique,
    /// An existing document matched
    Duplicate {
        match_type: MatchType,
        existing: Box<DocumentRecord>,
        /// 1.0 for exact strategies, the similarity ratio for fuzzy matches
        score: f64,
    },
}

impl DuplicateCheck {
    fn exact(match_type: MatchType, existing: DocumentRecord) -> Self {
        DuplicateCheck::Duplicate {
            match_type,
            existing: Box::new(existing),
            score: 1.0,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, DuplicateCheck::Duplicate { .. })
    }

    pub fn match_type(&self) -> Option<MatchType> {
        match self {
            DuplicateCheck::Duplicate { match_type, .. } => Some(*match_type),
            DuplicateCheck::Unique => None,
        }
    }

    pub fn existing(&self) -> Option<&DocumentRecord> {
        match self {
            DuplicateCheck::Duplicate { existing, .. } => Some(existing.as_ref()),
            DuplicateCheck::Unique => None,
        }
    }

    pub fn score(&self) -> Option<f64> {
        match self {
            DuplicateCheck::Duplicate { score, .. } => Some(*score),
            DuplicateCheck::Unique => None,
        }
    }
}

/// Deduplication engine
#[derive(Debug, Clone)]
pub struct DeduplicationEngine {
    fuzzy_threshold: f64,
    candidate_limit: Option<u32>,
}

impl DeduplicationEngine {
    pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.9;
    pub const DEFAULT_CANDIDATE_LIMIT: u32 = 100;

    pub fn new(fuzzy_threshold: f64) -> Self {
        Self {
            fuzzy_threshold,
            candidate_limit: Some(Self::DEFAULT_CANDIDATE_LIMIT),
        }
    }

    /// Bound the number of same-year candidates scanned by the fuzzy strategy
    /// (`None` scans them all)
    pub fn with_candidate_limit(mut self, limit: Option<u32>) -> Self {
        self.candidate_limit = limit;
        self
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::new(config.fuzzy_match_threshold).with_candidate_limit(config.fuzzy_candidate_limit)
    }

    pub fn fuzzy_threshold(&self) -> f64 {
        self.fuzzy_threshold
    }

    /// Look for an existing document matching the submission
    ///
    /// `doi` and `title` are given raw; they are normalized here. Empty
    /// identifiers count as absent.
    pub async fn check_duplicate(
        &self,
        conn: &mut SqliteConnection,
        doi: Option<&str>,
        content_hash: Option<&str>,
        title: &str,
        year: Option<i32>,
    ) -> RegistryResult<DuplicateCheck> {
        let content_hash = content_hash.filter(|h| !h.is_empty());

        if let Some(doi) = normalize_doi(doi) {
            if let Some(existing) = documents::get_by_doi(conn, &doi).await? {
                tracing::debug!(document_id = %existing.document_id, %doi, "Duplicate by DOI");
                return Ok(DuplicateCheck::exact(MatchType::Doi, existing));
            }
        }

        if let Some(hash) = content_hash {
            if let Some(existing) = documents::get_by_content_hash(conn, hash).await? {
                tracing::debug!(document_id = %existing.document_id, "Duplicate by content hash");
                return Ok(DuplicateCheck::exact(MatchType::ContentHash, existing));
            }
        }

        let title_normalized = normalize_title(title);

        // Subsumed by the content hash lookup while content_hash is unique
        if let Some(hash) = content_hash {
            if let Some(existing) =
                documents::get_by_composite_key(conn, hash, &title_normalized, year).await?
            {
                tracing::debug!(document_id = %existing.document_id, "Duplicate by composite key");
                return Ok(DuplicateCheck::exact(MatchType::Composite, existing));
            }
        }

        if let Some(year) = year {
            let candidates =
                documents::find_fuzzy_candidates(conn, year, self.candidate_limit).await?;
            for candidate in candidates {
                let score = similarity_ratio(&title_normalized, &candidate.title_normalized);
                if score >= self.fuzzy_threshold {
                    tracing::debug!(
                        document_id = %candidate.document_id,
                        score,
                        threshold = self.fuzzy_threshold,
                        "Duplicate by fuzzy title"
                    );
                    return Ok(DuplicateCheck::Duplicate {
                        match_type: MatchType::FuzzyTitle,
                        existing: Box::new(candidate),
                        score,
                    });
                }
            }
        }

        Ok(DuplicateCheck::Unique)
    }

    /// Fold a duplicate submission into the existing document
    ///
    /// Merges `new_metadata` (new keys win) and appends one provenance
    /// record. Status and identity fields are never touched.
    pub async fn handle_duplicate(
        &self,
        conn: &mut SqliteConnection,
        existing: &DocumentRecord,
        new_metadata: Option<&Map<String, Value>>,
        new_provenance: &NewProvenance,
    ) -> RegistryResult<DocumentRecord> {
        let updated = match new_metadata.filter(|m| !m.is_empty()) {
            Some(metadata) => documents::merge_metadata(conn, existing.document_id, metadata).await?,
            None => existing.clone(),
        };

        provenance::add_provenance(conn, existing.document_id, new_provenance).await?;

        Ok(updated)
    }
}

impl Default for DeduplicationEngine {
    fn default() -> Self {
        Self::new(Self::DEFAULT_FUZZY_THRESHOLD)
    }
}
