//! In-process registry counters
//!
//! Lock-free counters shared through `RegistryContext`. Readers take a
//! `MetricsSnapshot`; values are monotonic for the life of the process.

use crate::services::deduplicator::MatchType;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct RegistryMetrics {
    registrations_queued: AtomicU64,
    duplicates_doi: AtomicU64,
    duplicates_content_hash: AtomicU64,
    duplicates_composite: AtomicU64,
    duplicates_fuzzy_title: AtomicU64,
    /// `create` returned an existing row after the dedup check missed
    creation_races: AtomicU64,
    /// Registrations rolled back because the event was not accepted
    registration_rollbacks: AtomicU64,
    transitions_succeeded: AtomicU64,
    transition_conflicts: AtomicU64,
    transitions_rejected: AtomicU64,
    /// Operations that succeeded after retrying on lock contention
    lock_retries: AtomicU64,
}

/// Point-in-time copy of `RegistryMetrics`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub registrations_queued: u64,
    pub duplicates_doi: u64,
    pub duplicates_content_hash: u64,
    pub duplicates_composite: u64,
    pub duplicates_fuzzy_title: u64,
    pub creation_races: u64,
    pub registration_rollbacks: u64,
    pub transitions_succeeded: u64,
    pub transition_conflicts: u64,
    pub transitions_rejected: u64,
    pub lock_retries: u64,
}

impl MetricsSnapshot {
    pub fn duplicates_total(&self) -> u64 {
        self.duplicates_doi
            + self.duplicates_content_hash
            + self.duplicates_composite
            + self.duplicates_fuzzy_title
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl RegistryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_queued(&self) {
        bump(&self.registrations_queued);
    }

    pub fn record_duplicate(&self, match_type: MatchType) {
        bump(match match_type {
            MatchType::Doi => &self.duplicates_doi,
            MatchType::ContentHash => &self.duplicates_content_hash,
            MatchType::Composite => &self.duplicates_composite,
            MatchType::FuzzyTitle => &self.duplicates_fuzzy_title,
        });
    }

    pub fn record_creation_race(&self) {
        bump(&self.creation_races);
    }

    pub fn record_rollback(&self) {
        bump(&self.registration_rollbacks);
    }

    pub fn record_transition(&self) {
        bump(&self.transitions_succeeded);
    }

    pub fn record_conflict(&self) {
        bump(&self.transition_conflicts);
    }

    /// Edge outside the state machine
    pub fn record_rejected_transition(&self) {
        bump(&self.transitions_rejected);
    }

    pub fn record_lock_retry(&self) {
        bump(&self.lock_retries);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            registrations_queued: load(&self.registrations_queued),
            duplicates_doi: load(&self.duplicates_doi),
            duplicates_content_hash: load(&self.duplicates_content_hash),
            duplicates_composite: load(&self.duplicates_composite),
            duplicates_fuzzy_title: load(&self.duplicates_fuzzy_title),
            creation_races: load(&self.creation_races),
            registration_rollbacks: load(&self.registration_rollbacks),
            transitions_succeeded: load(&self.transitions_succeeded),
            transition_conflicts: load(&self.transition_conflicts),
            transitions_rejected: load(&self.transitions_rejected),
            lock_retries: load(&self.lock_retries),
        }
    }
}
