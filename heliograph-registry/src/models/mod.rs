//! Data models for heliograph-registry

pub mod document;
pub mod provenance;
pub mod requests;

pub use document::{Author, DocumentRecord, DocumentStatus, NewDocument};
pub use provenance::{NewProvenance, ProvenanceRecord, StateAuditRecord};
pub use requests::{
    DocumentDetail, DocumentPage, ListQuery, RegistrationOutcome, RegistrationRequest,
    RegistrationStatus, StatusUpdate, TransitionOutcome, TransitionRequest,
};
