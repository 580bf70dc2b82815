//! Document lifecycle state machine
//!
//! ```text
//! REGISTERED ──> PROCESSING ──> INDEXED
//!                  │   ^
//!                  v   │
//!                  FAILED
//! ```
//!
//! Pure validation; persistence of a transition is done by
//! `db::documents::update_status`.

use crate::error::{RegistryError, RegistryResult};
use crate::models::DocumentStatus;

/// Legal next states from `current`
pub fn valid_next_states(current: DocumentStatus) -> &'static [DocumentStatus] {
    match current {
        DocumentStatus::Registered => &[DocumentStatus::Processing],
        DocumentStatus::Processing => &[DocumentStatus::Indexed, DocumentStatus::Failed],
        DocumentStatus::Failed => &[DocumentStatus::Processing],
        DocumentStatus::Indexed => &[],
    }
}

pub fn is_valid_transition(current: DocumentStatus, target: DocumentStatus) -> bool {
    valid_next_states(current).contains(&target)
}

/// Reject edges outside the state machine
pub fn validate_transition(current: DocumentStatus, target: DocumentStatus) -> RegistryResult<()> {
    if is_valid_transition(current, target) {
        Ok(())
    } else {
        Err(RegistryError::InvalidTransition { current, target })
    }
}

/// INDEXED has no outgoing edges
pub fn is_terminal_state(status: DocumentStatus) -> bool {
    valid_next_states(status).is_empty()
}

/// Only FAILED documents may be retried
pub fn can_retry(status: DocumentStatus) -> bool {
    status == DocumentStatus::Failed
}
