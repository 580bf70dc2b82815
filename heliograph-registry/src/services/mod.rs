//! Registry services
//!
//! Pure building blocks (normalizer, similarity, state machine) and the
//! coordinators that run them against the database.

pub mod deduplicator;
pub mod event_publisher;
pub mod lifecycle;
pub mod metrics;
pub mod normalizer;
pub mod registration;
pub mod similarity;
pub mod state_machine;

pub use deduplicator::{DeduplicationEngine, DuplicateCheck, MatchType};
pub use event_publisher::{BroadcastQueue, DocumentEventPublisher, MessageQueue, PublishStats, QueueError};
pub use lifecycle::LifecycleService;
pub use metrics::{MetricsSnapshot, RegistryMetrics};
pub use registration::RegistrationCoordinator;
