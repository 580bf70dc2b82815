//! Outbound lifecycle event publishing
//!
//! `MessageQueue` is the broker seam; `BroadcastQueue` adapts the common
//! in-process `EventBus` to it. `DocumentEventPublisher` builds the events,
//! never retries, and reports acceptance as `Option<message_id>` so callers
//! decide what a rejected publish means (rollback for registrations, a
//! counter bump for duplicates).

use crate::models::{DocumentRecord, DocumentStatus};
use crate::services::deduplicator::MatchType;
use async_trait::async_trait;
use heliograph_common::events::{EventBus, EventEnvelope, RegistryEvent, StorageDescriptor};
use heliograph_common::time::now;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Broker rejected or could not take a message
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("no consumers are subscribed")]
    NoSubscribers,

    #[error("broker unavailable: {0}")]
    Unavailable(String),
}

/// Outbound message queue
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Send one event; `Ok` carries the broker-assigned message id
    async fn send(&self, event: &RegistryEvent) -> Result<String, QueueError>;
}

/// `MessageQueue` over the in-process `EventBus`
///
/// A send is accepted once at least one subscriber holds the event.
#[derive(Clone)]
pub struct BroadcastQueue {
    bus: EventBus,
}

impl BroadcastQueue {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl MessageQueue for BroadcastQueue {
    async fn send(&self, event: &RegistryEvent) -> Result<String, QueueError> {
        let message_id = Uuid::new_v4().to_string();
        let envelope = EventEnvelope {
            message_id: message_id.clone(),
            event: event.clone(),
        };
        self.bus
            .emit(envelope)
            .map(|_| message_id)
            .map_err(|_| QueueError::NoSubscribers)
    }
}

#[derive(Debug, Default)]
struct Counter {
    published: AtomicU64,
    failed: AtomicU64,
}

/// Per-event-type publish counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PublishStats {
    pub registered_published: u64,
    pub registered_failed: u64,
    pub duplicate_published: u64,
    pub duplicate_failed: u64,
    pub transition_failed_published: u64,
    pub transition_failed_failed: u64,
}

/// Builds and publishes registry lifecycle events
pub struct DocumentEventPublisher {
    queue: Arc<dyn MessageQueue>,
    storage: Option<StorageDescriptor>,
    registered: Counter,
    duplicate: Counter,
    transition_failed: Counter,
}

impl DocumentEventPublisher {
    pub fn new(queue: Arc<dyn MessageQueue>) -> Self {
        Self {
            queue,
            storage: None,
            registered: Counter::default(),
            duplicate: Counter::default(),
            transition_failed: Counter::default(),
        }
    }

    /// Storage backend advertised in `DocumentRegistered`
    pub fn with_storage(mut self, storage: StorageDescriptor) -> Self {
        self.storage = Some(storage);
        self
    }

    async fn publish(&self, event: RegistryEvent, counter: &Counter) -> Option<String> {
        let event_type = event.event_type();
        let document_id = event.document_id();

        match self.queue.send(&event).await {
            Ok(message_id) => {
                counter.published.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    event_type,
                    document_id = %document_id,
                    message_id = %message_id,
                    correlation_id = %event.correlation_id(),
                    "Event published"
                );
                Some(message_id)
            }
            Err(e) => {
                counter.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    event_type,
                    document_id = %document_id,
                    error = %e,
                    "Event publish failed"
                );
                None
            }
        }
    }

    /// Announce a newly registered document
    pub async fn publish_registered(
        &self,
        document: &DocumentRecord,
        storage_locator: String,
        user_id: Uuid,
        correlation_id: &str,
    ) -> Option<String> {
        let event = RegistryEvent::DocumentRegistered {
            document_id: document.document_id,
            content_hash: document.content_hash.clone(),
            doi: document.doi.clone(),
            title: document.title.clone(),
            storage_locator,
            storage_config: self.storage.clone(),
            user_id,
            correlation_id: correlation_id.to_string(),
            timestamp: now(),
        };
        self.publish(event, &self.registered).await
    }

    pub async fn publish_duplicate(
        &self,
        request_identifier: String,
        existing_document_id: Uuid,
        match_type: MatchType,
        user_id: Uuid,
        correlation_id: &str,
    ) -> Option<String> {
        let event = RegistryEvent::DocumentDuplicate {
            request_identifier,
            existing_document_id,
            match_type: match_type.to_string(),
            user_id,
            correlation_id: correlation_id.to_string(),
            timestamp: now(),
        };
        self.publish(event, &self.duplicate).await
    }

    pub async fn publish_state_transition_failed(
        &self,
        document_id: Uuid,
        from_state: Option<DocumentStatus>,
        to_state: DocumentStatus,
        error_message: String,
        worker_id: &str,
        correlation_id: &str,
    ) -> Option<String> {
        let event = RegistryEvent::StateTransitionFailed {
            document_id,
            from_state: from_state.map(|s| s.to_string()).unwrap_or_else(|| "unknown".to_string()),
            to_state: to_state.to_string(),
            error_message,
            worker_id: worker_id.to_string(),
            correlation_id: correlation_id.to_string(),
            timestamp: now(),
        };
        self.publish(event, &self.transition_failed).await
    }

    pub fn stats(&self) -> PublishStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        PublishStats {
            registered_published: load(&self.registered.published),
            registered_failed: load(&self.registered.failed),
            duplicate_published: load(&self.duplicate.published),
            duplicate_failed: load(&self.duplicate.failed),
            transition_failed_published: load(&self.transition_failed.published),
            transition_failed_failed: load(&self.transition_failed.failed),
        }
    }
}
