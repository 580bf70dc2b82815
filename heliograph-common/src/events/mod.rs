//! Event types for the Heliograph event system
//!
//! Outbound lifecycle events published by the document registry, plus the
//! in-process `EventBus` used as the broker adapter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Storage backend description carried by `DocumentRegistered`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDescriptor {
    /// "s3" or "local"
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
}

impl From<&crate::config::StorageConfig> for StorageDescriptor {
    fn from(config: &crate::config::StorageConfig) -> Self {
        Self {
            kind: config.kind.clone(),
            local_path: config.local_path.clone(),
            bucket: config.bucket.clone(),
        }
    }
}

/// Registry lifecycle events
///
/// Serialized with an `event_type` tag so downstream consumers can dispatch
/// without knowing the Rust type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum RegistryEvent {
    /// A new document was registered and is ready for processing
    DocumentRegistered {
        document_id: Uuid,
        content_hash: Option<String>,
        doi: Option<String>,
        title: String,
        /// Object key or relative path of the stored document
        storage_locator: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        storage_config: Option<StorageDescriptor>,
        user_id: Uuid,
        correlation_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A registration request matched an existing document
    DocumentDuplicate {
        request_identifier: String,
        existing_document_id: Uuid,
        /// doi, content_hash, composite, fuzzy_title
        match_type: String,
        user_id: Uuid,
        correlation_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A requested state transition was rejected
    StateTransitionFailed {
        document_id: Uuid,
        from_state: String,
        to_state: String,
        error_message: String,
        worker_id: String,
        correlation_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl RegistryEvent {
    /// Event type name, matching the serialized tag
    pub fn event_type(&self) -> &'static str {
        match self {
            RegistryEvent::DocumentRegistered { .. } => "DocumentRegistered",
            RegistryEvent::DocumentDuplicate { .. } => "DocumentDuplicate",
            RegistryEvent::StateTransitionFailed { .. } => "StateTransitionFailed",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            RegistryEvent::DocumentRegistered { correlation_id, .. }
            | RegistryEvent::DocumentDuplicate { correlation_id, .. }
            | RegistryEvent::StateTransitionFailed { correlation_id, .. } => correlation_id,
        }
    }

    /// Document the event is about
    pub fn document_id(&self) -> Uuid {
        match self {
            RegistryEvent::DocumentRegistered { document_id, .. } => *document_id,
            RegistryEvent::DocumentDuplicate {
                existing_document_id,
                ..
            } => *existing_document_id,
            RegistryEvent::StateTransitionFailed { document_id, .. } => *document_id,
        }
    }
}

/// Event envelope delivered to bus subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub message_id: String,
    #[serde(flatten)]
    pub event: RegistryEvent,
}

/// Central event distribution bus
///
/// A `tokio::sync::broadcast` channel. Subscribers that fall behind by more
/// than `capacity` events lose the oldest ones.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        envelope: EventEnvelope,
    ) -> Result<usize, broadcast::error::SendError<EventEnvelope>> {
        self.tx.send(envelope)
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn duplicate_event() -> RegistryEvent {
        RegistryEvent::DocumentDuplicate {
            request_identifier: "doi:10.1/a".to_string(),
            existing_document_id: Uuid::new_v4(),
            match_type: "doi".to_string(),
            user_id: Uuid::new_v4(),
            correlation_id: "corr-1".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(duplicate_event()).unwrap();
        assert_eq!(json["event_type"], "DocumentDuplicate");
        assert_eq!(json["match_type"], "doi");
        assert_eq!(json["correlation_id"], "corr-1");
    }

    #[test]
    fn test_envelope_flattens_event() {
        let envelope = EventEnvelope {
            message_id: "m-1".to_string(),
            event: duplicate_event(),
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["message_id"], "m-1");
        assert_eq!(json["event_type"], "DocumentDuplicate");
        assert_eq!(json["request_identifier"], "doi:10.1/a");
    }

    #[test]
    fn test_storage_descriptor_uses_type_key() {
        let descriptor = StorageDescriptor {
            kind: "local".to_string(),
            local_path: Some(PathBuf::from("/data/heliograph")),
            bucket: None,
        };
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["type"], "local");
        assert!(json.get("bucket").is_none());
    }

    #[test]
    fn test_emit_without_subscribers_fails() {
        let bus = EventBus::new(10);
        let envelope = EventEnvelope {
            message_id: "m-1".to_string(),
            event: duplicate_event(),
        };
        assert!(bus.emit(envelope).is_err());
    }

    #[tokio::test]
    async fn test_emit_reaches_subscriber() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        let event = duplicate_event();
        let delivered = bus
            .emit(EventEnvelope {
                message_id: "m-2".to_string(),
                event: event.clone(),
            })
            .unwrap();
        assert_eq!(delivered, 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.message_id, "m-2");
        assert_eq!(received.event, event);
        assert_eq!(received.event.event_type(), "DocumentDuplicate");
    }
}
