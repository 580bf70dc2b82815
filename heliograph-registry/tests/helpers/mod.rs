//! Shared fixtures for registry integration tests
//!
//! Each test gets its own database file inside a `TempDir`; keep the
//! returned `TempDir` alive for the duration of the test.

#![allow(dead_code)]

use async_trait::async_trait;
use heliograph_common::config::{CreateStrategy, RegistryConfig};
use heliograph_common::events::{EventBus, EventEnvelope, RegistryEvent, StorageDescriptor};
use heliograph_registry::config::RegistrySettings;
use heliograph_registry::models::{Author, NewDocument, RegistrationRequest};
use heliograph_registry::services::{MessageQueue, QueueError};
use heliograph_registry::RegistryContext;
use serde_json::{json, Map, Value};
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Create a temporary registry database with the schema applied
pub async fn create_test_db() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().expect("create temp dir");
    let db_path = temp_dir.path().join("registry.db");
    let pool = heliograph_common::db::init_database(&db_path, &RegistryConfig::default())
        .await
        .expect("init test database");
    (temp_dir, pool)
}

pub fn test_settings(strategy: CreateStrategy) -> RegistrySettings {
    let registry = RegistryConfig {
        create_strategy: strategy,
        ..Default::default()
    };
    RegistrySettings::from_parts(
        &registry,
        StorageDescriptor {
            kind: "s3".to_string(),
            local_path: None,
            bucket: Some("test-documents".to_string()),
        },
    )
}

/// Registry over a fresh database with one bus subscriber attached
pub struct TestRegistry {
    pub ctx: RegistryContext,
    pub events: broadcast::Receiver<EventEnvelope>,
    _temp_dir: TempDir,
}

impl TestRegistry {
    pub async fn new() -> Self {
        Self::with_strategy(CreateStrategy::ConditionalInsert).await
    }

    pub async fn with_strategy(strategy: CreateStrategy) -> Self {
        let (temp_dir, pool) = create_test_db().await;
        let bus = EventBus::new(1024);
        let events = bus.subscribe();
        let ctx = RegistryContext::with_event_bus(pool, bus, test_settings(strategy));
        Self {
            ctx,
            events,
            _temp_dir: temp_dir,
        }
    }

    /// Registry whose broker rejects every message
    pub async fn with_failing_queue() -> (Self, Arc<FailingQueue>) {
        let (temp_dir, pool) = create_test_db().await;
        let queue = Arc::new(FailingQueue::default());
        let ctx = RegistryContext::new(
            pool,
            Arc::clone(&queue) as Arc<dyn MessageQueue>,
            test_settings(CreateStrategy::ConditionalInsert),
        );
        // Nothing is ever delivered, the receiver only satisfies the struct
        let events = EventBus::new(1).subscribe();
        (
            Self {
                ctx,
                events,
                _temp_dir: temp_dir,
            },
            queue,
        )
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.ctx.db
    }

    /// Every event delivered so far
    pub fn drain_events(&mut self) -> Vec<RegistryEvent> {
        let mut drained = Vec::new();
        while let Ok(envelope) = self.events.try_recv() {
            drained.push(envelope.event);
        }
        drained
    }

    pub async fn count_rows(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(self.pool())
            .await
            .expect("count rows")
    }
}

/// Broker that is always down
#[derive(Default)]
pub struct FailingQueue {
    pub attempts: AtomicU32,
}

impl FailingQueue {
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageQueue for FailingQueue {
    async fn send(&self, _event: &RegistryEvent) -> Result<String, QueueError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(QueueError::Unavailable("connection refused".to_string()))
    }
}

pub fn metadata(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("metadata must be a JSON object, got {}", other),
    }
}

/// Registration request identified by DOI
pub fn doi_request(doi: &str, title: &str) -> RegistrationRequest {
    RegistrationRequest {
        doi: Some(doi.to_string()),
        title: title.to_string(),
        authors: vec![Author::new("A. Author")],
        year: Some(2023),
        source: "crossref".to_string(),
        user_id: Uuid::new_v4(),
        source_metadata: Some(metadata(json!({ "source": "crossref" }))),
        ..Default::default()
    }
}

/// Registration request identified by content hash
pub fn hash_request(content_hash: &str, title: &str, year: Option<i32>) -> RegistrationRequest {
    RegistrationRequest {
        content_hash: Some(content_hash.to_string()),
        title: title.to_string(),
        year,
        source: "upload".to_string(),
        user_id: Uuid::new_v4(),
        upload_id: Some(Uuid::new_v4()),
        ..Default::default()
    }
}

/// Insert payload with the normalized fields filled in
pub fn new_document(doi: Option<&str>, content_hash: Option<&str>, title: &str, year: Option<i32>) -> NewDocument {
    NewDocument {
        doi: doi.map(str::to_string),
        content_hash: content_hash.map(str::to_string),
        title: title.to_string(),
        title_normalized: heliograph_registry::services::normalizer::normalize_title(title),
        subtitle: None,
        journal: Some("Solar Physics".to_string()),
        year,
        authors: vec![Author::new("A. Author")],
        source_metadata: Map::new(),
    }
}
