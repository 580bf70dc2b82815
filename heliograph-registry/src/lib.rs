//! heliograph-registry library interface
//!
//! Document identity and lifecycle core: exactly-once registration under
//! concurrent multi-source submission, and a validated processing state
//! machine with an audit trail.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{RegistryError, RegistryResult};

use crate::config::RegistrySettings;
use crate::services::{
    BroadcastQueue, DocumentEventPublisher, LifecycleService, MessageQueue, RegistrationCoordinator,
    RegistryMetrics,
};
use chrono::{DateTime, Utc};
use heliograph_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context built once at startup and passed to every service
#[derive(Clone)]
pub struct RegistryContext {
    /// Database connection pool
    pub db: SqlitePool,
    pub publisher: Arc<DocumentEventPublisher>,
    pub settings: Arc<RegistrySettings>,
    pub metrics: Arc<RegistryMetrics>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl RegistryContext {
    /// Context publishing to an arbitrary `MessageQueue`
    pub fn new(db: SqlitePool, queue: Arc<dyn MessageQueue>, settings: RegistrySettings) -> Self {
        let publisher = DocumentEventPublisher::new(queue).with_storage(settings.storage.clone());
        Self {
            db,
            publisher: Arc::new(publisher),
            settings: Arc::new(settings),
            metrics: Arc::new(RegistryMetrics::new()),
            startup_time: Utc::now(),
        }
    }

    /// Context publishing to the in-process `EventBus`
    pub fn with_event_bus(db: SqlitePool, bus: EventBus, settings: RegistrySettings) -> Self {
        Self::new(db, Arc::new(BroadcastQueue::new(bus)), settings)
    }

    pub fn registration(&self) -> RegistrationCoordinator {
        RegistrationCoordinator::new(self)
    }

    pub fn lifecycle(&self) -> LifecycleService {
        LifecycleService::new(self)
    }

    /// Close the pool; in-flight transactions finish first
    pub async fn shutdown(&self) {
        self.db.close().await;
    }
}
