//! # Heliograph Common Library
//!
//! Shared code for Heliograph services including:
//! - Error types
//! - Configuration loading
//! - Database initialization and schema
//! - Event types and the in-process EventBus
//! - Timestamp helpers

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
