//! Utility modules for heliograph-registry

pub mod db_retry;
pub mod pool_monitor;

pub use db_retry::{retry_on_lock, retry_on_lock_with_attempts};
pub use pool_monitor::{begin_monitored, MonitoredTransaction};
