//! Configuration loading and database path resolution
//!
//! Bootstrap configuration comes from a TOML file. Priority order for the
//! file itself:
//! 1. Command-line argument (highest priority)
//! 2. `HELIOGRAPH_CONFIG` environment variable
//! 3. `~/.config/heliograph/registry.toml`, then `/etc/heliograph/registry.toml`
//! 4. Compiled defaults (a missing file is not an error)
//!
//! Individual environment variables override values read from the file.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const ENV_CONFIG_PATH: &str = "HELIOGRAPH_CONFIG";
/// Environment override for the SQLite database path
pub const ENV_DATABASE_PATH: &str = "HELIOGRAPH_DATABASE_PATH";
/// Environment override for the fuzzy title match threshold
pub const ENV_FUZZY_THRESHOLD: &str = "HELIOGRAPH_FUZZY_THRESHOLD";
/// Environment override for the log level
pub const ENV_LOG_LEVEL: &str = "HELIOGRAPH_LOG_LEVEL";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Path to SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Registry tuning (optional)
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Where registered documents are stored (optional)
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// How the document store guarantees single creation under concurrency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CreateStrategy {
    /// One `INSERT ... ON CONFLICT DO NOTHING RETURNING` statement
    #[default]
    ConditionalInsert,
    /// Lookup, then insert guarded by the unique constraints
    CheckThenInsert,
}

/// Registry tuning parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Minimum normalized similarity for a fuzzy title match
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_match_threshold: f64,

    /// Maximum same-year candidates scanned for fuzzy matching, oldest first
    #[serde(default = "default_fuzzy_candidate_limit")]
    pub fuzzy_candidate_limit: Option<u32>,

    #[serde(default)]
    pub create_strategy: CreateStrategy,

    /// Total time a registration may spend retrying on lock contention
    #[serde(default = "default_max_lock_wait_ms")]
    pub max_lock_wait_ms: u64,

    /// SQLite busy_timeout per statement
    #[serde(default = "default_lock_retry_ms")]
    pub lock_retry_ms: u64,

    #[serde(default = "default_pool_size")]
    pub connection_pool_size: u32,

    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

/// Storage backend described in `DocumentRegistered` events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "s3" or "local"
    #[serde(default = "default_storage_kind")]
    pub kind: String,

    #[serde(default)]
    pub local_path: Option<PathBuf>,

    #[serde(default)]
    pub bucket: Option<String>,
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("heliograph").join("registry.db"))
        .unwrap_or_else(|| PathBuf::from("./heliograph_data/registry.db"))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_fuzzy_threshold() -> f64 {
    0.9
}

fn default_fuzzy_candidate_limit() -> Option<u32> {
    Some(100)
}

fn default_max_lock_wait_ms() -> u64 {
    5000
}

fn default_lock_retry_ms() -> u64 {
    250
}

fn default_pool_size() -> u32 {
    10
}

fn default_event_bus_capacity() -> usize {
    1000
}

fn default_storage_kind() -> String {
    "s3".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            fuzzy_match_threshold: default_fuzzy_threshold(),
            fuzzy_candidate_limit: default_fuzzy_candidate_limit(),
            create_strategy: CreateStrategy::default(),
            max_lock_wait_ms: default_max_lock_wait_ms(),
            lock_retry_ms: default_lock_retry_ms(),
            connection_pool_size: default_pool_size(),
            event_bus_capacity: default_event_bus_capacity(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: default_storage_kind(),
            local_path: None,
            bucket: Some("heliograph-documents".to_string()),
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            logging: LoggingConfig::default(),
            registry: RegistryConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl TomlConfig {
    /// Resolve, load, override from environment and validate
    ///
    /// A missing config file is not fatal: defaults are used and a warning
    /// is logged. A present but malformed file is an error.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let mut config = match resolve_config_path(cli_path) {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                load_toml_config(&path)?
            }
            None => {
                warn!("No configuration file found, using compiled defaults");
                TomlConfig::default()
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `HELIOGRAPH_*` environment overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var(ENV_DATABASE_PATH) {
            if !path.trim().is_empty() {
                self.database_path = PathBuf::from(path);
            }
        }

        if let Ok(raw) = std::env::var(ENV_FUZZY_THRESHOLD) {
            self.registry.fuzzy_match_threshold = raw.trim().parse::<f64>().map_err(|e| {
                Error::Config(format!("{} must be a number: {}", ENV_FUZZY_THRESHOLD, e))
            })?;
        }

        if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
            if !level.trim().is_empty() {
                self.logging.level = level.trim().to_lowercase();
            }
        }

        Ok(())
    }

    /// Reject values the registry cannot operate with
    pub fn validate(&self) -> Result<()> {
        let threshold = self.registry.fuzzy_match_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::Config(format!(
                "fuzzy_match_threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        if self.registry.connection_pool_size == 0 {
            return Err(Error::Config("connection_pool_size must be > 0".to_string()));
        }
        if self.registry.event_bus_capacity == 0 {
            return Err(Error::Config("event_bus_capacity must be > 0".to_string()));
        }
        if self.storage.kind == "local" && self.storage.local_path.is_none() {
            return Err(Error::Config(
                "storage.local_path is required when storage.kind = \"local\"".to_string(),
            ));
        }
        Ok(())
    }
}

/// Locate the configuration file, if any
pub fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let user_config = dirs::config_dir().map(|d| d.join("heliograph").join("registry.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc/heliograph/registry.toml");
    if cfg!(unix) && system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Write a TOML config file, creating parent directories
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}
