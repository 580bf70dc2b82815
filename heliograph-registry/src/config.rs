//! Runtime settings for heliograph-registry
//!
//! Resolved once at startup from the bootstrap `TomlConfig` (after its
//! environment overrides) and shared read-only through `RegistryContext`.

use heliograph_common::config::{CreateStrategy, RegistryConfig, TomlConfig};
use heliograph_common::events::StorageDescriptor;
use std::path::{Path, PathBuf};
use tracing::info;

/// Registry behaviour knobs
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub fuzzy_match_threshold: f64,
    pub fuzzy_candidate_limit: Option<u32>,
    pub create_strategy: CreateStrategy,
    /// Total lock-contention retry budget per registration
    pub max_lock_wait_ms: u64,
    /// Advertised in `DocumentRegistered`
    pub storage: StorageDescriptor,
}

impl RegistrySettings {
    pub fn from_config(config: &TomlConfig) -> Self {
        Self::from_parts(&config.registry, StorageDescriptor::from(&config.storage))
    }

    pub fn from_parts(registry: &RegistryConfig, storage: StorageDescriptor) -> Self {
        Self {
            fuzzy_match_threshold: registry.fuzzy_match_threshold,
            fuzzy_candidate_limit: registry.fuzzy_candidate_limit,
            create_strategy: registry.create_strategy,
            max_lock_wait_ms: registry.max_lock_wait_ms,
            storage,
        }
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self::from_config(&TomlConfig::default())
    }
}

/// Pick the database file: command line beats configuration
pub fn resolve_database_path(cli_override: Option<&Path>, config: &TomlConfig) -> PathBuf {
    match cli_override {
        Some(path) => {
            info!("Database path from command line: {}", path.display());
            path.to_path_buf()
        }
        None => {
            info!("Database path from configuration: {}", config.database_path.display());
            config.database_path.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heliograph_common::config::StorageConfig;

    #[test]
    fn test_settings_follow_config() {
        let mut config = TomlConfig::default();
        config.registry.fuzzy_match_threshold = 0.8;
        config.registry.create_strategy = CreateStrategy::CheckThenInsert;
        config.storage = StorageConfig {
            kind: "local".to_string(),
            local_path: Some(PathBuf::from("/srv/papers")),
            bucket: None,
        };

        let settings = RegistrySettings::from_config(&config);
        assert_eq!(settings.fuzzy_match_threshold, 0.8);
        assert_eq!(settings.create_strategy, CreateStrategy::CheckThenInsert);
        assert_eq!(settings.storage.kind, "local");
        assert_eq!(settings.storage.local_path, Some(PathBuf::from("/srv/papers")));
    }

    #[test]
    fn test_cli_database_path_wins() {
        let config = TomlConfig::default();
        let cli = PathBuf::from("/tmp/override.db");
        assert_eq!(resolve_database_path(Some(&cli), &config), cli);
        assert_eq!(resolve_database_path(None, &config), config.database_path);
    }
}
