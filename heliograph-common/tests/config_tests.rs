//! Configuration loading tests
//!
//! Environment-dependent tests are marked `#[serial]` so that
//! `HELIOGRAPH_*` variables set by one test never leak into another.

use heliograph_common::config::{
    load_toml_config, resolve_config_path, write_toml_config, CreateStrategy, TomlConfig,
    ENV_CONFIG_PATH, ENV_DATABASE_PATH, ENV_FUZZY_THRESHOLD, ENV_LOG_LEVEL,
};
use heliograph_common::Error;
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

fn clear_env() {
    for var in [ENV_CONFIG_PATH, ENV_DATABASE_PATH, ENV_FUZZY_THRESHOLD, ENV_LOG_LEVEL] {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_missing_file_falls_back_to_defaults() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("does-not-exist.toml");

    // An explicit path that does not exist is a read error, not a default
    assert!(TomlConfig::load(Some(&missing)).is_err());

    // No path at all resolves to the compiled defaults
    let resolved = resolve_config_path(None);
    if resolved.is_none() {
        let config = TomlConfig::load(None).unwrap();
        assert_eq!(config.registry.fuzzy_match_threshold, 0.9);
        assert_eq!(config.logging.level, "info");
    }
}

#[test]
#[serial]
fn test_env_config_path_is_used() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("registry.toml");

    let mut config = TomlConfig::default();
    config.database_path = PathBuf::from("/srv/heliograph/registry.db");
    config.registry.create_strategy = CreateStrategy::CheckThenInsert;
    write_toml_config(&config, &path).unwrap();

    env::set_var(ENV_CONFIG_PATH, &path);
    let loaded = TomlConfig::load(None).unwrap();
    clear_env();

    assert_eq!(loaded.database_path, PathBuf::from("/srv/heliograph/registry.db"));
    assert_eq!(loaded.registry.create_strategy, CreateStrategy::CheckThenInsert);
}

#[test]
#[serial]
fn test_env_overrides_file_values() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("registry.toml");
    std::fs::write(
        &path,
        r#"
        database_path = "/from/file.db"

        [logging]
        level = "warn"

        [registry]
        fuzzy_match_threshold = 0.95
        "#,
    )
    .unwrap();

    env::set_var(ENV_DATABASE_PATH, "/from/env.db");
    env::set_var(ENV_FUZZY_THRESHOLD, "0.85");
    env::set_var(ENV_LOG_LEVEL, "DEBUG");
    let loaded = TomlConfig::load(Some(&path));
    clear_env();

    let loaded = loaded.unwrap();
    assert_eq!(loaded.database_path, PathBuf::from("/from/env.db"));
    assert_eq!(loaded.registry.fuzzy_match_threshold, 0.85);
    assert_eq!(loaded.logging.level, "debug");
}

#[test]
#[serial]
fn test_invalid_threshold_override_is_rejected() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("registry.toml");
    write_toml_config(&TomlConfig::default(), &path).unwrap();

    env::set_var(ENV_FUZZY_THRESHOLD, "very similar");
    let not_a_number = TomlConfig::load(Some(&path));
    env::set_var(ENV_FUZZY_THRESHOLD, "1.2");
    let out_of_range = TomlConfig::load(Some(&path));
    clear_env();

    assert!(matches!(not_a_number, Err(Error::Config(_))));
    assert!(matches!(out_of_range, Err(Error::Config(_))));
}

#[test]
fn test_malformed_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "[registry\nfuzzy_match_threshold = ").unwrap();

    assert!(matches!(load_toml_config(&path), Err(Error::Config(_))));
}

#[test]
fn test_unknown_create_strategy_is_rejected() {
    let result: Result<TomlConfig, _> = toml::from_str(
        r#"
        [registry]
        create_strategy = "insert_and_hope"
        "#,
    );
    assert!(result.is_err());
}

#[test]
fn test_write_then_load_preserves_settings() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("registry.toml");

    let mut config = TomlConfig::default();
    config.registry.fuzzy_candidate_limit = Some(500);
    config.registry.max_lock_wait_ms = 2500;
    config.storage.kind = "local".to_string();
    config.storage.local_path = Some(PathBuf::from("/data/papers"));
    write_toml_config(&config, &path).unwrap();

    let loaded = load_toml_config(&path).unwrap();
    assert_eq!(loaded.registry.fuzzy_candidate_limit, Some(500));
    assert_eq!(loaded.registry.max_lock_wait_ms, 2500);
    assert_eq!(loaded.storage, config.storage);
    assert!(loaded.validate().is_ok());
}
