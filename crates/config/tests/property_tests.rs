//! Property-style checks for the configuration system

use shoplist_config::{Config, ConfigManager, SyncConfig};
use tempfile::TempDir;

#[test]
fn property_serialization_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::default();
    config.app.user_name = Some("Quinn".to_string());
    let toml_string = toml::to_string(&config)?;
    let deserialized: Config = toml::from_str(&toml_string)?;
    assert_eq!(config, deserialized);
    Ok(())
}

#[test]
fn property_default_always_valid() {
    assert!(Config::default().validate().is_ok());
}

#[test]
fn property_load_save_idempotent() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let manager = ConfigManager::with_directory(temp_dir.path().to_path_buf())?;

    manager.save(&Config::default())?;
    let loaded = manager.load()?;
    manager.save(&loaded)?;
    let loaded2 = manager.load()?;
    assert_eq!(loaded, loaded2);
    Ok(())
}

#[test]
fn property_debounce_bounds_are_inclusive() {
    for (value, valid) in [(49, false), (50, true), (10_000, true), (10_001, false)] {
        let config = SyncConfig {
            mutation_debounce_ms: value,
            ..SyncConfig::default()
        };
        let mut root = Config::default();
        root.sync = config;
        assert_eq!(root.validate().is_ok(), valid, "debounce {value}");
    }
}

#[test]
fn property_validation_deterministic() {
    let mut config = Config::default();
    config.sync.remote_batch_window_ms = 5_000;

    let result1 = config.validate();
    let result2 = config.validate();

    assert_eq!(result1, result2);
}

#[test]
fn property_merge_preserves_validity() {
    let mut base = Config::default();
    let mut other = Config::default();
    other.notifications.throttle_window_secs = 120;

    base.merge(other);
    assert!(base.validate().is_ok());
}
