use depgraph_core::{
    AffectionDepth, ConfigError, ConfigManager, DepGraphConfig, DepGraphError, StorageBackend,
};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_default_config_file_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("nested").join("config.toml");

    ConfigManager::create_default_config(&config_path).unwrap();
    assert!(config_path.exists());

    let manager = ConfigManager::from_file(&config_path).unwrap();
    assert_eq!(manager.config_path(), Some(config_path.as_path()));
    assert_eq!(manager.config().storage, DepGraphConfig::default().storage);
    assert_eq!(
        manager.config().differentiate,
        DepGraphConfig::default().differentiate
    );
}

#[test]
fn test_partial_file_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join(".depgraph.toml");
    let db_path = temp_dir.path().join("db");
    fs::write(
        &config_path,
        format!(
            r#"
[storage]
backend = "rocks_db"
path = "{}"

[differentiate]
affection_depth = "transitive"
"#,
            db_path.display()
        ),
    )
    .unwrap();

    let manager = ConfigManager::from_file(&config_path).unwrap();
    let config = manager.config();
    assert_eq!(config.storage.backend, StorageBackend::RocksDb);
    assert_eq!(config.storage.path.as_deref(), Some(db_path.as_path()));
    assert!(config.storage.flush_on_integrate);
    assert_eq!(config.differentiate.affection_depth, AffectionDepth::Transitive);
    assert!(config.differentiate.calculate_affected);
    assert_eq!(config.logging.format, "pretty");
}

#[test]
fn test_missing_file_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let result = ConfigManager::from_file(&temp_dir.path().join("absent.toml"));
    assert!(matches!(result, Err(ConfigError::NotFound(_))));
}

#[test]
fn test_invalid_files_are_rejected() {
    let temp_dir = TempDir::new().unwrap();

    let garbage = temp_dir.path().join("garbage.toml");
    fs::write(&garbage, "[storage\nbackend = ").unwrap();
    assert!(matches!(
        ConfigManager::from_file(&garbage),
        Err(ConfigError::ParseError(_))
    ));

    let no_path = temp_dir.path().join("no_path.toml");
    fs::write(&no_path, "[storage]\nbackend = \"rocks_db\"\n").unwrap();
    let err = ConfigManager::from_file(&no_path).unwrap_err();
    assert!(matches!(err, ConfigError::ValidationError(_)));

    let as_graph_error: DepGraphError = err.into();
    assert!(matches!(as_graph_error, DepGraphError::Config(_)));
}
