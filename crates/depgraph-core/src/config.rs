use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration for the dependency graph
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DepGraphConfig {
    /// Container backend settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Affection analysis settings
    #[serde(default)]
    pub differentiate: DifferentiateConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    InMemory,
    RocksDb,
}

impl std::str::FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "in_memory" | "memory" => Ok(StorageBackend::InMemory),
            "rocks_db" | "rocksdb" => Ok(StorageBackend::RocksDb),
            other => Err(ConfigError::ValidationError(format!(
                "Invalid storage backend: {}. Must be one of: in_memory, rocks_db",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Database directory for the durable backend
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Flush buffered containers after every integrate
    #[serde(default = "default_true")]
    pub flush_on_integrate: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::InMemory,
            path: None,
            flush_on_integrate: true,
        }
    }
}

/// How far affection is followed inside a single differentiate call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AffectionDepth {
    /// Sources whose usages match an affected usage.
    #[default]
    Direct,
    /// Additionally every unit depending on an affected unit, to a fixpoint.
    Transitive,
}

impl std::str::FromStr for AffectionDepth {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "direct" => Ok(AffectionDepth::Direct),
            "transitive" => Ok(AffectionDepth::Transitive),
            other => Err(ConfigError::ValidationError(format!(
                "Invalid affection depth: {}. Must be one of: direct, transitive",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DifferentiateConfig {
    /// Compute affected sources; when off only integrate instructions are produced
    #[serde(default = "default_true")]
    pub calculate_affected: bool,

    /// Track constant changes through inlined-constant usages instead of
    /// falling back to a full rebuild
    #[serde(default = "default_true")]
    pub process_constants_incrementally: bool,

    #[serde(default)]
    pub affection_depth: AffectionDepth,
}

impl Default for DifferentiateConfig {
    fn default() -> Self {
        Self {
            calculate_affected: true,
            process_constants_incrementally: true,
            affection_depth: AffectionDepth::Direct,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "pretty", "json", "compact"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

fn is_log_level(value: &str) -> bool {
    matches!(value, "trace" | "debug" | "info" | "warn" | "error")
}

fn parse_flag(value: &str) -> bool {
    value.to_lowercase() == "true" || value == "1"
}

/// Configuration manager with defaults, file lookup and environment overrides
#[derive(Debug)]
pub struct ConfigManager {
    config: DepGraphConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables
    /// 2. Config file (.depgraph.toml)
    /// 3. Defaults
    pub fn load() -> Result<Self, ConfigError> {
        info!("Loading dependency graph configuration");

        let (config, config_path) = Self::load_config_file()?;
        Self::finish(config, config_path)
    }

    /// Load an explicit config file; overrides and validation still apply.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let config = Self::read_toml_file(path)?;
        Self::finish(config, Some(path.to_path_buf()))
    }

    fn finish(config: DepGraphConfig, config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = Self::apply_env_overrides(config)?;
        Self::validate_config(&config)?;

        match config_path {
            Some(ref path) => info!("Config file: {}", path.display()),
            None => info!("Config file: NONE (using defaults)"),
        }
        info!(
            backend = ?config.storage.backend,
            calculate_affected = config.differentiate.calculate_affected,
            affection_depth = ?config.differentiate.affection_depth,
            "Configuration loaded"
        );

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Search order:
    /// 1. ./.depgraph.toml
    /// 2. ~/.depgraph/config.toml
    /// 3. Defaults
    fn load_config_file() -> Result<(DepGraphConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".depgraph.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".depgraph").join("config.toml");
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        info!("No config file found, using defaults");
        Ok((DepGraphConfig::default(), None))
    }

    fn read_toml_file(path: &Path) -> Result<DepGraphConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        let config: DepGraphConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    fn apply_env_overrides(mut config: DepGraphConfig) -> Result<DepGraphConfig, ConfigError> {
        // Storage
        if let Ok(backend) = std::env::var("DEPGRAPH_STORAGE_BACKEND") {
            config.storage.backend = backend.parse()?;
        }
        if let Ok(path) = std::env::var("DEPGRAPH_STORAGE_PATH") {
            config.storage.path = Some(PathBuf::from(path));
        }

        // Differentiate
        if let Ok(value) = std::env::var("DEPGRAPH_CALCULATE_AFFECTED") {
            config.differentiate.calculate_affected = parse_flag(&value);
        }
        if let Ok(value) = std::env::var("DEPGRAPH_PROCESS_CONSTANTS_INCREMENTALLY") {
            config.differentiate.process_constants_incrementally = parse_flag(&value);
        }
        if let Ok(depth) = std::env::var("DEPGRAPH_AFFECTION_DEPTH") {
            config.differentiate.affection_depth = depth.parse()?;
        }

        // Logging; directive lists are left to the EnvFilter in init_tracing
        if let Ok(level) = std::env::var("RUST_LOG") {
            if is_log_level(&level) {
                config.logging.level = level;
            }
        }

        Ok(config)
    }

    fn validate_config(config: &DepGraphConfig) -> Result<(), ConfigError> {
        if config.storage.backend == StorageBackend::RocksDb && config.storage.path.is_none() {
            return Err(ConfigError::ValidationError(
                "storage.path is required for the rocks_db backend".to_string(),
            ));
        }

        if !is_log_level(&config.logging.level) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                config.logging.level
            )));
        }

        match config.logging.format.as_str() {
            "pretty" | "compact" | "json" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}. Must be one of: pretty, compact, json",
                    other
                )))
            }
        }

        Ok(())
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &DepGraphConfig {
        &self.config
    }

    /// Get the path to the config file that was loaded, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Create a default config file
    pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        let config = DepGraphConfig::default();
        let toml_str =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::ReadError(e.to_string()))?;
        }

        std::fs::write(path, toml_str).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        Ok(())
    }
}

impl From<ConfigError> for crate::DepGraphError {
    fn from(e: ConfigError) -> Self {
        crate::DepGraphError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DepGraphConfig::default();
        assert_eq!(config.storage.backend, StorageBackend::InMemory);
        assert!(config.differentiate.calculate_affected);
        assert!(config.differentiate.process_constants_incrementally);
        assert_eq!(config.differentiate.affection_depth, AffectionDepth::Direct);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_config_validation() {
        let config = DepGraphConfig::default();
        assert!(ConfigManager::validate_config(&config).is_ok());

        let mut bad_level = config.clone();
        bad_level.logging.level = "loud".to_string();
        assert!(ConfigManager::validate_config(&bad_level).is_err());

        let mut missing_path = config.clone();
        missing_path.storage.backend = StorageBackend::RocksDb;
        assert!(ConfigManager::validate_config(&missing_path).is_err());
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("rocksdb".parse::<StorageBackend>().ok(), Some(StorageBackend::RocksDb));
        assert_eq!(
            "Transitive".parse::<AffectionDepth>().ok(),
            Some(AffectionDepth::Transitive)
        );
        assert!("sideways".parse::<AffectionDepth>().is_err());
    }
}
