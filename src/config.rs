// Configuration management for CodeAtlas

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, StoreError};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub vectors: VectorConfig,
    pub search: SearchConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file, relative to the workspace root.
    pub path: String,
    pub pool_size: u32,
    pub busy_timeout_ms: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    /// Embedding dimension; must match what the embedding generator produces.
    pub dimension: usize,
    /// Name of the vec0 virtual table for per-symbol embeddings.
    pub table: String,
    /// Entries per transaction when storing embedding batches.
    pub batch_size: usize,
    /// Cosine-distance cutoff for single-symbol semantic search.
    pub max_distance: f32,
    /// Looser cutoff for cross-layer concept search.
    pub cross_layer_max_distance: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub default_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                path: ".codeatlas.db".to_string(),
                pool_size: 10,
                busy_timeout_ms: 5000,
            },
            vectors: VectorConfig {
                dimension: 768,
                table: "symbol_vectors".to_string(),
                batch_size: 64,
                max_distance: 0.8,
                cross_layer_max_distance: 1.2,
            },
            search: SearchConfig { default_limit: 20 },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| StoreError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a workspace directory.
    /// Looks for .codeatlas.toml in the workspace root.
    pub fn from_workspace_dir<P: AsRef<Path>>(workspace_dir: P) -> Self {
        let config_path = workspace_dir.as_ref().join(".codeatlas.toml");

        match Self::from_file(&config_path) {
            Ok(config) => {
                tracing::info!("Loaded configuration from {}", config_path.display());
                config
            }
            Err(e) => {
                tracing::debug!("Could not load config from {}: {}", config_path.display(), e);
                tracing::info!("Using default configuration");
                Self::default()
            }
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.storage.path.is_empty() {
            return Err(StoreError::InvalidConfig(
                "storage path cannot be empty".into(),
            ));
        }
        if self.storage.pool_size == 0 {
            return Err(StoreError::InvalidConfig(
                "pool size must be greater than 0".into(),
            ));
        }

        if self.vectors.dimension == 0 {
            return Err(StoreError::InvalidConfig(
                "vector dimension must be greater than 0".into(),
            ));
        }
        if self.vectors.batch_size == 0 {
            return Err(StoreError::InvalidConfig(
                "vector batch size must be greater than 0".into(),
            ));
        }
        if !is_valid_table_name(&self.vectors.table) {
            return Err(StoreError::InvalidConfig(format!(
                "invalid vector table name: {}",
                self.vectors.table
            )));
        }
        if self.vectors.max_distance <= 0.0 || self.vectors.cross_layer_max_distance <= 0.0 {
            return Err(StoreError::InvalidConfig(
                "distance thresholds must be positive".into(),
            ));
        }
        if self.vectors.cross_layer_max_distance < self.vectors.max_distance {
            return Err(StoreError::InvalidConfig(
                "cross-layer threshold must be at least the single-symbol threshold".into(),
            ));
        }

        if self.search.default_limit == 0 {
            return Err(StoreError::InvalidConfig(
                "search limit must be greater than 0".into(),
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(StoreError::InvalidConfig(format!(
                "invalid log level: {}",
                self.logging.level
            )));
        }
        let valid_formats = ["compact", "pretty", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(StoreError::InvalidConfig(format!(
                "invalid log format: {}",
                self.logging.format
            )));
        }

        Ok(())
    }
}

/// Table names end up interpolated into DDL, so only plain identifiers pass.
pub(crate) fn is_valid_table_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.vectors.dimension, 768);
        assert_eq!(config.vectors.table, "symbol_vectors");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.vectors.dimension = 0;
        assert!(config.validate().is_err());
        config.vectors.dimension = 768;

        config.vectors.table = "bad name; DROP TABLE".to_string();
        assert!(config.validate().is_err());
        config.vectors.table = "symbol_vectors".to_string();

        config.vectors.cross_layer_max_distance = 0.1;
        assert!(config.validate().is_err());
        config.vectors.cross_layer_max_distance = 1.2;

        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
        config.logging.level = "info".to_string();

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_table_name_rules() {
        assert!(is_valid_table_name("symbol_vectors"));
        assert!(is_valid_table_name("_chunks2"));
        assert!(!is_valid_table_name(""));
        assert!(!is_valid_table_name("2fast"));
        assert!(!is_valid_table_name("vec-table"));
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_workspace_dir(dir.path());
        assert_eq!(config.search.default_limit, 20);
    }
}
