use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::DEFAULT_BATCH_SIZE;
use crate::error::{InterestsError, Result};

/// Settings for one pipeline run.
///
/// Resolution order: built-in defaults, then the optional TOML file, then
/// `INTERESTS_*` environment variables. CLI flags are applied last by the binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub database_path: PathBuf,
    pub error_file: PathBuf,
    pub batch_size: usize,
    pub log_dir: PathBuf,
    /// When false, a batch with none of the known abbreviation phrases only warns
    pub strict_abbreviations: bool,
    pub metrics_file: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/parliament.db"),
            error_file: PathBuf::from("errors.csv"),
            batch_size: DEFAULT_BATCH_SIZE,
            log_dir: PathBuf::from("logs"),
            strict_abbreviations: true,
            metrics_file: None,
        }
    }
}

impl PipelineConfig {
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            InterestsError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: PipelineConfig = toml::from_str(&content)?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("INTERESTS_DATABASE_PATH") {
            self.database_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("INTERESTS_ERROR_FILE") {
            self.error_file = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("INTERESTS_LOG_DIR") {
            self.log_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("INTERESTS_METRICS_FILE") {
            self.metrics_file = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("INTERESTS_BATCH_SIZE") {
            self.batch_size = v.trim().parse().map_err(|_| {
                InterestsError::Config(format!("INTERESTS_BATCH_SIZE is not a number: '{}'", v))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(InterestsError::Config(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
