use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Below this model confidence a row is flagged for manual review.
pub const DEFAULT_REVIEW_THRESHOLD: f64 = 0.70;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("review_threshold must be within [0, 1], got {0}")]
    InvalidThreshold(f64),
}

/// Where the chart of accounts is loaded from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KnowledgeSource {
    Csv { path: PathBuf },
    Sqlite { path: PathBuf },
}

/// Everything a classification run needs, passed in explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub knowledge_source: KnowledgeSource,
    pub model_source: PathBuf,
    pub input: PathBuf,
    pub output: PathBuf,
    /// SQLite database receiving the append-only classification history.
    #[serde(default)]
    pub history_db: Option<PathBuf>,
    #[serde(default = "default_review_threshold")]
    pub review_threshold: f64,
}

fn default_review_threshold() -> f64 {
    DEFAULT_REVIEW_THRESHOLD
}

impl EngineConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.review_threshold) {
            return Err(ConfigError::InvalidThreshold(self.review_threshold));
        }
        Ok(())
    }
}
