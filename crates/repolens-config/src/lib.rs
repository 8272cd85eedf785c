//! RepoLens Configuration Management
//!
//! Provides configuration loading with support for:
//! - Global config: `~/.config/repolens/config.toml`
//! - Local config: `./repolens.toml` (in the working directory)
//!
//! Configuration is merged in order: defaults -> global -> local. Secrets
//! are referenced by environment variable name, never stored in the file.

mod error;
mod loader;

pub use error::{ConfigError, Result};
pub use loader::ConfigLoader;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for RepoLens.
///
/// Represents the fully merged configuration from all sources.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct RepolensConfig {
    /// Remote metadata provider settings
    pub github: GithubSettings,

    /// Embedding provider settings
    pub embedding: EmbeddingSettings,

    /// Vector store settings
    pub qdrant: QdrantSettings,

    /// Local storage settings
    pub storage: StorageSettings,

    /// Query ranking and session settings
    pub search: SearchSettings,

    /// Logging settings
    pub logging: LoggingSettings,
}

impl RepolensConfig {
    /// Validate the merged configuration.
    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimension == 0 {
            return Err(ConfigError::Validation(
                "embedding.dimension must be greater than zero".to_string(),
            ));
        }
        if self.embedding.model.is_empty() {
            return Err(ConfigError::Validation(
                "embedding.model is required".to_string(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::Validation(
                "embedding.batch_size must be greater than zero".to_string(),
            ));
        }
        for (name, value) in [
            ("search.semantic_weight", self.search.semantic_weight),
            ("search.keyword_weight", self.search.keyword_weight),
            ("search.semantic_threshold", self.search.semantic_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Validation(format!(
                    "{} must be between 0.0 and 1.0",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Remote metadata provider settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GithubSettings {
    /// API base URL (change for GitHub Enterprise)
    pub base_url: String,
    /// Environment variable holding the personal access token
    pub token_env: String,
    /// Base directory scanned for local clones
    pub repos_base_path: Option<PathBuf>,
}

impl Default for GithubSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.github.com".to_string(),
            token_env: "GITHUB_TOKEN".to_string(),
            repos_base_path: None,
        }
    }
}

/// Embedding provider settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// OpenAI-compatible API base URL
    pub base_url: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Embedding model name
    pub model: String,
    /// Vector dimensionality of the model
    pub dimension: usize,
    /// Texts per provider request
    pub batch_size: usize,
    /// Batches in flight simultaneously
    pub concurrency: usize,
    /// Retry attempts for transient failures
    pub max_retries: u32,
    /// Outbound requests per second
    pub requests_per_second: u32,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            model: "openai/text-embedding-3-small".to_string(),
            dimension: 1536,
            batch_size: 10,
            concurrency: 4,
            max_retries: 3,
            requests_per_second: 10,
        }
    }
}

/// Vector store settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QdrantSettings {
    /// Qdrant server URL
    pub url: String,
    /// Environment variable holding the API key, if any
    pub api_key_env: Option<String>,
}

impl Default for QdrantSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_string(),
            api_key_env: None,
        }
    }
}

/// Local storage settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageSettings {
    /// Data directory; defaults to the platform data dir + "repolens"
    pub data_dir: Option<PathBuf>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self { data_dir: None }
    }
}

impl StorageSettings {
    /// Resolve the data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("repolens")
        })
    }

    /// Path of the persisted sync state file.
    pub fn state_path(&self) -> PathBuf {
        self.data_dir().join("state.json")
    }
}

/// Query ranking and session settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchSettings {
    /// Weight of the similarity score in hybrid ranking
    pub semantic_weight: f32,
    /// Weight of the keyword score in hybrid ranking
    pub keyword_weight: f32,
    /// Minimum similarity for semantic-only hybrid results
    pub semantic_threshold: f32,
    /// Queries shorter than this are forced into keyword mode
    pub min_semantic_len: usize,
    /// Debounce delay between keystroke and dispatch, in milliseconds
    pub debounce_ms: u64,
    /// Maximum results per query
    pub limit: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            semantic_weight: 0.7,
            keyword_weight: 0.3,
            semantic_threshold: 0.4,
            min_semantic_len: 3,
            debounce_ms: 500,
            limit: 25,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default log filter (overridden by RUST_LOG)
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RepolensConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.embedding.batch_size, 10);
        assert_eq!(config.search.debounce_ms, 500);
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let mut config = RepolensConfig::default();
        config.embedding.dimension = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_out_of_range_weight_rejected() {
        let mut config = RepolensConfig::default();
        config.search.semantic_weight = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_state_path_under_data_dir() {
        let settings = StorageSettings {
            data_dir: Some(PathBuf::from("/tmp/repolens-test")),
        };
        assert_eq!(
            settings.state_path(),
            PathBuf::from("/tmp/repolens-test/state.json")
        );
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: RepolensConfig = toml::from_str(
            r#"
            [embedding]
            model = "custom-model"
            dimension = 768
            "#,
        )
        .unwrap();

        assert_eq!(config.embedding.model, "custom-model");
        assert_eq!(config.embedding.dimension, 768);
        // Untouched sections keep their defaults
        assert_eq!(config.qdrant.url, "http://localhost:6334");
        assert_eq!(config.search.min_semantic_len, 3);
    }
}
