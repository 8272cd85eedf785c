//! Error types for repolens-config

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error
    #[error("Failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    /// Semantic validation failed
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Result type for repolens-config operations
pub type Result<T> = std::result::Result<T, ConfigError>;
