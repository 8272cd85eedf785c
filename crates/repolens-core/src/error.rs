//! Error types for repolens-core

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in repolens-core operations
#[derive(Error, Debug)]
pub enum CoreError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persisted sync state exists but cannot be read.
    ///
    /// A sync pass must refuse to run until this is resolved; the previous
    /// state file is left untouched.
    #[error("Sync state corrupted at {path}: {reason}")]
    StateCorruption { path: PathBuf, reason: String },
}

/// Result type for repolens-core operations
pub type Result<T> = std::result::Result<T, CoreError>;
