//! Error types for repolens-search
//!
//! The taxonomy separates transient provider failures (retried with backoff,
//! eventually surfaced per-item) from permanent ones (surfaced immediately),
//! and index-write failures (scoped to one repository's update) from state
//! problems (which refuse the whole pass). Nothing here is process-fatal.

use thiserror::Error;

/// Errors that can occur in repolens-search operations
#[derive(Error, Debug)]
pub enum SearchError {
    /// Remote metadata fetch failed; the sync pass aborts before any mutation
    #[error("Metadata fetch failed: {0}")]
    Fetch(String),

    /// Provider rate limit hit (transient, retried with backoff)
    #[error("Provider rate limited, retry after {retry_after:?} seconds")]
    RateLimited { retry_after: Option<u64> },

    /// Provider unreachable or timing out (transient, retried with backoff)
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Authentication failed (permanent, no retry)
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Provider rejected the request (permanent, no retry)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Embedding dimension mismatch
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Embedding response could not be used
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Vector store mutation failed; aborts that repository's update only
    #[error("Index write failed: {0}")]
    IndexWrite(String),

    /// Vector store read/query failed
    #[error("Vector store error: {0}")]
    Store(String),

    /// A sync pass is already running
    #[error("A sync pass is already in progress")]
    SyncInProgress,

    /// Core error (snapshot model, persisted state)
    #[error(transparent)]
    Core(#[from] repolens_core::CoreError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SearchError {
    /// Whether this failure is worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SearchError::RateLimited { .. } | SearchError::ProviderUnavailable(_)
        )
    }
}

impl From<qdrant_client::QdrantError> for SearchError {
    fn from(err: qdrant_client::QdrantError) -> Self {
        SearchError::Store(err.to_string())
    }
}

/// Result type for repolens-search operations
pub type Result<T> = std::result::Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(SearchError::RateLimited { retry_after: None }.is_transient());
        assert!(SearchError::ProviderUnavailable("timeout".into()).is_transient());

        assert!(!SearchError::Auth("bad key".into()).is_transient());
        assert!(!SearchError::InvalidRequest("bad model".into()).is_transient());
        assert!(!SearchError::IndexWrite("upsert failed".into()).is_transient());
    }
}
