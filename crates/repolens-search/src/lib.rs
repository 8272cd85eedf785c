//! RepoLens Search - Incremental semantic indexing and hybrid queries
//!
//! This crate wires the core snapshot model to its network collaborators:
//!
//! - **Providers**: [`EmbeddingProvider`] (OpenAI-compatible HTTP
//!   implementation included) and [`MetadataProvider`] (GitHub REST
//!   implementation included)
//! - **Vector index**: [`VectorIndex`] with Qdrant and in-memory backends
//! - **Sync**: [`SyncEngine`] runs one pass at a time - fetch, classify,
//!   embed with batching and backoff, mutate the index, commit state
//!   atomically - and reports progress as [`SyncEvent`]s
//! - **Query**: [`HybridQueryEngine`] merges lexical and similarity
//!   ranking; [`QuerySession`] adds per-keystroke debounce and
//!   sequence-numbered cancellation on top
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use repolens_search::{
//!     EmbeddingConfig, GithubConfig, GithubProvider, HttpEmbeddingProvider,
//!     HybridQueryEngine, QdrantConfig, QdrantIndex, ScoringConfig,
//!     SearchMode, SearchQuery, SyncConfig, SyncEngine,
//! };
//! use repolens_core::{CloneProbe, StateStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let metadata = Arc::new(GithubProvider::new(GithubConfig::new("token"))?);
//!     let provider = Arc::new(HttpEmbeddingProvider::new(
//!         EmbeddingConfig::new("https://openrouter.ai/api/v1", "text-embedding-3-small", 1536),
//!     )?);
//!     let index = Arc::new(QdrantIndex::connect(QdrantConfig::local(1536)).await?);
//!
//!     let engine = SyncEngine::load(
//!         metadata,
//!         provider.clone(),
//!         index.clone(),
//!         CloneProbe::new("/home/me/repos"),
//!         StateStore::new("/home/me/.local/share/repolens/state.json"),
//!         SyncConfig::default(),
//!     )?;
//!     engine.run_pass().await?;
//!
//!     let query_engine = HybridQueryEngine::new(
//!         provider,
//!         index,
//!         engine.state_handle(),
//!         ScoringConfig::default(),
//!     );
//!     let results = query_engine
//!         .search(&SearchQuery::new("distributed systems", SearchMode::Hybrid), 10)
//!         .await?;
//!     println!("{} results", results.len());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod memory;
pub mod provider;
pub mod query;
pub mod remote;
pub mod scheduler;
pub mod schema;
pub mod session;
pub mod store;
pub mod sync;

// Re-exports for convenience
pub use error::{Result, SearchError};
pub use memory::InMemoryIndex;
pub use provider::{EmbeddingConfig, EmbeddingProvider, HttpEmbeddingProvider};
pub use query::{
    HybridQueryEngine, MatchedField, ScoringConfig, SearchMode, SearchQuery, SearchResult,
};
pub use remote::{GithubConfig, GithubProvider, MetadataProvider};
pub use scheduler::{
    EmbeddingOutcome, EmbeddingRecord, EmbeddingScheduler, RepoFailure, SchedulerConfig,
};
pub use schema::{RepoPayload, RepoPoint, SimilarityHit, COLLECTION};
pub use session::{Debouncer, DispatchedQuery, QuerySession, SessionConfig, SessionResult};
pub use store::{QdrantConfig, QdrantIndex, VectorIndex};
pub use sync::{
    RepoAction, RepoOutcome, StateHandle, SyncConfig, SyncEngine, SyncEvent, SyncSummary,
};
