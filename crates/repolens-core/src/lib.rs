//! RepoLens Core - Snapshot model, change detection, and sync state
//!
//! This crate holds the synchronous heart of the indexing pipeline:
//!
//! - [`RepositorySnapshot`] - the synchronizable state of one remote
//!   repository, with a content fingerprint over its indexable text
//! - [`detect_changes`] - pure classification of a fresh fetch against the
//!   last persisted state (unchanged / added / modified / removed)
//! - [`SyncState`] / [`StateStore`] - the durable record of the last
//!   successfully applied sync pass, replaced atomically on commit
//! - [`CloneProbe`] - local filesystem detection of cloned repositories and
//!   their README files
//!
//! Everything here is synchronous and I/O-light; network collaborators
//! (metadata fetch, embeddings, the vector store) live in `repolens-search`.

pub mod detector;
pub mod error;
pub mod probe;
pub mod snapshot;
pub mod state;

// Re-exports for convenience
pub use detector::{detect_changes, ChangeReport};
pub use error::{CoreError, Result};
pub use probe::CloneProbe;
pub use snapshot::{content_fingerprint, RepositorySnapshot, README_EXCERPT_MAX};
pub use state::{RepoEntry, StateStore, SyncState};
