//! Persisted sync state with atomic replace-on-commit
//!
//! [`SyncState`] is the durable record of the last successfully applied sync
//! pass: one entry per repository, keyed by identifier, plus the timestamp
//! of the last successful pass. The file on disk is only ever replaced
//! whole (write to a temp file, fsync, rename), never mutated in place, so
//! a crash mid-commit leaves the previous state intact.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CoreError, Result};
use crate::snapshot::RepositorySnapshot;

/// One persisted repository entry: the snapshot plus the durable residue of
/// its embedding (the vector itself lives in the vector store).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoEntry {
    /// Last synchronized snapshot
    pub snapshot: RepositorySnapshot,
    /// Fingerprint the stored embedding was derived from, if any.
    /// A mismatch with `snapshot.fingerprint` marks the embedding stale.
    #[serde(default)]
    pub embedded_fingerprint: Option<String>,
    /// Model identifier that produced the stored embedding
    #[serde(default)]
    pub embedding_model: Option<String>,
}

impl RepoEntry {
    /// Whether the stored embedding matches the snapshot's current
    /// fingerprint and may be trusted for semantic ranking.
    pub fn has_fresh_embedding(&self) -> bool {
        match &self.embedded_fingerprint {
            Some(embedded) => {
                self.snapshot.has_fingerprint() && *embedded == self.snapshot.fingerprint
            }
            None => false,
        }
    }
}

/// Process-wide sync state, persisted between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    /// Repositories from the last successful pass, keyed by identifier
    #[serde(default)]
    pub repos: BTreeMap<String, RepoEntry>,
    /// Completion time of the last successful pass
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl SyncState {
    /// Create a new empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a repository entry by identifier.
    pub fn get(&self, id: &str) -> Option<&RepoEntry> {
        self.repos.get(id)
    }

    /// Number of known repositories.
    pub fn len(&self) -> usize {
        self.repos.len()
    }

    /// Whether the state has no repositories.
    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }

    /// Iterate over all snapshots.
    pub fn snapshots(&self) -> impl Iterator<Item = &RepositorySnapshot> {
        self.repos.values().map(|entry| &entry.snapshot)
    }
}

/// Durable storage for [`SyncState`].
///
/// Reads tolerate a missing file (first run) but not an unreadable one:
/// corruption is surfaced as [`CoreError::StateCorruption`] so the sync pass
/// refuses to run on unknown ground instead of silently starting over.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Create a store backed by the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted state.
    ///
    /// A missing file yields an empty state; an unparseable file yields
    /// [`CoreError::StateCorruption`].
    pub fn load(&self) -> Result<SyncState> {
        if !self.path.exists() {
            debug!("No sync state at {:?}, starting empty", self.path);
            return Ok(SyncState::new());
        }

        let bytes = fs::read(&self.path)?;
        let state: SyncState =
            serde_json::from_slice(&bytes).map_err(|e| CoreError::StateCorruption {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;

        debug!(
            "Loaded sync state: {} repositories, last synced {:?}",
            state.len(),
            state.last_synced_at
        );
        Ok(state)
    }

    /// Atomically replace the persisted state.
    ///
    /// Writes the full serialized state to a sibling temp file, syncs it,
    /// then renames over the target. Rename is atomic on the same
    /// filesystem, so readers see either the old or the new state.
    pub fn commit(&self, state: &SyncState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(state)?;

        let mut file = File::create(&tmp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, &self.path)?;

        info!(
            "Committed sync state: {} repositories -> {:?}",
            state.len(),
            self.path
        );
        Ok(())
    }
}
