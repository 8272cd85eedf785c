//! Index synchronizer: one sync pass, applied atomically
//!
//! [`SyncEngine::run_pass`] drives a full pass: fetch the remote listing,
//! probe local clones, classify changes, schedule embeddings, apply vector
//! store mutations, and finally commit the new [`SyncState`] with an atomic
//! file replace. Per-repository failures are accounted in the pass summary
//! instead of aborting; a fetch failure aborts before any mutation.
//!
//! Two passes never run concurrently (single-pass lock). Queries run
//! against [`StateHandle`], which always returns the last fully-committed
//! state, never a mid-pass partial one.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use repolens_core::{detect_changes, CloneProbe, RepositorySnapshot, StateStore, SyncState};

use crate::error::{Result, SearchError};
use crate::provider::EmbeddingProvider;
use crate::remote::MetadataProvider;
use crate::scheduler::{EmbeddingScheduler, SchedulerConfig};
use crate::schema::{RepoPayload, RepoPoint};
use crate::store::VectorIndex;

/// Points per vector-store upsert call
const UPSERT_CHUNK: usize = 100;

/// Read handle over the last fully-committed sync state.
///
/// Cloning is cheap; `read` returns an `Arc` of the committed state, so a
/// query holds a consistent view for its whole lifetime even if a pass
/// commits mid-query.
#[derive(Clone)]
pub struct StateHandle {
    inner: Arc<RwLock<Arc<SyncState>>>,
}

impl StateHandle {
    /// Create a handle over an initial state.
    pub fn new(state: SyncState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(state))),
        }
    }

    /// Get the last fully-committed state.
    pub fn read(&self) -> Arc<SyncState> {
        self.inner.read().expect("state lock poisoned").clone()
    }

    fn replace(&self, state: SyncState) {
        *self.inner.write().expect("state lock poisoned") = Arc::new(state);
    }
}

/// What happened to one repository during a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoAction {
    /// New embedding generated and stored
    Embedded,
    /// Stored embedding reused (fingerprint match)
    Reused,
    /// Metadata persisted but the embedding stayed stale
    MetadataOnly,
    /// Removed from index and state
    Removed,
}

/// Per-repository progress event payload
#[derive(Debug, Clone)]
pub struct RepoOutcome {
    /// Repository identifier
    pub repo_id: String,
    /// Action taken
    pub action: RepoAction,
    /// Failure reason when the action degraded to metadata-only or a
    /// removal could not be applied
    pub error: Option<String>,
}

/// Summary of one sync pass
#[derive(Debug, Clone, Default)]
pub struct SyncSummary {
    /// Repositories in the fresh fetch
    pub total: usize,
    /// Newly seen repositories
    pub added: usize,
    /// Repositories with a newer upstream timestamp
    pub modified: usize,
    /// Repositories no longer present upstream
    pub removed: usize,
    /// Repositories with no upstream change
    pub unchanged: usize,
    /// Embeddings newly generated this pass
    pub embedded: usize,
    /// Embeddings reused via fingerprint match
    pub reused: usize,
    /// Identifiers with per-repository failures this pass
    pub failed: Vec<String>,
}

impl SyncSummary {
    /// Whether any per-repository failure occurred.
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Progress events emitted during a pass
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A pass started
    Started,
    /// One repository was processed
    Repo(RepoOutcome),
    /// The pass finished
    Completed(SyncSummary),
}

/// Sync engine tuning knobs
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    /// Embedding scheduler settings
    pub scheduler: SchedulerConfig,
    /// Concurrent remote README fetches
    pub readme_concurrency: usize,
}

impl SyncConfig {
    fn readme_concurrency(&self) -> usize {
        if self.readme_concurrency == 0 {
            8
        } else {
            self.readme_concurrency
        }
    }
}

/// Owns the sync state and is its only writer.
///
/// All other components hold read-only [`StateHandle`] clones.
pub struct SyncEngine {
    metadata: Arc<dyn MetadataProvider>,
    index: Arc<dyn VectorIndex>,
    probe: CloneProbe,
    store: StateStore,
    state: StateHandle,
    scheduler: EmbeddingScheduler,
    readme_concurrency: usize,
    pass_lock: tokio::sync::Mutex<()>,
    events: Mutex<Option<mpsc::UnboundedSender<SyncEvent>>>,
}

impl SyncEngine {
    /// Load the persisted state and build the engine.
    ///
    /// Fails with [`repolens_core::CoreError::StateCorruption`] when the
    /// state file exists but cannot be read; the sync pass must not run on
    /// unknown ground. The file is left in place for inspection.
    pub fn load(
        metadata: Arc<dyn MetadataProvider>,
        provider: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        probe: CloneProbe,
        store: StateStore,
        config: SyncConfig,
    ) -> Result<Self> {
        let state = store.load()?;
        let readme_concurrency = config.readme_concurrency();

        Ok(Self {
            metadata,
            index,
            probe,
            store,
            state: StateHandle::new(state),
            scheduler: EmbeddingScheduler::new(provider, config.scheduler),
            readme_concurrency,
            pass_lock: tokio::sync::Mutex::new(()),
            events: Mutex::new(None),
        })
    }

    /// Read handle for the query engine and UI.
    pub fn state_handle(&self) -> StateHandle {
        self.state.clone()
    }

    /// Subscribe to progress events. Replaces any previous subscriber.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SyncEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.events.lock().expect("events lock poisoned") = Some(tx);
        rx
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(tx) = self.events.lock().expect("events lock poisoned").as_ref() {
            // A dropped receiver just means nobody is listening
            let _ = tx.send(event);
        }
    }

    /// Run one sync pass to completion.
    ///
    /// Returns [`SearchError::SyncInProgress`] when another pass holds the
    /// lock. A fetch failure aborts before any mutation; per-repository
    /// failures are collected into the summary.
    pub async fn run_pass(&self) -> Result<SyncSummary> {
        let _guard = self
            .pass_lock
            .try_lock()
            .map_err(|_| SearchError::SyncInProgress)?;

        self.emit(SyncEvent::Started);
        let previous = self.state.read();

        let mut fetched = self.metadata.fetch_all().await?;
        info!("Fetched {} repositories", fetched.len());

        for snapshot in &mut fetched {
            snapshot.local_path = self.probe.locate(&snapshot.name);
        }

        let report = detect_changes(&previous, &fetched);
        info!(
            "Change detection: {} added, {} modified, {} removed, {} unchanged",
            report.added.len(),
            report.modified.len(),
            report.removed.len(),
            report.unchanged.len()
        );

        let mut summary = SyncSummary {
            total: fetched.len(),
            added: report.added.len(),
            modified: report.modified.len(),
            removed: report.removed.len(),
            unchanged: report.unchanged.len(),
            ..Default::default()
        };

        if !report.has_changes() {
            // Nothing to apply; the persisted state stays byte-identical
            info!("No changes detected, index is up to date");
            self.emit(SyncEvent::Completed(summary.clone()));
            return Ok(summary);
        }

        let mut to_index: Vec<RepositorySnapshot> = report.to_index().cloned().collect();
        let readmes = self.resolve_readmes(&to_index).await;

        let outcome = self.scheduler.run(&mut to_index, &readmes, &previous).await;
        summary.reused = outcome.reused.len();

        // Vector store mutations, accounted per repository
        let (stored, upsert_failures) = self.apply_upserts(&to_index, outcome.records).await;
        let delete_failures = self.apply_deletes(&report.removed).await;

        let reused: HashSet<&str> = outcome.reused.iter().map(String::as_str).collect();
        let mut errors: HashMap<String, String> = HashMap::new();
        for failure in &outcome.failures {
            errors.insert(failure.repo_id.clone(), failure.error.clone());
        }
        for (repo_id, reason) in upsert_failures {
            errors.insert(repo_id, reason);
        }

        // Build the next state from the previous one
        let mut next = SyncState {
            repos: previous.repos.clone(),
            last_synced_at: previous.last_synced_at,
        };

        for snapshot in to_index {
            let repo_id = snapshot.id.clone();
            let previous_entry = previous.get(&repo_id);

            let (action, entry) = if let Some(model) = stored.get(&repo_id) {
                summary.embedded += 1;
                (
                    RepoAction::Embedded,
                    repolens_core::RepoEntry {
                        embedded_fingerprint: Some(snapshot.fingerprint.clone()),
                        embedding_model: Some(model.clone()),
                        snapshot,
                    },
                )
            } else if reused.contains(repo_id.as_str()) {
                (
                    RepoAction::Reused,
                    repolens_core::RepoEntry {
                        embedded_fingerprint: previous_entry
                            .and_then(|e| e.embedded_fingerprint.clone()),
                        embedding_model: previous_entry.and_then(|e| e.embedding_model.clone()),
                        snapshot,
                    },
                )
            } else {
                // Embedding failed: persist the changed metadata, keep the
                // previous (possibly absent) embedding so it reads as stale
                summary.failed.push(repo_id.clone());
                (
                    RepoAction::MetadataOnly,
                    repolens_core::RepoEntry {
                        embedded_fingerprint: previous_entry
                            .and_then(|e| e.embedded_fingerprint.clone()),
                        embedding_model: previous_entry.and_then(|e| e.embedding_model.clone()),
                        snapshot,
                    },
                )
            };

            self.emit(SyncEvent::Repo(RepoOutcome {
                repo_id: repo_id.clone(),
                action,
                error: errors.get(&repo_id).cloned(),
            }));
            next.repos.insert(repo_id, entry);
        }

        for repo_id in &report.removed {
            if let Some(reason) = delete_failures.get(repo_id) {
                // Keep the entry so state and index stay consistent
                summary.failed.push(repo_id.clone());
                self.emit(SyncEvent::Repo(RepoOutcome {
                    repo_id: repo_id.clone(),
                    action: RepoAction::Removed,
                    error: Some(reason.clone()),
                }));
            } else {
                next.repos.remove(repo_id);
                self.emit(SyncEvent::Repo(RepoOutcome {
                    repo_id: repo_id.clone(),
                    action: RepoAction::Removed,
                    error: None,
                }));
            }
        }

        next.last_synced_at = Some(Utc::now());

        // Commit is the linearization point: on failure the previous state
        // stays both on disk and in the read handle
        self.store.commit(&next)?;
        self.state.replace(next);

        info!(
            "Sync pass complete: {} embedded, {} reused, {} failed",
            summary.embedded,
            summary.reused,
            summary.failed.len()
        );
        self.emit(SyncEvent::Completed(summary.clone()));

        Ok(summary)
    }

    /// Resolve README content for the snapshots being indexed: local clone
    /// first, remote fetch second, bounded concurrency for the remote part.
    async fn resolve_readmes(
        &self,
        snapshots: &[RepositorySnapshot],
    ) -> HashMap<String, String> {
        let mut readmes = HashMap::new();
        let mut remote_ids = Vec::new();

        for snapshot in snapshots {
            match snapshot
                .local_path
                .as_deref()
                .and_then(|path| self.probe.read_readme(path))
            {
                Some(content) => {
                    readmes.insert(snapshot.id.clone(), content);
                }
                None => remote_ids.push(snapshot.id.clone()),
            }
        }

        if remote_ids.is_empty() {
            return readmes;
        }

        debug!("Fetching {} remote READMEs", remote_ids.len());
        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.readme_concurrency));
        let mut tasks: JoinSet<(String, Option<String>)> = JoinSet::new();

        for repo_id in remote_ids {
            let metadata = Arc::clone(&self.metadata);
            let semaphore = Arc::clone(&semaphore);

            tasks.spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                match metadata.fetch_readme(&repo_id).await {
                    Ok(content) => (repo_id, content),
                    Err(e) => {
                        // A missing README only degrades the indexable text
                        debug!("README fetch failed for '{}': {}", repo_id, e);
                        (repo_id, None)
                    }
                }
            });
        }

        while let Some(Ok((repo_id, content))) = tasks.join_next().await {
            if let Some(content) = content {
                readmes.insert(repo_id, content);
            }
        }

        readmes
    }

    /// Upsert embedding records; returns the successfully stored repo ids
    /// (with their model) and per-repository failures.
    async fn apply_upserts(
        &self,
        snapshots: &[RepositorySnapshot],
        records: Vec<crate::scheduler::EmbeddingRecord>,
    ) -> (HashMap<String, String>, Vec<(String, String)>) {
        let names: HashMap<&str, &str> = snapshots
            .iter()
            .map(|s| (s.id.as_str(), s.name.as_str()))
            .collect();

        let mut stored = HashMap::new();
        let mut failures = Vec::new();

        for chunk in records.chunks(UPSERT_CHUNK) {
            let points: Vec<RepoPoint> = chunk
                .iter()
                .map(|record| RepoPoint {
                    id: RepoPoint::point_id(&record.repo_id),
                    vector: record.vector.clone(),
                    payload: RepoPayload {
                        repo_id: record.repo_id.clone(),
                        name: names
                            .get(record.repo_id.as_str())
                            .map(|n| n.to_string())
                            .unwrap_or_default(),
                        fingerprint: record.fingerprint.clone(),
                        model: record.model.clone(),
                    },
                })
                .collect();

            match self.index.upsert(points).await {
                Ok(()) => {
                    for record in chunk {
                        stored.insert(record.repo_id.clone(), record.model.clone());
                    }
                }
                Err(e) => {
                    warn!("Upsert of {} points failed: {}", chunk.len(), e);
                    let reason = e.to_string();
                    for record in chunk {
                        failures.push((record.repo_id.clone(), reason.clone()));
                    }
                }
            }
        }

        (stored, failures)
    }

    /// Delete removed repositories from the index; returns per-repository
    /// failures for entries that must be kept.
    async fn apply_deletes(&self, removed: &[String]) -> HashMap<String, String> {
        if removed.is_empty() {
            return HashMap::new();
        }

        match self.index.delete(removed).await {
            Ok(()) => HashMap::new(),
            Err(e) => {
                warn!("Delete of {} repositories failed: {}", removed.len(), e);
                let reason = e.to_string();
                removed
                    .iter()
                    .map(|id| (id.clone(), reason.clone()))
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_handle_returns_committed_state() {
        let handle = StateHandle::new(SyncState::new());
        let before = handle.read();
        assert!(before.is_empty());

        let mut next = SyncState::new();
        next.last_synced_at = Some(Utc::now());
        handle.replace(next);

        // The old Arc still sees the old state; new reads see the new one
        assert!(before.last_synced_at.is_none());
        assert!(handle.read().last_synced_at.is_some());
    }

    #[test]
    fn test_summary_failure_flag() {
        let mut summary = SyncSummary::default();
        assert!(!summary.has_failures());

        summary.failed.push("a/broken".to_string());
        assert!(summary.has_failures());
    }

    #[test]
    fn test_readme_concurrency_default() {
        let config = SyncConfig::default();
        assert_eq!(config.readme_concurrency(), 8);

        let config = SyncConfig {
            readme_concurrency: 3,
            ..Default::default()
        };
        assert_eq!(config.readme_concurrency(), 3);
    }
}
