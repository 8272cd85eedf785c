//! Embedding scheduler: batching, bounded concurrency, failure isolation
//!
//! Consumes the added and modified snapshots of a sync pass. For each one
//! it assembles the indexable text, fingerprints it, and only requests an
//! embedding when no stored embedding matches the fingerprint - re-running
//! a pass with no upstream changes makes zero provider calls.
//!
//! Requests are grouped into batches and run under a concurrency limit so
//! bursts stay within provider rate limits. Retry with exponential backoff
//! for transient failures happens inside the provider; once retries are
//! exhausted, the failure is recorded per repository and the pass continues.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use repolens_core::{RepositorySnapshot, SyncState};

use crate::error::Result;
use crate::provider::EmbeddingProvider;

/// Scheduler tuning knobs
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum texts per provider request
    pub batch_size: usize,
    /// Maximum batches in flight simultaneously
    pub concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            concurrency: 4,
        }
    }
}

/// A successfully generated embedding for one repository
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    /// Owning repository identifier
    pub repo_id: String,
    /// The embedding vector
    pub vector: Vec<f32>,
    /// Model identifier that produced it
    pub model: String,
    /// Content fingerprint it was derived from
    pub fingerprint: String,
}

/// A per-repository embedding failure
#[derive(Debug, Clone)]
pub struct RepoFailure {
    /// Repository identifier
    pub repo_id: String,
    /// Human-readable failure reason
    pub error: String,
}

/// Outcome of one scheduling run
#[derive(Debug, Default)]
pub struct EmbeddingOutcome {
    /// Newly generated embeddings
    pub records: Vec<EmbeddingRecord>,
    /// Repositories whose stored embedding was reused (fingerprint match)
    pub reused: Vec<String>,
    /// Repositories whose embedding failed; their snapshots are still
    /// persisted, only the embedding stays stale
    pub failures: Vec<RepoFailure>,
}

/// One unit of pending embedding work
#[derive(Debug, Clone)]
struct PendingEmbed {
    repo_id: String,
    text: String,
    fingerprint: String,
}

/// Schedules embedding generation for changed repositories
pub struct EmbeddingScheduler {
    provider: Arc<dyn EmbeddingProvider>,
    config: SchedulerConfig,
}

impl EmbeddingScheduler {
    /// Create a scheduler over the given provider.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: SchedulerConfig) -> Self {
        Self { provider, config }
    }

    /// Fingerprint the snapshots and embed the ones whose stored embedding
    /// is missing or stale.
    ///
    /// Mutates each snapshot in place to carry its fresh fingerprint.
    /// `readmes` maps repository id to README content for repositories
    /// where one could be resolved.
    pub async fn run(
        &self,
        snapshots: &mut [RepositorySnapshot],
        readmes: &HashMap<String, String>,
        previous: &SyncState,
    ) -> EmbeddingOutcome {
        let mut outcome = EmbeddingOutcome::default();
        let mut pending: Vec<PendingEmbed> = Vec::new();

        for snapshot in snapshots.iter_mut() {
            let readme = readmes.get(&snapshot.id).map(String::as_str);
            let text = snapshot.indexable_text(readme);
            snapshot.set_fingerprint(&text);

            let reusable = previous
                .get(&snapshot.id)
                .and_then(|entry| entry.embedded_fingerprint.as_deref())
                .is_some_and(|embedded| embedded == snapshot.fingerprint);

            if reusable {
                debug!("Reusing embedding for '{}' (fingerprint match)", snapshot.id);
                outcome.reused.push(snapshot.id.clone());
            } else {
                pending.push(PendingEmbed {
                    repo_id: snapshot.id.clone(),
                    text,
                    fingerprint: snapshot.fingerprint.clone(),
                });
            }
        }

        if pending.is_empty() {
            return outcome;
        }

        info!(
            "Embedding {} repositories in batches of {} ({} reused)",
            pending.len(),
            self.config.batch_size,
            outcome.reused.len()
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks: JoinSet<(Vec<PendingEmbed>, Result<Vec<Vec<f32>>>)> = JoinSet::new();

        for batch in pending.chunks(self.config.batch_size.max(1)) {
            let batch = batch.to_vec();
            let provider = Arc::clone(&self.provider);
            let semaphore = Arc::clone(&semaphore);

            tasks.spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                let texts: Vec<String> = batch.iter().map(|p| p.text.clone()).collect();
                let result = provider.embed(texts).await;
                (batch, result)
            });
        }

        let model = self.provider.model_id().to_string();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((batch, Ok(vectors))) => {
                    if vectors.len() != batch.len() {
                        warn!(
                            "Provider returned {} embeddings for a batch of {}",
                            vectors.len(),
                            batch.len()
                        );
                    }

                    // Align by index; a short response marks the tail failed
                    let mut vectors = vectors.into_iter();
                    for item in batch {
                        match vectors.next() {
                            Some(vector) => outcome.records.push(EmbeddingRecord {
                                repo_id: item.repo_id,
                                vector,
                                model: model.clone(),
                                fingerprint: item.fingerprint,
                            }),
                            None => outcome.failures.push(RepoFailure {
                                repo_id: item.repo_id,
                                error: "provider returned no embedding for this item".to_string(),
                            }),
                        }
                    }
                }
                Ok((batch, Err(e))) => {
                    warn!("Embedding batch of {} failed: {}", batch.len(), e);
                    let reason = e.to_string();
                    for item in batch {
                        outcome.failures.push(RepoFailure {
                            repo_id: item.repo_id,
                            error: reason.clone(),
                        });
                    }
                }
                Err(join_err) => {
                    // A panicked batch task loses its repo ids; this should
                    // not happen outside provider bugs
                    warn!("Embedding task failed to join: {}", join_err);
                }
            }
        }

        info!(
            "Embedding complete: {} generated, {} reused, {} failed",
            outcome.records.len(),
            outcome.reused.len(),
            outcome.failures.len()
        );

        outcome
    }
}
