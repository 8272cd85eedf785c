//! End-to-end sync pass tests over in-memory collaborators

mod common;

use std::fs;
use std::sync::Arc;

use repolens_core::{CloneProbe, StateStore};
use repolens_search::{
    HybridQueryEngine, InMemoryIndex, RepoAction, SchedulerConfig, ScoringConfig, SearchError,
    SearchMode, SearchQuery, SyncConfig, SyncEngine, SyncEvent, VectorIndex,
};
use tempfile::TempDir;

use common::{snapshot, CountingProvider, MockMetadata};

struct Harness {
    metadata: Arc<MockMetadata>,
    provider: Arc<CountingProvider>,
    index: Arc<InMemoryIndex>,
    engine: SyncEngine,
    _dir: TempDir,
}

fn harness(provider: CountingProvider) -> Harness {
    let dir = TempDir::new().unwrap();
    let metadata = Arc::new(MockMetadata::new());
    let provider = Arc::new(provider);
    let index = Arc::new(InMemoryIndex::new());

    let metadata_dyn: Arc<dyn repolens_search::MetadataProvider> = metadata.clone();
    let provider_dyn: Arc<dyn repolens_search::EmbeddingProvider> = provider.clone();
    let index_dyn: Arc<dyn VectorIndex> = index.clone();

    let engine = SyncEngine::load(
        metadata_dyn,
        provider_dyn,
        index_dyn,
        CloneProbe::new(dir.path().join("repos")),
        StateStore::new(dir.path().join("state.json")),
        SyncConfig {
            scheduler: SchedulerConfig {
                batch_size: 1,
                concurrency: 2,
            },
            readme_concurrency: 2,
        },
    )
    .unwrap();

    Harness {
        metadata,
        provider,
        index,
        engine,
        _dir: dir,
    }
}

fn state_path(harness: &Harness) -> std::path::PathBuf {
    harness._dir.path().join("state.json")
}

#[tokio::test]
async fn test_initial_pass_embeds_and_persists() {
    let h = harness(CountingProvider::new(4));
    h.metadata
        .set_repos(vec![snapshot("a/one", "first", 1), snapshot("a/two", "second", 2)]);

    let summary = h.engine.run_pass().await.unwrap();

    assert_eq!(summary.total, 2);
    assert_eq!(summary.added, 2);
    assert_eq!(summary.embedded, 2);
    assert!(!summary.has_failures());

    assert_eq!(h.index.count().await.unwrap(), 2);

    let state = h.engine.state_handle().read();
    assert_eq!(state.len(), 2);
    assert!(state.get("a/one").unwrap().has_fresh_embedding());
    assert!(state.last_synced_at.is_some());
}

#[tokio::test]
async fn test_second_pass_without_changes_is_free() {
    let h = harness(CountingProvider::new(4));
    h.metadata
        .set_repos(vec![snapshot("a/one", "first", 1), snapshot("a/two", "second", 2)]);

    h.engine.run_pass().await.unwrap();
    let calls_after_first = h.provider.calls();
    let bytes_after_first = fs::read(state_path(&h)).unwrap();

    let summary = h.engine.run_pass().await.unwrap();

    // Zero provider calls, state file byte-identical
    assert_eq!(h.provider.calls(), calls_after_first);
    assert_eq!(fs::read(state_path(&h)).unwrap(), bytes_after_first);
    assert_eq!(summary.unchanged, 2);
    assert_eq!(summary.embedded, 0);
}

#[tokio::test]
async fn test_modified_repo_with_unchanged_text_reuses_embedding() {
    let h = harness(CountingProvider::new(4));
    h.metadata.set_repos(vec![snapshot("a/one", "stable", 1)]);
    h.engine.run_pass().await.unwrap();
    let calls_after_first = h.provider.calls();

    // Newer timestamp, identical indexable text
    h.metadata.set_repos(vec![snapshot("a/one", "stable", 5)]);
    let summary = h.engine.run_pass().await.unwrap();

    assert_eq!(summary.modified, 1);
    assert_eq!(summary.reused, 1);
    assert_eq!(summary.embedded, 0);
    assert_eq!(h.provider.calls(), calls_after_first);

    // The new timestamp is persisted despite the reuse
    let state = h.engine.state_handle().read();
    assert_eq!(state.get("a/one").unwrap().snapshot.pushed_at.to_rfc3339(), "2024-06-01T05:00:00+00:00");
    assert!(state.get("a/one").unwrap().has_fresh_embedding());
}

#[tokio::test]
async fn test_modified_repo_with_changed_text_reembeds() {
    let h = harness(CountingProvider::new(4));
    h.metadata.set_repos(vec![snapshot("a/one", "before", 1)]);
    h.engine.run_pass().await.unwrap();
    let calls_after_first = h.provider.calls();

    h.metadata.set_repos(vec![snapshot("a/one", "after", 5)]);
    let summary = h.engine.run_pass().await.unwrap();

    assert_eq!(summary.embedded, 1);
    assert_eq!(summary.reused, 0);
    assert_eq!(h.provider.calls(), calls_after_first + 1);
}

#[tokio::test]
async fn test_partial_failure_isolates_the_failing_repository() {
    let h = harness(CountingProvider::failing_on(4, "poison"));
    h.metadata.set_repos(vec![
        snapshot("a/x", "poison pill", 1),
        snapshot("a/y", "healthy", 1),
    ]);

    let summary = h.engine.run_pass().await.unwrap();

    // Exactly one per-repository failure, for X
    assert_eq!(summary.failed, vec!["a/x".to_string()]);
    assert_eq!(summary.embedded, 1);

    let state = h.engine.state_handle().read();

    // Y fully persisted with its embedding
    assert!(state.get("a/y").unwrap().has_fresh_embedding());

    // X's metadata persisted, embedding left stale
    let x = state.get("a/x").unwrap();
    assert_eq!(x.snapshot.description.as_deref(), Some("poison pill"));
    assert!(!x.has_fresh_embedding());

    assert_eq!(h.index.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_failed_repo_retries_on_next_pass() {
    let h = harness(CountingProvider::failing_on(4, "poison"));
    h.metadata.set_repos(vec![snapshot("a/x", "poison pill", 1)]);
    h.engine.run_pass().await.unwrap();

    // Upstream changes again and the text no longer trips the provider
    h.metadata.set_repos(vec![snapshot("a/x", "cured", 5)]);
    let summary = h.engine.run_pass().await.unwrap();

    assert!(summary.failed.is_empty());
    assert!(h
        .engine
        .state_handle()
        .read()
        .get("a/x")
        .unwrap()
        .has_fresh_embedding());
}

#[tokio::test]
async fn test_removed_repo_is_deleted_from_index_and_state() {
    let h = harness(CountingProvider::new(4));
    h.metadata
        .set_repos(vec![snapshot("a/keep", "kept", 1), snapshot("a/drop", "dropped", 1)]);
    h.engine.run_pass().await.unwrap();
    assert_eq!(h.index.count().await.unwrap(), 2);

    h.metadata.set_repos(vec![snapshot("a/keep", "kept", 1)]);
    let summary = h.engine.run_pass().await.unwrap();

    assert_eq!(summary.removed, 1);
    assert_eq!(h.index.count().await.unwrap(), 1);

    let state = h.engine.state_handle().read();
    assert_eq!(state.len(), 1);
    assert!(state.get("a/drop").is_none());
}

#[tokio::test]
async fn test_fetch_failure_aborts_without_mutation() {
    let h = harness(CountingProvider::new(4));
    h.metadata.set_repos(vec![snapshot("a/one", "first", 1)]);
    h.engine.run_pass().await.unwrap();
    let bytes_after_first = fs::read(state_path(&h)).unwrap();

    h.metadata.set_failing(true);
    let result = h.engine.run_pass().await;

    assert!(matches!(result, Err(SearchError::Fetch(_))));
    assert_eq!(h.provider.calls(), 1);
    assert_eq!(h.index.count().await.unwrap(), 1);
    assert_eq!(fs::read(state_path(&h)).unwrap(), bytes_after_first);
}

#[tokio::test]
async fn test_concurrent_pass_is_refused() {
    let h = harness(CountingProvider::new(4));
    h.metadata.set_repos(vec![snapshot("a/one", "first", 1)]);

    // Hold the first pass open inside its fetch
    let gate = h.metadata.gate();
    let engine = Arc::new(h.engine);

    let first = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.run_pass().await })
    };

    // Give the first pass time to take the lock
    tokio::task::yield_now().await;

    let second = engine.run_pass().await;
    assert!(matches!(second, Err(SearchError::SyncInProgress)));

    gate.notify_one();
    first.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_progress_events_bracket_the_pass() {
    let h = harness(CountingProvider::new(4));
    h.metadata.set_repos(vec![snapshot("a/one", "first", 1)]);
    let mut events = h.engine.subscribe();

    h.engine.run_pass().await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }

    assert!(matches!(seen.first(), Some(SyncEvent::Started)));
    assert!(matches!(seen.last(), Some(SyncEvent::Completed(_))));
    assert!(seen.iter().any(|e| matches!(
        e,
        SyncEvent::Repo(outcome) if outcome.repo_id == "a/one" && outcome.action == RepoAction::Embedded
    )));
}

#[tokio::test]
async fn test_readme_content_reaches_the_embedding_text() {
    let h = harness(CountingProvider::new(4));
    h.metadata.set_repos(vec![snapshot("a/one", "desc", 1)]);
    h.metadata.set_readme("a/one", "# The readme");

    h.engine.run_pass().await.unwrap();
    let with_readme = h
        .engine
        .state_handle()
        .read()
        .get("a/one")
        .unwrap()
        .snapshot
        .fingerprint
        .clone();

    // Same repo, no readme available: different fingerprint
    let h2 = harness(CountingProvider::new(4));
    h2.metadata.set_repos(vec![snapshot("a/one", "desc", 1)]);
    h2.engine.run_pass().await.unwrap();
    let without_readme = h2
        .engine
        .state_handle()
        .read()
        .get("a/one")
        .unwrap()
        .snapshot
        .fingerprint
        .clone();

    assert_ne!(with_readme, without_readme);
}

#[tokio::test]
async fn test_query_after_sync_sees_committed_state() {
    let h = harness(CountingProvider::new(4));
    h.metadata.set_repos(vec![
        snapshot("a/search-engine", "a hybrid search engine", 1),
        snapshot("a/game", "a puzzle game", 2),
    ]);
    h.engine.run_pass().await.unwrap();

    let provider: Arc<dyn repolens_search::EmbeddingProvider> = h.provider.clone();
    let index: Arc<dyn VectorIndex> = h.index.clone();
    let query_engine = HybridQueryEngine::new(
        provider,
        index,
        h.engine.state_handle(),
        ScoringConfig::default(),
    );

    let results = query_engine
        .search(&SearchQuery::new("search engine", SearchMode::Hybrid), 10)
        .await
        .unwrap();

    assert!(!results.is_empty());
    assert_eq!(results[0].repo_id, "a/search-engine");
    // Both repositories carry fresh embeddings, so both score semantically
    assert!(results.iter().all(|r| r.semantic_score.is_some()));
}
