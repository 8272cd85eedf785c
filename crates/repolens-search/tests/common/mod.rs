//! Shared test doubles for integration tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::Notify;

use repolens_core::RepositorySnapshot;
use repolens_search::{EmbeddingProvider, MetadataProvider, Result, SearchError};

/// Scriptable metadata provider: returns a configured listing, can be made
/// to fail, and can be gated to hold a fetch open.
pub struct MockMetadata {
    repos: Mutex<Vec<RepositorySnapshot>>,
    readmes: Mutex<HashMap<String, String>>,
    failing: AtomicBool,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl MockMetadata {
    pub fn new() -> Self {
        Self {
            repos: Mutex::new(Vec::new()),
            readmes: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
            gate: Mutex::new(None),
        }
    }

    pub fn set_repos(&self, repos: Vec<RepositorySnapshot>) {
        *self.repos.lock().unwrap() = repos;
    }

    pub fn set_readme(&self, repo_id: &str, content: &str) {
        self.readmes
            .lock()
            .unwrap()
            .insert(repo_id.to_string(), content.to_string());
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make the next fetches block until the returned notify is notified.
    pub fn gate(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&notify));
        notify
    }
}

#[async_trait]
impl MetadataProvider for MockMetadata {
    async fn fetch_all(&self) -> Result<Vec<RepositorySnapshot>> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(SearchError::Fetch("mock fetch failure".into()));
        }

        Ok(self.repos.lock().unwrap().clone())
    }

    async fn fetch_readme(&self, repo_id: &str) -> Result<Option<String>> {
        Ok(self.readmes.lock().unwrap().get(repo_id).cloned())
    }
}

/// Deterministic embedding provider that counts calls; texts containing the
/// failure marker fail their whole batch.
pub struct CountingProvider {
    dimension: usize,
    calls: AtomicUsize,
    fail_marker: Option<String>,
}

impl CountingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
            fail_marker: None,
        }
    }

    pub fn failing_on(dimension: usize, marker: &str) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
            fail_marker: Some(marker.to_string()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for CountingProvider {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(marker) = &self.fail_marker {
            if texts.iter().any(|t| t.contains(marker)) {
                return Err(SearchError::ProviderUnavailable("mock provider down".into()));
            }
        }

        Ok(texts
            .iter()
            .map(|t| {
                let seed = t.bytes().map(|b| b as f32).sum::<f32>() / 1000.0;
                (0..self.dimension).map(|i| seed + i as f32).collect()
            })
            .collect())
    }

    fn model_id(&self) -> &str {
        "counting-model"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Snapshot fixture with an hour-granularity timestamp.
pub fn snapshot(id: &str, description: &str, hour: u32) -> RepositorySnapshot {
    RepositorySnapshot {
        id: id.to_string(),
        name: id.rsplit('/').next().unwrap_or(id).to_string(),
        description: Some(description.to_string()),
        topics: vec!["rust".to_string()],
        pushed_at: Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap(),
        html_url: format!("https://github.com/{}", id),
        clone_url: format!("https://github.com/{}.git", id),
        default_branch: "main".to_string(),
        private: false,
        local_path: None,
        fingerprint: String::new(),
    }
}
