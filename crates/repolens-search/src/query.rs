//! Hybrid query engine: lexical + vector-similarity ranking
//!
//! Produces one ordered result list from two very different signals:
//! case-insensitive keyword matching over snapshot metadata (name,
//! description, topics) and nearest-neighbor similarity from the vector
//! index. Semantic scores are only trusted for repositories whose stored
//! embedding fingerprint matches their current snapshot fingerprint;
//! anything stale degrades to its keyword score instead of disappearing.
//!
//! Keyword scoring is local and synchronous. Only the query-text embedding
//! and the vector-store query may suspend, and a failure in either degrades
//! the request to keyword-only rather than erroring it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::provider::EmbeddingProvider;
use crate::store::VectorIndex;
use crate::sync::StateHandle;

/// Search mode selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchMode {
    /// Lexical matching only, no provider calls
    Keyword,
    /// Vector similarity only
    Semantic,
    /// Both signals combined (default)
    #[default]
    Hybrid,
}

/// One search request
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// Raw query text
    pub text: String,
    /// Requested mode
    pub mode: SearchMode,
    /// Monotonically increasing sequence number, used by the session
    /// controller to discard superseded completions
    pub seq: u64,
}

impl SearchQuery {
    /// Create a query in the given mode with sequence number zero.
    pub fn new(text: impl Into<String>, mode: SearchMode) -> Self {
        Self {
            text: text.into(),
            mode,
            seq: 0,
        }
    }
}

/// Snapshot field that produced a keyword match, for UI highlighting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchedField {
    /// Repository name
    Name,
    /// Description text
    Description,
    /// A topic tag
    Topic,
}

/// One ranked result
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Repository identifier
    pub repo_id: String,
    /// Display name
    pub name: String,
    /// Composite score used for ordering
    pub score: f32,
    /// Contributing lexical sub-score, if the repository matched lexically
    pub keyword_score: Option<f32>,
    /// Contributing similarity sub-score, if a non-stale embedding matched
    pub semantic_score: Option<f32>,
    /// Fields that matched lexically
    pub matched_fields: Vec<MatchedField>,
    /// Last-modified timestamp, the ordering tie-breaker
    pub pushed_at: DateTime<Utc>,
}

/// Scoring weights and thresholds
///
/// The defaults mirror the constants this engine was tuned with; they are
/// configuration, not invariants.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Weight of the similarity score when both signals are present
    pub semantic_weight: f32,
    /// Weight of the keyword score
    pub keyword_weight: f32,
    /// Minimum similarity for semantic-only results to appear in hybrid mode
    pub semantic_threshold: f32,
    /// Queries shorter than this are forced into keyword mode
    pub min_semantic_len: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            semantic_weight: 0.7,
            keyword_weight: 0.3,
            semantic_threshold: 0.4,
            min_semantic_len: 3,
        }
    }
}

/// How strongly a field matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchKind {
    Exact,
    Substring,
}

/// Hybrid query engine over the committed sync state
pub struct HybridQueryEngine {
    provider: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    state: StateHandle,
    scoring: ScoringConfig,
}

impl HybridQueryEngine {
    /// Create an engine over the given collaborators.
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        state: StateHandle,
        scoring: ScoringConfig,
    ) -> Self {
        Self {
            provider,
            index,
            state,
            scoring,
        }
    }

    /// Execute a query, producing at most `limit` ordered results.
    ///
    /// Ordering: descending composite score, ties broken by newer
    /// last-modified timestamp, then by identifier.
    pub async fn search(&self, query: &SearchQuery, limit: usize) -> Result<Vec<SearchResult>> {
        let state = self.state.read();
        let needle = query.text.trim().to_lowercase();

        // Empty query browses the full list, newest first
        if needle.is_empty() {
            let mut results: Vec<SearchResult> = state
                .snapshots()
                .map(|snapshot| SearchResult {
                    repo_id: snapshot.id.clone(),
                    name: snapshot.name.clone(),
                    score: 0.0,
                    keyword_score: None,
                    semantic_score: None,
                    matched_fields: Vec::new(),
                    pushed_at: snapshot.pushed_at,
                })
                .collect();
            results.sort_by(|a, b| {
                b.pushed_at
                    .cmp(&a.pushed_at)
                    .then_with(|| a.repo_id.cmp(&b.repo_id))
            });
            results.truncate(limit);
            return Ok(results);
        }

        // Short queries make for noisy similarity lookups
        let mut mode = query.mode;
        if mode != SearchMode::Keyword && needle.chars().count() < self.scoring.min_semantic_len {
            debug!("Query '{}' too short for semantic mode", needle);
            mode = SearchMode::Keyword;
        }

        let mut semantic_scores: HashMap<String, f32> = HashMap::new();
        if mode != SearchMode::Keyword {
            match self.semantic_scores(&query.text, limit, &state).await {
                Ok(scores) => semantic_scores = scores,
                Err(e) => {
                    // Degrade to keyword-only for this query
                    warn!("Semantic scoring failed, degrading to keyword: {}", e);
                    mode = SearchMode::Keyword;
                }
            }
        }

        let mut results = Vec::new();

        match mode {
            SearchMode::Keyword => {
                for snapshot in state.snapshots() {
                    if let Some((score, fields)) = keyword_score(snapshot, &needle) {
                        results.push(SearchResult {
                            repo_id: snapshot.id.clone(),
                            name: snapshot.name.clone(),
                            score,
                            keyword_score: Some(score),
                            semantic_score: None,
                            matched_fields: fields,
                            pushed_at: snapshot.pushed_at,
                        });
                    }
                }
            }
            SearchMode::Semantic => {
                for snapshot in state.snapshots() {
                    if let Some(&similarity) = semantic_scores.get(&snapshot.id) {
                        results.push(SearchResult {
                            repo_id: snapshot.id.clone(),
                            name: snapshot.name.clone(),
                            score: similarity,
                            keyword_score: None,
                            semantic_score: Some(similarity),
                            matched_fields: Vec::new(),
                            pushed_at: snapshot.pushed_at,
                        });
                    }
                }
            }
            SearchMode::Hybrid => {
                for snapshot in state.snapshots() {
                    let keyword = keyword_score(snapshot, &needle);
                    let semantic = semantic_scores.get(&snapshot.id).copied();

                    let (score, keyword_sub, fields) = match (&keyword, semantic) {
                        (Some((kw, fields)), Some(sim)) => (
                            self.scoring.semantic_weight * sim
                                + self.scoring.keyword_weight * kw,
                            Some(*kw),
                            fields.clone(),
                        ),
                        (Some((kw, fields)), None) => {
                            // Lexical hit without a usable embedding still
                            // appears, just with the keyword weight alone
                            (self.scoring.keyword_weight * kw, Some(*kw), fields.clone())
                        }
                        (None, Some(sim)) if sim >= self.scoring.semantic_threshold => {
                            (self.scoring.semantic_weight * sim, None, Vec::new())
                        }
                        _ => continue,
                    };

                    results.push(SearchResult {
                        repo_id: snapshot.id.clone(),
                        name: snapshot.name.clone(),
                        score,
                        keyword_score: keyword_sub,
                        semantic_score: semantic,
                        matched_fields: fields,
                        pushed_at: snapshot.pushed_at,
                    });
                }
            }
        }

        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.pushed_at.cmp(&a.pushed_at))
                .then_with(|| a.repo_id.cmp(&b.repo_id))
        });
        results.truncate(limit);

        Ok(results)
    }

    /// Embed the query text and collect non-stale similarity scores.
    async fn semantic_scores(
        &self,
        text: &str,
        limit: usize,
        state: &repolens_core::SyncState,
    ) -> Result<HashMap<String, f32>> {
        let mut vectors = self.provider.embed(vec![text.to_string()]).await?;
        let vector = vectors
            .pop()
            .ok_or_else(|| crate::error::SearchError::Embedding("No embedding returned".into()))?;

        // Larger pool than the result limit so stale hits can be filtered
        // without starving the ranking
        let pool = std::cmp::max(50, limit * 4);
        let hits = self.index.query(vector, pool).await?;

        let mut scores = HashMap::new();
        for hit in hits {
            let fresh = state
                .get(&hit.repo_id)
                .map(|entry| entry.has_fresh_embedding())
                .unwrap_or(false);

            if fresh {
                scores.insert(hit.repo_id, hit.score.clamp(0.0, 1.0));
            } else {
                debug!("Skipping stale embedding for '{}'", hit.repo_id);
            }
        }

        Ok(scores)
    }
}

/// Score a snapshot's lexical match against a lowercased needle.
///
/// Exact full-field matches outweigh substring matches; multiple matching
/// fields accumulate, capped at 1.0. Returns `None` when nothing matches.
fn keyword_score(
    snapshot: &repolens_core::RepositorySnapshot,
    needle: &str,
) -> Option<(f32, Vec<MatchedField>)> {
    let tokens: Vec<&str> = if needle.contains(char::is_whitespace) {
        needle.split_whitespace().collect()
    } else {
        Vec::new()
    };

    let mut score: f32 = 0.0;
    let mut fields = Vec::new();

    match match_field(&snapshot.name, needle, &tokens) {
        Some(MatchKind::Exact) => {
            score += 1.0;
            fields.push(MatchedField::Name);
        }
        Some(MatchKind::Substring) => {
            score += 0.6;
            fields.push(MatchedField::Name);
        }
        None => {}
    }

    if let Some(description) = &snapshot.description {
        match match_field(description, needle, &tokens) {
            Some(MatchKind::Exact) => {
                score += 0.8;
                fields.push(MatchedField::Description);
            }
            Some(MatchKind::Substring) => {
                score += 0.4;
                fields.push(MatchedField::Description);
            }
            None => {}
        }
    }

    let topic_match = snapshot
        .topics
        .iter()
        .filter_map(|topic| match_field(topic, needle, &tokens))
        .max_by_key(|kind| matches!(kind, MatchKind::Exact));
    match topic_match {
        Some(MatchKind::Exact) => {
            score += 0.8;
            fields.push(MatchedField::Topic);
        }
        Some(MatchKind::Substring) => {
            score += 0.3;
            fields.push(MatchedField::Topic);
        }
        None => {}
    }

    if fields.is_empty() {
        None
    } else {
        Some((score.min(1.0), fields))
    }
}

/// Match one field against the needle: exact, substring, or all-tokens.
fn match_field(text: &str, needle: &str, tokens: &[&str]) -> Option<MatchKind> {
    let lower = text.to_lowercase();

    if lower == needle {
        Some(MatchKind::Exact)
    } else if lower.contains(needle) {
        Some(MatchKind::Substring)
    } else if !tokens.is_empty() && tokens.iter().all(|t| lower.contains(t)) {
        Some(MatchKind::Substring)
    } else {
        None
    }
}
