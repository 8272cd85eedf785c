//! In-memory vector index
//!
//! A [`VectorIndex`] implementation backed by a HashMap with brute-force
//! cosine similarity. Used by tests and offline runs; not intended for
//! large collections.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::Result;
use crate::schema::{RepoPayload, RepoPoint, SimilarityHit};
use crate::store::VectorIndex;

/// HashMap-backed vector index with brute-force similarity search
#[derive(Default)]
pub struct InMemoryIndex {
    points: RwLock<HashMap<String, (Vec<f32>, RepoPayload)>>,
}

impl InMemoryIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the stored payload for a repository, if present.
    pub fn payload(&self, repo_id: &str) -> Option<RepoPayload> {
        self.points
            .read()
            .expect("index lock poisoned")
            .get(repo_id)
            .map(|(_, payload)| payload.clone())
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(&self, points: Vec<RepoPoint>) -> Result<()> {
        let mut guard = self.points.write().expect("index lock poisoned");
        for point in points {
            guard.insert(point.payload.repo_id.clone(), (point.vector, point.payload));
        }
        Ok(())
    }

    async fn delete(&self, repo_ids: &[String]) -> Result<()> {
        let mut guard = self.points.write().expect("index lock poisoned");
        for id in repo_ids {
            guard.remove(id);
        }
        Ok(())
    }

    async fn query(&self, vector: Vec<f32>, limit: usize) -> Result<Vec<SimilarityHit>> {
        let guard = self.points.read().expect("index lock poisoned");

        let mut hits: Vec<SimilarityHit> = guard
            .iter()
            .map(|(repo_id, (stored, _))| SimilarityHit {
                repo_id: repo_id.clone(),
                score: cosine_similarity(&vector, stored),
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.points.read().expect("index lock poisoned").len())
    }
}

/// Cosine similarity between two vectors; zero for mismatched lengths or
/// zero-magnitude inputs.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(repo_id: &str, vector: Vec<f32>) -> RepoPoint {
        RepoPoint {
            id: RepoPoint::point_id(repo_id),
            vector,
            payload: RepoPayload {
                repo_id: repo_id.to_string(),
                name: repo_id.rsplit('/').next().unwrap_or(repo_id).to_string(),
                fingerprint: "fp".to_string(),
                model: "test-model".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_upsert_and_count() {
        let index = InMemoryIndex::new();
        index
            .upsert(vec![
                point("a/one", vec![1.0, 0.0]),
                point("a/two", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        assert_eq!(index.count().await.unwrap(), 2);

        // Upsert replaces, not duplicates
        index
            .upsert(vec![point("a/one", vec![0.5, 0.5])])
            .await
            .unwrap();
        assert_eq!(index.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_query_orders_by_similarity() {
        let index = InMemoryIndex::new();
        index
            .upsert(vec![
                point("a/aligned", vec![1.0, 0.0]),
                point("a/orthogonal", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let hits = index.query(vec![1.0, 0.0], 10).await.unwrap();
        assert_eq!(hits[0].repo_id, "a/aligned");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert!(hits[1].score < 0.01);
    }

    #[tokio::test]
    async fn test_query_respects_limit() {
        let index = InMemoryIndex::new();
        for i in 0..5 {
            index
                .upsert(vec![point(&format!("a/repo{}", i), vec![1.0, 0.0])])
                .await
                .unwrap();
        }

        let hits = index.query(vec![1.0, 0.0], 3).await.unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test]
    async fn test_delete_removes_points() {
        let index = InMemoryIndex::new();
        index
            .upsert(vec![point("a/one", vec![1.0, 0.0])])
            .await
            .unwrap();

        index.delete(&["a/one".to_string()]).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
        assert!(index.payload("a/one").is_none());
    }

    #[test]
    fn test_cosine_similarity_edge_cases() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
