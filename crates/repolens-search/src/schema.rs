//! Point and payload types for the repository vector collection

use serde::{Deserialize, Serialize};

/// Collection name used for repository embeddings
pub const COLLECTION: &str = "repositories";

/// Payload field names for indexed filtering
pub mod fields {
    /// Repository identifier (`owner/name`)
    pub const REPO_ID: &str = "repo_id";
    /// Display name
    pub const NAME: &str = "name";
    /// Content fingerprint the stored vector was derived from
    pub const FINGERPRINT: &str = "fingerprint";
    /// Embedding model identifier
    pub const MODEL: &str = "model";
}

/// Metadata payload stored alongside each repository vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoPayload {
    /// Repository identifier (`owner/name`)
    pub repo_id: String,
    /// Display name
    pub name: String,
    /// Content fingerprint the vector was derived from
    pub fingerprint: String,
    /// Embedding model identifier
    pub model: String,
}

/// A point to upsert into the repository collection
#[derive(Debug, Clone)]
pub struct RepoPoint {
    /// Unique point ID (hash of repo_id)
    pub id: u64,
    /// Vector embedding
    pub vector: Vec<f32>,
    /// Metadata payload
    pub payload: RepoPayload,
}

impl RepoPoint {
    /// Generate a stable point ID from a repository identifier.
    pub fn point_id(repo_id: &str) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        repo_id.hash(&mut hasher);
        hasher.finish()
    }
}

/// A similarity hit from a nearest-neighbor query
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityHit {
    /// Repository identifier
    pub repo_id: String,
    /// Similarity score as reported by the store
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_id_is_stable() {
        let a = RepoPoint::point_id("alice/demo");
        let b = RepoPoint::point_id("alice/demo");
        let c = RepoPoint::point_id("bob/demo");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
