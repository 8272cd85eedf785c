//! Vector index abstraction and Qdrant implementation
//!
//! The core treats the vector store as a black box exposing upsert, delete,
//! and nearest-neighbor query; [`VectorIndex`] is that box's seam. The
//! Qdrant implementation keeps one collection of repository points, keyed
//! by a stable hash of the repository identifier. An in-memory
//! implementation for tests and offline use lives in [`crate::memory`].

use async_trait::async_trait;
use qdrant_client::qdrant::{
    vectors_config::Config, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
    DeletePointsBuilder, Distance, FieldType, PointStruct, PointsIdsList, SearchPointsBuilder,
    UpsertPointsBuilder, VectorParams, VectorsConfig,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::json;
use tracing::{debug, info};

use crate::error::{Result, SearchError};
use crate::schema::{fields, RepoPoint, SimilarityHit, COLLECTION};

/// Vector index trait
///
/// Implementations must provide their own concurrency safety for reads
/// concurrent with writes; callers only assume that a read sees either the
/// pre- or post-mutation state per key.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace repository points.
    async fn upsert(&self, points: Vec<RepoPoint>) -> Result<()>;

    /// Delete the points for the given repository identifiers.
    async fn delete(&self, repo_ids: &[String]) -> Result<()>;

    /// Nearest-neighbor query; returns up to `limit` hits with similarity
    /// scores as reported by the store.
    async fn query(&self, vector: Vec<f32>, limit: usize) -> Result<Vec<SimilarityHit>>;

    /// Number of points in the index.
    async fn count(&self) -> Result<usize>;
}

/// Configuration for connecting to Qdrant
#[derive(Debug, Clone)]
pub struct QdrantConfig {
    /// Qdrant server URL (e.g. "http://localhost:6334")
    pub url: String,
    /// Optional API key for authentication
    pub api_key: Option<String>,
    /// Vector dimensionality of the collection
    pub dimension: u64,
}

impl QdrantConfig {
    /// Create config for a local Qdrant with the given dimension.
    pub fn local(dimension: u64) -> Self {
        Self {
            url: "http://localhost:6334".to_string(),
            api_key: None,
            dimension,
        }
    }

    /// Create config with a custom URL.
    pub fn with_url(url: impl Into<String>, dimension: u64) -> Self {
        Self {
            url: url.into(),
            api_key: None,
            dimension,
        }
    }
}

/// Qdrant-backed vector index for repository embeddings
pub struct QdrantIndex {
    client: Qdrant,
    dimension: u64,
}

impl QdrantIndex {
    /// Connect to Qdrant and ensure the repository collection exists.
    pub async fn connect(config: QdrantConfig) -> Result<Self> {
        info!("Connecting to Qdrant at {}", config.url);

        let mut builder = Qdrant::from_url(&config.url);
        if let Some(api_key) = config.api_key {
            builder = builder.api_key(api_key);
        }

        let client = builder
            .build()
            .map_err(|e| SearchError::Store(format!("Failed to build Qdrant client: {}", e)))?;

        let index = Self {
            client,
            dimension: config.dimension,
        };
        index.ensure_collection().await?;

        Ok(index)
    }

    /// Create the repository collection if it does not exist.
    async fn ensure_collection(&self) -> Result<()> {
        if self.client.collection_exists(COLLECTION).await? {
            debug!("Collection '{}' already exists", COLLECTION);
            return Ok(());
        }

        info!(
            "Creating collection '{}' (dim={}, distance=Cosine)",
            COLLECTION, self.dimension
        );

        let vectors_config = VectorsConfig {
            config: Some(Config::Params(VectorParams {
                size: self.dimension,
                distance: Distance::Cosine.into(),
                ..Default::default()
            })),
        };

        self.client
            .create_collection(
                CreateCollectionBuilder::new(COLLECTION).vectors_config(vectors_config),
            )
            .await?;

        // Index repo_id for delete-by-identifier
        self.client
            .create_field_index(CreateFieldIndexCollectionBuilder::new(
                COLLECTION,
                fields::REPO_ID,
                FieldType::Keyword,
            ))
            .await?;

        Ok(())
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn upsert(&self, points: Vec<RepoPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        debug!("Upserting {} points to '{}'", points.len(), COLLECTION);

        let qdrant_points: Vec<PointStruct> = points
            .into_iter()
            .map(|p| {
                let payload = Payload::try_from(json!({
                    fields::REPO_ID: p.payload.repo_id,
                    fields::NAME: p.payload.name,
                    fields::FINGERPRINT: p.payload.fingerprint,
                    fields::MODEL: p.payload.model,
                }))
                .map_err(|e| SearchError::IndexWrite(format!("Payload error: {}", e)))?;

                Ok(PointStruct::new(p.id, p.vector, payload))
            })
            .collect::<Result<Vec<_>>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(COLLECTION, qdrant_points).wait(true))
            .await
            .map_err(|e| SearchError::IndexWrite(e.to_string()))?;

        Ok(())
    }

    async fn delete(&self, repo_ids: &[String]) -> Result<()> {
        if repo_ids.is_empty() {
            return Ok(());
        }

        debug!("Deleting {} points from '{}'", repo_ids.len(), COLLECTION);

        let ids: Vec<_> = repo_ids
            .iter()
            .map(|id| RepoPoint::point_id(id).into())
            .collect();

        self.client
            .delete_points(
                DeletePointsBuilder::new(COLLECTION)
                    .points(PointsIdsList { ids })
                    .wait(true),
            )
            .await
            .map_err(|e| SearchError::IndexWrite(e.to_string()))?;

        Ok(())
    }

    async fn query(&self, vector: Vec<f32>, limit: usize) -> Result<Vec<SimilarityHit>> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(COLLECTION, vector, limit as u64).with_payload(true),
            )
            .await?;

        let hits = response
            .result
            .into_iter()
            .filter_map(|point| {
                let repo_id = point
                    .payload
                    .get(fields::REPO_ID)
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())?;

                Some(SimilarityHit {
                    repo_id,
                    score: point.score,
                })
            })
            .collect();

        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        let info = self.client.collection_info(COLLECTION).await?;
        let count = info
            .result
            .and_then(|r| r.points_count)
            .unwrap_or_default();
        Ok(count as usize)
    }
}

