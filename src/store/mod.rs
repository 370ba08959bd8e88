//! Qdrant vector database integration
//!
//! This module wraps the Qdrant client and provides:
//! - Collection management and vector-size validation
//! - Point upsert and existence checks
//! - Vector search
//!
//! `VectorCollection` is the seam the knowledge base loads through.

mod payload;

pub use payload::*;

use crate::error::{Error, Result};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, GetCollectionInfoResponse,
    GetPointsBuilder, PointId, PointStruct, SearchPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{debug, info};
use uuid::Uuid;

/// One named collection of chunk vectors
#[async_trait]
pub trait VectorCollection: Send + Sync {
    fn collection(&self) -> &str;

    /// Vector size the collection must have
    fn dimension(&self) -> usize;

    /// Ensure the collection exists with the expected vector size.
    ///
    /// Returns true when the collection had to be created. An existing
    /// collection with named vectors or a different size is an error.
    async fn ensure_collection(&self) -> Result<bool>;

    /// Delete the collection if it exists
    async fn delete_collection(&self) -> Result<bool>;

    /// Return the subset of `ids` already stored in the collection
    async fn existing_point_ids(&self, ids: &[Uuid]) -> Result<HashSet<Uuid>>;

    async fn upsert_points(&self, points: Vec<ChunkPoint>) -> Result<()>;

    /// Nearest chunks to `query_vector`, best first
    async fn search(&self, query_vector: Vec<f32>, limit: usize) -> Result<Vec<SearchResult>>;
}

/// Qdrant store handle for a single collection
pub struct QdrantStore {
    client: Qdrant,
    collection: String,
    dimension: usize,
}

impl QdrantStore {
    /// Create a new store handle. No request is made until first use.
    pub fn new(url: &str, collection: &str, dimension: usize) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", url);

        let client = Qdrant::from_url(url)
            .skip_compatibility_check()
            .build()
            .map_err(|e| Error::Qdrant(e.to_string()))?;

        Ok(Self {
            client,
            collection: collection.to_string(),
            dimension,
        })
    }
}

#[async_trait]
impl VectorCollection for QdrantStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn ensure_collection(&self) -> Result<bool> {
        if self.client.collection_exists(&self.collection).await? {
            debug!("Collection {} already exists", self.collection);

            let info = self.client.collection_info(&self.collection).await?;
            check_vector_config(&self.collection, extract_vector_sizes(&info), self.dimension)?;

            return Ok(false);
        }

        info!(
            "Creating collection {} with dimension {}",
            self.collection, self.dimension
        );

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection).vectors_config(
                    VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine),
                ),
            )
            .await?;

        Ok(true)
    }

    async fn delete_collection(&self) -> Result<bool> {
        if !self.client.collection_exists(&self.collection).await? {
            return Ok(false);
        }

        info!("Deleting collection {}", self.collection);
        self.client.delete_collection(&self.collection).await?;
        Ok(true)
    }

    async fn existing_point_ids(&self, ids: &[Uuid]) -> Result<HashSet<Uuid>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        let point_ids: Vec<PointId> = ids.iter().map(|id| PointId::from(id.to_string())).collect();
        let response = self
            .client
            .get_points(
                GetPointsBuilder::new(&self.collection, point_ids)
                    .with_payload(false)
                    .with_vectors(false),
            )
            .await?;

        Ok(response
            .result
            .iter()
            .filter_map(|p| p.id.as_ref().and_then(point_id_to_uuid))
            .collect())
    }

    /// Converts to PointStruct internally
    async fn upsert_points(&self, points: Vec<ChunkPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        if let Some(mismatch) = points.iter().find(|p| p.vector.len() != self.dimension) {
            return Err(Error::Qdrant(format!(
                "Vector dimension mismatch for collection '{}': expected {} (got {})",
                self.collection,
                self.dimension,
                mismatch.vector.len()
            )));
        }

        debug!(
            "Upserting {} points to collection {}",
            points.len(),
            self.collection
        );

        let point_structs: Vec<PointStruct> =
            points.into_iter().map(|p| p.to_point_struct()).collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, point_structs).wait(true))
            .await?;

        Ok(())
    }

    async fn search(&self, query_vector: Vec<f32>, limit: usize) -> Result<Vec<SearchResult>> {
        debug!(
            "Searching collection {} with limit {}",
            self.collection, limit
        );

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, query_vector, limit as u64)
                    .with_payload(true),
            )
            .await?;

        Ok(response
            .result
            .into_iter()
            .map(|p| {
                let map: Map<String, Value> = p
                    .payload
                    .into_iter()
                    .map(|(k, v)| (k, json_from_qdrant_value(v)))
                    .collect();

                SearchResult {
                    score: p.score,
                    payload: ChunkPayload::from_json_map(&map),
                }
            })
            .collect())
    }
}

/// Search result
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub score: f32,
    pub payload: ChunkPayload,
}

/// An existing collection is usable only with a single unnamed vector of
/// the expected size
fn check_vector_config(collection: &str, sizes: Option<Vec<(String, u64)>>, dimension: usize) -> Result<()> {
    match sizes {
        Some(sizes) if sizes.len() > 1 => Err(Error::Qdrant(format!(
            "Collection '{}' uses named vectors ({}) which are not supported",
            collection,
            describe_vector_sizes(&sizes)
        ))),
        Some(sizes) => match sizes.first() {
            Some((_, size)) if *size as usize != dimension => Err(Error::Qdrant(format!(
                "Collection '{}' has vector size {}, but the embedder produces {}",
                collection, size, dimension
            ))),
            _ => Ok(()),
        },
        None => Err(Error::Qdrant(format!(
            "Collection '{}' has no readable vector configuration",
            collection
        ))),
    }
}

fn describe_vector_sizes(sizes: &[(String, u64)]) -> String {
    sizes
        .iter()
        .map(|(name, size)| format!("{}:{}", name, size))
        .collect::<Vec<_>>()
        .join(", ")
}

fn extract_vector_sizes(info: &GetCollectionInfoResponse) -> Option<Vec<(String, u64)>> {
    let result = info.result.as_ref()?;
    let config = result.config.as_ref()?;
    let params = config.params.as_ref()?;
    let vectors_config = params.vectors_config.as_ref()?;
    let config = vectors_config.config.as_ref()?;

    match config {
        qdrant_client::qdrant::vectors_config::Config::Params(params) => {
            Some(vec![("default".to_string(), params.size)])
        }
        qdrant_client::qdrant::vectors_config::Config::ParamsMap(map) => {
            let sizes: Vec<(String, u64)> = map
                .map
                .iter()
                .map(|(name, params)| (name.clone(), params.size))
                .collect();
            if sizes.is_empty() {
                None
            } else {
                Some(sizes)
            }
        }
    }
}

/// Convert PointId to UUID
fn point_id_to_uuid(id: &PointId) -> Option<Uuid> {
    match &id.point_id_options {
        Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(uuid_str)) => {
            Uuid::try_parse(uuid_str).ok()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_point(vector: Vec<f32>) -> ChunkPoint {
        ChunkPoint {
            id: Uuid::new_v4(),
            vector,
            payload: ChunkPayload {
                doc_name: "ThaiRecipes_1".to_string(),
                doc_uri: "https://example.com/ThaiRecipes.pdf".to_string(),
                page: 1,
                chunk_index: 0,
                chunk_hash: "hash123".to_string(),
                content: "Pad see ew".to_string(),
                updated_at: "2024-01-01T00:00:00Z".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_upsert_points_rejects_dimension_mismatch() {
        let store = QdrantStore::new("http://127.0.0.1:6334", "test_collection", 3)
            .expect("store should initialize");

        let err = store
            .upsert_points(vec![sample_point(vec![0.1, 0.2])])
            .await
            .expect_err("should reject mismatched vector length");

        match err {
            Error::Qdrant(message) => assert!(message.contains("Vector dimension mismatch")),
            other => panic!("expected qdrant error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_inputs_make_no_requests() {
        // Nothing listens on this port; any request would fail
        let store = QdrantStore::new("http://127.0.0.1:1", "test_collection", 3).unwrap();
        assert!(store.upsert_points(Vec::new()).await.is_ok());
        assert!(store.existing_point_ids(&[]).await.unwrap().is_empty());
    }

    #[test]
    fn test_existing_collection_must_match_dimension() {
        let single = |size| Some(vec![("default".to_string(), size)]);

        assert!(check_vector_config("recipes", single(1536), 1536).is_ok());

        let err = check_vector_config("recipes", single(768), 1536).unwrap_err();
        assert!(matches!(err, Error::Qdrant(msg) if msg.contains("vector size 768")));

        let named = Some(vec![("text".to_string(), 1536), ("image".to_string(), 512)]);
        assert!(check_vector_config("recipes", named, 1536).is_err());
        assert!(check_vector_config("recipes", None, 1536).is_err());
    }

    #[test]
    fn test_point_id_to_uuid() {
        let id = Uuid::new_v4();
        assert_eq!(point_id_to_uuid(&PointId::from(id.to_string())), Some(id));
        assert_eq!(point_id_to_uuid(&PointId::from(7u64)), None);
    }
}
