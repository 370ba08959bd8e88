//! Knowledge base: a document source embedded into a named Qdrant collection
//!
//! `load(false)` reuses whatever is already stored and only embeds chunks
//! that are missing. `load(true)` drops the collection and rebuilds it from
//! scratch. `KnowledgeProvisioner` decides which of the two to run.

mod provisioner;

pub use provisioner::*;

use crate::chunk::{chunk_text, content_hash};
use crate::config::{ChunkConfig, Config};
use crate::document::{DocumentSource, PdfUrlSource};
use crate::embed::{embed_in_batches, Embedder, OpenAiEmbedder};
use crate::error::{Error, Result};
use crate::progress::embedding_progress;
use crate::store::{ChunkPayload, ChunkPoint, QdrantStore, VectorCollection};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// What a load did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// The collection was created (or recreated) during this load
    pub created: bool,
    pub documents: usize,
    pub chunks_total: usize,
    /// Chunks that were embedded and written by this load
    pub chunks_embedded: usize,
}

/// A relevant passage returned by a knowledge search
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnowledgeHit {
    pub name: String,
    pub page: i64,
    pub score: f32,
    pub content: String,
}

/// A named, loadable partition of the vector index
#[async_trait]
pub trait EmbeddingIndex: Send + Sync {
    /// Collection name
    fn name(&self) -> &str;

    /// Bring the collection up to date. `recreate` discards existing data first.
    async fn load(&self, recreate: bool) -> Result<LoadReport>;
}

/// Search capability used by the assistant's knowledge tool
#[async_trait]
pub trait KnowledgeSearch: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<KnowledgeHit>>;
}

/// PDF documents embedded into a Qdrant collection
pub struct PdfKnowledgeBase {
    source: Box<dyn DocumentSource>,
    embedder: Arc<dyn Embedder>,
    store: Box<dyn VectorCollection>,
    chunk: ChunkConfig,
    batch_size: usize,
}

impl PdfKnowledgeBase {
    pub fn new(
        source: Box<dyn DocumentSource>,
        embedder: Arc<dyn Embedder>,
        store: Box<dyn VectorCollection>,
        chunk: ChunkConfig,
        batch_size: usize,
    ) -> Result<Self> {
        if embedder.dimension() != store.dimension() {
            return Err(Error::Embedding(format!(
                "Embedding dimension {} does not match Qdrant collection dimension {}",
                embedder.dimension(),
                store.dimension()
            )));
        }

        Ok(Self {
            source,
            embedder,
            store,
            chunk,
            batch_size,
        })
    }

    /// Wire the knowledge base from configuration. Makes no network calls.
    pub fn from_config(config: &Config) -> Result<Self> {
        let source = PdfUrlSource::new(config.pdf_urls.clone())?;
        let embedder = OpenAiEmbedder::new(config)?;
        let store = QdrantStore::new(
            &config.qdrant_url,
            &config.collection_name,
            config.embedding.resolved_dimension(),
        )?;

        Self::new(
            Box::new(source),
            Arc::new(embedder),
            Box::new(store),
            config.chunk.clone(),
            config.embedding.batch_size,
        )
    }

    /// Chunk every document and pair each chunk with its stable point id
    async fn collect_chunks(&self) -> Result<(usize, Vec<ChunkPoint>)> {
        let documents = self.source.read().await?;
        let now = Utc::now().to_rfc3339();
        let mut pending = Vec::new();

        for doc in &documents {
            let doc_hash = content_hash(&doc.text);
            for chunk in chunk_text(&doc.text, &doc_hash, &self.chunk) {
                pending.push(ChunkPoint {
                    id: ChunkPoint::point_id(&chunk.hash),
                    vector: Vec::new(),
                    payload: ChunkPayload {
                        doc_name: doc.name.clone(),
                        doc_uri: doc.uri.clone(),
                        page: doc.page as i64,
                        chunk_index: chunk.index as i64,
                        chunk_hash: chunk.hash,
                        content: chunk.text,
                        updated_at: now.clone(),
                    },
                });
            }
        }

        // Identical chunks collapse onto one point
        pending.sort_by_key(|p| p.id);
        pending.dedup_by_key(|p| p.id);

        Ok((documents.len(), pending))
    }

    async fn embed_and_upsert(&self, mut points: Vec<ChunkPoint>) -> Result<()> {
        let pb = embedding_progress(points.len() as u64, "Embedding");
        let texts: Vec<String> = points.iter().map(|p| p.payload.content.clone()).collect();
        let vectors = embed_in_batches(self.embedder.as_ref(), texts, self.batch_size, &pb).await;
        pb.finish_and_clear();
        let vectors = vectors?;

        if vectors.len() != points.len() {
            return Err(Error::Embedding(format!(
                "Expected {} embeddings, got {}",
                points.len(),
                vectors.len()
            )));
        }

        for (point, vector) in points.iter_mut().zip(vectors) {
            point.vector = vector;
        }

        for batch in points.chunks(self.batch_size.max(1) * 4) {
            self.store.upsert_points(batch.to_vec()).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl EmbeddingIndex for PdfKnowledgeBase {
    fn name(&self) -> &str {
        self.store.collection()
    }

    async fn load(&self, recreate: bool) -> Result<LoadReport> {
        if recreate {
            self.store.delete_collection().await?;
        }
        let created = self.store.ensure_collection().await?;

        let (documents, points) = self.collect_chunks().await?;
        let chunks_total = points.len();

        let missing: Vec<ChunkPoint> = if created {
            points
        } else {
            let ids: Vec<_> = points.iter().map(|p| p.id).collect();
            let existing = self.store.existing_point_ids(&ids).await?;
            debug!(
                existing = existing.len(),
                total = chunks_total,
                "Checked stored chunks"
            );
            points
                .into_iter()
                .filter(|p| !existing.contains(&p.id))
                .collect()
        };

        let chunks_embedded = missing.len();
        self.embed_and_upsert(missing).await?;

        info!(
            collection = %self.name(),
            recreate,
            documents,
            chunks = chunks_total,
            embedded = chunks_embedded,
            "Knowledge base loaded"
        );

        Ok(LoadReport {
            created,
            documents,
            chunks_total,
            chunks_embedded,
        })
    }
}

#[async_trait]
impl KnowledgeSearch for PdfKnowledgeBase {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<KnowledgeHit>> {
        let vector = self
            .embedder
            .embed(vec![query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("No embedding returned".to_string()))?;

        let results = self.store.search(vector, limit).await?;
        Ok(results
            .into_iter()
            .map(|r| KnowledgeHit {
                name: r.payload.doc_name,
                page: r.payload.page,
                score: r.score,
                content: r.payload.content,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::SourceDocument;
    use crate::store::SearchResult;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Embedder returning constant vectors and counting embedded texts
    struct FixedEmbedder {
        dim: usize,
        embedded: Mutex<usize>,
    }

    impl FixedEmbedder {
        fn new(dim: usize) -> Arc<Self> {
            Arc::new(Self {
                dim,
                embedded: Mutex::new(0),
            })
        }

        fn embedded(&self) -> usize {
            *self.embedded.lock().unwrap()
        }
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            *self.embedded.lock().unwrap() += texts.len();
            Ok(texts.iter().map(|_| vec![0.5; self.dim]).collect())
        }

        fn dimension(&self) -> usize {
            self.dim
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    struct StaticSource {
        urls: Vec<String>,
        docs: Vec<SourceDocument>,
    }

    #[async_trait]
    impl DocumentSource for StaticSource {
        fn locators(&self) -> &[String] {
            &self.urls
        }

        async fn read(&self) -> Result<Vec<SourceDocument>> {
            Ok(self.docs.clone())
        }
    }

    #[derive(Default)]
    struct CollectionState {
        /// Vector size of the stored collection; `None` when absent
        size: Option<usize>,
        points: HashMap<Uuid, ChunkPoint>,
        ops: Vec<&'static str>,
    }

    /// In-memory collection, shared so tests can inspect it after handing
    /// it to the knowledge base
    #[derive(Clone)]
    struct MemoryCollection {
        dimension: usize,
        state: Arc<Mutex<CollectionState>>,
    }

    impl MemoryCollection {
        fn new(dimension: usize) -> Self {
            Self {
                dimension,
                state: Arc::new(Mutex::new(CollectionState::default())),
            }
        }

        /// A collection left behind with a different vector size
        fn with_existing_size(dimension: usize, size: usize) -> Self {
            let collection = Self::new(dimension);
            collection.state.lock().unwrap().size = Some(size);
            collection
        }

        fn ops(&self) -> Vec<&'static str> {
            self.state.lock().unwrap().ops.clone()
        }

        fn point_count(&self) -> usize {
            self.state.lock().unwrap().points.len()
        }
    }

    #[async_trait]
    impl VectorCollection for MemoryCollection {
        fn collection(&self) -> &str {
            "recipes"
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        async fn ensure_collection(&self) -> Result<bool> {
            let mut state = self.state.lock().unwrap();
            match state.size {
                Some(size) if size != self.dimension => Err(Error::Qdrant(format!(
                    "Collection 'recipes' has vector size {}, but the embedder produces {}",
                    size, self.dimension
                ))),
                Some(_) => Ok(false),
                None => {
                    state.size = Some(self.dimension);
                    state.ops.push("create");
                    Ok(true)
                }
            }
        }

        async fn delete_collection(&self) -> Result<bool> {
            let mut state = self.state.lock().unwrap();
            state.ops.push("delete");
            state.points.clear();
            Ok(state.size.take().is_some())
        }

        async fn existing_point_ids(&self, ids: &[Uuid]) -> Result<HashSet<Uuid>> {
            let state = self.state.lock().unwrap();
            Ok(ids.iter().filter(|id| state.points.contains_key(id)).copied().collect())
        }

        async fn upsert_points(&self, points: Vec<ChunkPoint>) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state.ops.push("upsert");
            for point in points {
                state.points.insert(point.id, point);
            }
            Ok(())
        }

        async fn search(&self, _query_vector: Vec<f32>, limit: usize) -> Result<Vec<SearchResult>> {
            let state = self.state.lock().unwrap();
            Ok(state
                .points
                .values()
                .take(limit)
                .map(|p| SearchResult {
                    score: 1.0,
                    payload: p.payload.clone(),
                })
                .collect())
        }
    }

    fn recipe_source() -> Box<dyn DocumentSource> {
        let url = "https://example.com/ThaiRecipes.pdf".to_string();
        let page = |n: usize, text: &str| SourceDocument {
            name: format!("ThaiRecipes_{}", n),
            uri: url.clone(),
            page: n,
            text: text.to_string(),
        };
        Box::new(StaticSource {
            urls: vec![url.clone()],
            docs: vec![
                page(1, "Pad Thai with tamarind."),
                page(2, "Pad Thai with tamarind."),
                page(3, "Tom kha gai with galangal."),
            ],
        })
    }

    fn knowledge_base(embedder: Arc<FixedEmbedder>, store: MemoryCollection) -> Result<PdfKnowledgeBase> {
        PdfKnowledgeBase::new(recipe_source(), embedder, Box::new(store), ChunkConfig::default(), 8)
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected_at_construction() {
        let result = knowledge_base(FixedEmbedder::new(4), MemoryCollection::new(8));
        assert!(matches!(result, Err(Error::Embedding(_))));
    }

    #[tokio::test]
    async fn test_identical_pages_collapse_to_distinct_points() {
        let kb = knowledge_base(FixedEmbedder::new(4), MemoryCollection::new(4)).unwrap();
        let (documents, points) = kb.collect_chunks().await.unwrap();

        assert_eq!(documents, 3);
        // page 1 and 2 have identical text, so identical chunk hashes
        assert_eq!(points.len(), 2);
        assert!(points.iter().all(|p| p.vector.is_empty()));
        assert_eq!(kb.name(), "recipes");
    }

    #[tokio::test]
    async fn test_load_against_ready_collection_embeds_nothing() {
        let embedder = FixedEmbedder::new(4);
        let store = MemoryCollection::new(4);
        let kb = knowledge_base(embedder.clone(), store.clone()).unwrap();

        let first = kb.load(false).await.unwrap();
        assert!(first.created);
        assert_eq!(first.chunks_embedded, 2);

        let second = kb.load(false).await.unwrap();
        assert_eq!(
            second,
            LoadReport {
                created: false,
                documents: 3,
                chunks_total: 2,
                chunks_embedded: 0,
            }
        );
        assert_eq!(embedder.embedded(), 2);
        assert_eq!(store.ops(), vec!["create", "upsert"]);
    }

    #[tokio::test]
    async fn test_recreate_drops_before_rebuilding() {
        let embedder = FixedEmbedder::new(4);
        let store = MemoryCollection::new(4);
        let kb = knowledge_base(embedder.clone(), store.clone()).unwrap();

        kb.load(false).await.unwrap();
        let report = kb.load(true).await.unwrap();

        assert!(report.created);
        assert_eq!(report.chunks_embedded, report.chunks_total);
        assert_eq!(store.ops(), vec!["create", "upsert", "delete", "create", "upsert"]);
        assert_eq!(store.point_count(), 2);
        assert_eq!(embedder.embedded(), 4);
    }

    #[tokio::test]
    async fn test_size_mismatch_fails_load_and_rebuild_recovers() {
        let store = MemoryCollection::with_existing_size(4, 768);
        let kb = knowledge_base(FixedEmbedder::new(4), store.clone()).unwrap();

        let err = kb.load(false).await.unwrap_err();
        assert!(matches!(err, Error::Qdrant(msg) if msg.contains("vector size 768")));
        assert_eq!(store.point_count(), 0);

        let outcome = KnowledgeProvisioner::new().provision(&kb).await;
        assert!(outcome.rebuilt());
        assert_eq!(store.point_count(), 2);
        assert!(kb.load(false).await.is_ok());
    }

    #[tokio::test]
    async fn test_search_maps_payloads_to_hits() {
        let kb = knowledge_base(FixedEmbedder::new(4), MemoryCollection::new(4)).unwrap();
        kb.load(false).await.unwrap();

        let hits = kb.search("galangal", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].name.starts_with("ThaiRecipes_"));
    }
}
