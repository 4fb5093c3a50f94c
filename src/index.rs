use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::chunking::Chunk;
use crate::embeddings::{Embedding, TextEmbedder};
use crate::error::{IndexBuildError, IndexLoadError, QueryError, StoreError};
use crate::metadata::{ChunkMetadata, Difficulty};

/// Metadata recorded with the persisted index so incompatible reuse is
/// detected before the index is served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub embedding_model: String,
    pub dimension: u64,
    pub chunks: u64,
}

/// Per-query metadata constraints. `company` and `difficulty` are equality
/// filters applied inside the store; `topic` is applied to the returned
/// entries, since the keyword filter model does not cover set membership.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilter {
    pub company: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub topic: Option<String>,
}

impl QueryFilter {
    /// True when no constraint is set.
    pub fn is_empty(&self) -> bool {
        self.company.is_none() && self.difficulty.is_none() && self.topic.is_none()
    }

    /// True when `metadata` satisfies the store-side (company/difficulty)
    /// constraints.
    pub fn matches_indexed(&self, metadata: &ChunkMetadata) -> bool {
        if let Some(company) = &self.company {
            if metadata.company.as_deref() != Some(company.as_str()) {
                return false;
            }
        }
        if let Some(difficulty) = self.difficulty {
            if metadata.difficulty != Some(difficulty) {
                return false;
            }
        }
        true
    }
}

/// A chunk paired with its embedding, ready for insertion.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Embedding,
}

/// A stored entry returned by similarity search.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
}

/// Persistence seam for the index. Implemented by `QdrantStore` in production
/// and by an in-memory store in tests.
#[allow(async_fn_in_trait)]
pub trait VectorStore {
    /// Whether a persisted index exists at this store's location.
    async fn exists(&self) -> Result<bool, StoreError>;

    /// Delete the persisted index. Succeeds when none exists.
    async fn destroy(&self) -> Result<(), StoreError>;

    /// Create the persisted index described by `manifest` and fill it with
    /// `records`.
    async fn persist(
        &self,
        manifest: &IndexManifest,
        records: Vec<EmbeddedChunk>,
    ) -> Result<(), StoreError>;

    /// Read back the manifest of the persisted index, or `None` when absent.
    /// Unreadable persisted data is reported as [`StoreError::Malformed`].
    async fn manifest(&self) -> Result<Option<IndexManifest>, StoreError>;

    /// The `k` nearest entries to `vector` satisfying the store-side
    /// constraints of `filter`, best first.
    async fn search(
        &self,
        vector: &Embedding,
        k: usize,
        filter: &QueryFilter,
    ) -> Result<Vec<RetrievedChunk>, StoreError>;
}

/// Embeds chunks and persists them through a [`VectorStore`]; serves filtered
/// similarity search on the read path. Building is the only mutating
/// operation and is never triggered implicitly by a search.
pub struct VectorIndex<S, E> {
    store: S,
    embedder: E,
}

impl<S: VectorStore, E: TextEmbedder> VectorIndex<S, E> {
    pub fn new(store: S, embedder: E) -> Self {
        VectorIndex { store, embedder }
    }

    /// Embed `chunks` and persist them, replacing any existing index at this
    /// location. All-or-nothing: a failure never leaves a usable partial
    /// index behind.
    pub async fn build(&self, chunks: &[Chunk]) -> Result<(), IndexBuildError> {
        if chunks.is_empty() {
            return Err(IndexBuildError::Empty);
        }

        // Embed everything up front so an embedding failure aborts before the
        // previous index is touched.
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;

        let records: Vec<EmbeddedChunk> = chunks
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddedChunk { chunk, vector })
            .collect();

        if self.store.exists().await? {
            self.store.destroy().await?;
        }

        let manifest = IndexManifest {
            embedding_model: self.embedder.model_id().to_string(),
            dimension: self.embedder.dimension(),
            chunks: records.len() as u64,
        };
        if let Err(e) = self.store.persist(&manifest, records).await {
            // Do not leave a half-written index behind.
            if let Err(cleanup) = self.store.destroy().await {
                warn!("Failed to remove partial index: {}", cleanup);
            }
            return Err(IndexBuildError::Store(e));
        }

        info!(
            "Indexed {} chunks with {}",
            chunks.len(),
            self.embedder.model_id()
        );
        Ok(())
    }

    /// Validate that a persisted index exists and was built with the
    /// configured embedding model.
    pub async fn load(&self) -> Result<IndexManifest, IndexLoadError> {
        let manifest = match self.store.manifest().await {
            Ok(Some(manifest)) => manifest,
            Ok(None) => return Err(IndexLoadError::Missing),
            Err(StoreError::Malformed(reason)) => return Err(IndexLoadError::Corrupt(reason)),
            Err(e) => return Err(IndexLoadError::Store(e)),
        };

        if manifest.embedding_model != self.embedder.model_id() {
            return Err(IndexLoadError::IncompatibleModel {
                expected: self.embedder.model_id().to_string(),
                found: manifest.embedding_model,
            });
        }
        if manifest.dimension != self.embedder.dimension() {
            return Err(IndexLoadError::IncompatibleDimension {
                expected: self.embedder.dimension(),
                found: manifest.dimension,
            });
        }
        if manifest.chunks == 0 {
            return Err(IndexLoadError::Corrupt(
                "index contains no entries".to_string(),
            ));
        }

        info!(
            "Loaded index of {} chunks built with {}",
            manifest.chunks, manifest.embedding_model
        );
        Ok(manifest)
    }

    /// Delete the persisted index if present.
    pub async fn destroy(&self) -> Result<(), StoreError> {
        self.store.destroy().await
    }

    /// The `k` most similar stored entries to `query_text` under `filter`,
    /// best first. An empty result is not an error.
    pub async fn search(
        &self,
        query_text: &str,
        k: usize,
        filter: &QueryFilter,
    ) -> Result<Vec<RetrievedChunk>, QueryError> {
        if k == 0 {
            return Err(QueryError::InvalidLimit);
        }

        let vector = self.embedder.embed(query_text).await?;
        let mut results = self.store.search(&vector, k, filter).await?;

        if let Some(topic) = &filter.topic {
            results.retain(|r| r.metadata.topics.iter().any(|t| t == topic));
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{chunk, MemoryStore, SeededEmbedder};

    fn index(store: &MemoryStore) -> VectorIndex<MemoryStore, SeededEmbedder> {
        VectorIndex::new(store.clone(), SeededEmbedder::new("test-model", 8))
    }

    #[tokio::test]
    async fn test_build_rejects_zero_chunks() {
        let store = MemoryStore::new();
        let result = index(&store).build(&[]).await;
        assert!(matches!(result, Err(IndexBuildError::Empty)));
    }

    #[tokio::test]
    async fn test_failed_embedding_leaves_existing_index_intact() {
        let store = MemoryStore::new();
        let idx = index(&store);
        idx.build(&[chunk("original", Some("google"), None)])
            .await
            .expect("initial build");

        let failing = VectorIndex::new(store.clone(), SeededEmbedder::failing("test-model", 8));
        let result = failing.build(&[chunk("replacement", None, None)]).await;

        assert!(matches!(result, Err(IndexBuildError::Embedding(_))));
        assert_eq!(store.texts(), vec!["original".to_string()]);
    }

    #[tokio::test]
    async fn test_build_replaces_any_existing_index() {
        let store = MemoryStore::new();
        let idx = index(&store);
        idx.build(&[chunk("old entry", None, None)])
            .await
            .expect("first build");
        idx.build(&[chunk("new entry", None, None)])
            .await
            .expect("second build");

        assert_eq!(store.texts(), vec!["new entry".to_string()]);
    }

    #[tokio::test]
    async fn test_load_without_persisted_index_is_missing() {
        let store = MemoryStore::new();
        let result = index(&store).load().await;
        assert!(matches!(result, Err(IndexLoadError::Missing)));
    }

    #[tokio::test]
    async fn test_load_detects_incompatible_model() {
        let store = MemoryStore::new();
        let other = VectorIndex::new(store.clone(), SeededEmbedder::new("other-model", 8));
        other
            .build(&[chunk("entry", None, None)])
            .await
            .expect("build with other model");

        let result = index(&store).load().await;
        assert!(matches!(
            result,
            Err(IndexLoadError::IncompatibleModel { .. })
        ));
    }

    #[tokio::test]
    async fn test_search_rejects_zero_limit() {
        let store = MemoryStore::new();
        let idx = index(&store);
        idx.build(&[chunk("entry", None, None)])
            .await
            .expect("build");

        let result = idx.search("anything", 0, &QueryFilter::default()).await;
        assert!(matches!(result, Err(QueryError::InvalidLimit)));
    }

    #[tokio::test]
    async fn test_filtered_search_returns_only_matching_entries() {
        let store = MemoryStore::new();
        let idx = index(&store);
        idx.build(&[
            chunk("meta easy question", Some("meta"), Some(Difficulty::Easy)),
            chunk("meta hard question", Some("meta"), Some(Difficulty::Hard)),
            chunk("google easy question", Some("google"), Some(Difficulty::Easy)),
        ])
        .await
        .expect("build");

        let filter = QueryFilter {
            company: Some("meta".to_string()),
            difficulty: Some(Difficulty::Easy),
            topic: None,
        };
        let results = idx.search("question", 10, &filter).await.expect("search");

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "meta easy question");
    }

    #[tokio::test]
    async fn test_empty_filter_is_plain_top_k() {
        let store = MemoryStore::new();
        let idx = index(&store);
        idx.build(&[
            chunk("first", Some("meta"), Some(Difficulty::Easy)),
            chunk("second", Some("google"), Some(Difficulty::Hard)),
            chunk("third", None, None),
        ])
        .await
        .expect("build");

        let results = idx
            .search("anything", 10, &QueryFilter::default())
            .await
            .expect("search");
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn test_unmatched_filter_yields_empty_not_error() {
        let store = MemoryStore::new();
        let idx = index(&store);
        idx.build(&[chunk("entry", Some("google"), None)])
            .await
            .expect("build");

        let filter = QueryFilter {
            company: Some("netflix".to_string()),
            ..QueryFilter::default()
        };
        let results = idx.search("entry", 5, &filter).await.expect("search");
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_topic_filter_is_applied_after_retrieval() {
        let store = MemoryStore::new();
        let idx = index(&store);
        let mut tree_chunk = chunk("tree question", None, None);
        tree_chunk.metadata.topics = vec!["tree".to_string()];
        let mut graph_chunk = chunk("graph question", None, None);
        graph_chunk.metadata.topics = vec!["graph".to_string()];
        idx.build(&[tree_chunk, graph_chunk]).await.expect("build");

        let filter = QueryFilter {
            topic: Some("tree".to_string()),
            ..QueryFilter::default()
        };
        let results = idx.search("question", 10, &filter).await.expect("search");

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "tree question");
    }
}
