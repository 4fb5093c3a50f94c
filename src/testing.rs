//! In-memory test doubles for the vector store and the embedder, so index,
//! lifecycle and query tests run without a Qdrant server or network access.

use std::sync::{Arc, Mutex};

use crate::chunking::Chunk;
use crate::embeddings::{Embedding, EmbeddingError, TextEmbedder};
use crate::error::StoreError;
use crate::index::{EmbeddedChunk, IndexManifest, QueryFilter, RetrievedChunk, VectorStore};
use crate::metadata::{ChunkMetadata, Difficulty};

/// Deterministic embedder: folds the text bytes into a small fixed-size
/// vector. No semantic meaning, but stable across runs.
pub struct SeededEmbedder {
    model: String,
    dimension: usize,
    fail: bool,
}

impl SeededEmbedder {
    pub fn new(model: &str, dimension: usize) -> Self {
        SeededEmbedder {
            model: model.to_string(),
            dimension,
            fail: false,
        }
    }

    /// An embedder whose every call fails, for build failure paths.
    pub fn failing(model: &str, dimension: usize) -> Self {
        SeededEmbedder {
            fail: true,
            ..SeededEmbedder::new(model, dimension)
        }
    }

    fn vector_for(&self, text: &str) -> Embedding {
        let mut values = vec![0.0f32; self.dimension];
        for (i, byte) in text.bytes().enumerate() {
            values[i % self.dimension] += f32::from(byte) / 255.0;
        }
        Embedding { values }
    }
}

impl TextEmbedder for SeededEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> u64 {
        self.dimension as u64
    }

    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        if self.fail {
            return Err(EmbeddingError::Empty);
        }
        Ok(self.vector_for(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        if self.fail {
            return Err(EmbeddingError::Empty);
        }
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }
}

#[derive(Default)]
struct MemoryInner {
    collection: Option<(IndexManifest, Vec<EmbeddedChunk>)>,
    corrupt: bool,
}

/// Shared in-memory [`VectorStore`] with the same filter semantics as the
/// production store. Clones share the underlying collection, so tests can
/// inspect what the code under test persisted.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Mark the persisted data unreadable to exercise the corrupt-load path.
    pub fn corrupt(&self) {
        self.inner.lock().unwrap().corrupt = true;
    }

    /// Pre-seed a persisted collection, bypassing the build path.
    pub fn seed(&self, manifest: IndexManifest, records: Vec<EmbeddedChunk>) {
        self.inner.lock().unwrap().collection = Some((manifest, records));
    }

    /// Stored chunk texts, in insertion order.
    pub fn texts(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .collection
            .as_ref()
            .map(|(_, records)| records.iter().map(|r| r.chunk.text.clone()).collect())
            .unwrap_or_default()
    }
}

impl VectorStore for MemoryStore {
    async fn exists(&self) -> Result<bool, StoreError> {
        Ok(self.inner.lock().unwrap().collection.is_some())
    }

    async fn destroy(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.collection = None;
        inner.corrupt = false;
        Ok(())
    }

    async fn persist(
        &self,
        manifest: &IndexManifest,
        records: Vec<EmbeddedChunk>,
    ) -> Result<(), StoreError> {
        self.inner.lock().unwrap().collection = Some((manifest.clone(), records));
        Ok(())
    }

    async fn manifest(&self) -> Result<Option<IndexManifest>, StoreError> {
        let inner = self.inner.lock().unwrap();
        if inner.corrupt {
            return Err(StoreError::Malformed("seeded corruption".to_string()));
        }
        Ok(inner
            .collection
            .as_ref()
            .map(|(manifest, _)| manifest.clone()))
    }

    async fn search(
        &self,
        vector: &Embedding,
        k: usize,
        filter: &QueryFilter,
    ) -> Result<Vec<RetrievedChunk>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let Some((_, records)) = inner.collection.as_ref() else {
            return Err(StoreError::Backend(
                "collection does not exist".to_string(),
            ));
        };

        let mut scored: Vec<RetrievedChunk> = records
            .iter()
            .filter(|record| filter.matches_indexed(&record.chunk.metadata))
            .map(|record| RetrievedChunk {
                text: record.chunk.text.clone(),
                metadata: record.chunk.metadata.clone(),
                score: cosine(&vector.values, &record.vector.values),
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Chunk with the given text, company and difficulty.
pub fn chunk(text: &str, company: Option<&str>, difficulty: Option<Difficulty>) -> Chunk {
    Chunk {
        text: text.to_string(),
        metadata: ChunkMetadata {
            company: company.map(|c| c.to_string()),
            difficulty,
            ..ChunkMetadata::default()
        },
    }
}

/// Pair a chunk with a deterministic vector of the given dimension.
pub fn embedded(chunk: Chunk, dimension: usize) -> EmbeddedChunk {
    let embedder = SeededEmbedder::new("seed", dimension);
    let vector = embedder.vector_for(&chunk.text);
    EmbeddedChunk { chunk, vector }
}
