use std::path::PathBuf;

use log::{error, info, warn};
use tokio::sync::RwLock;

use crate::chunking::{self, ChunkConfig};
use crate::document;
use crate::embeddings::TextEmbedder;
use crate::error::{InitializationError, QueryError};
use crate::index::{QueryFilter, RetrievedChunk, VectorIndex, VectorStore};
use crate::metadata::Tagger;

enum State {
    Uninitialized,
    Ready,
}

/// Owns the vector index and decides, at startup, whether to reuse the
/// persisted copy or rebuild it from the source document.
///
/// Searches share the state lock; `rebuild` takes it exclusively, so a
/// rebuild can never delete the backing collection out from under an
/// in-flight search.
pub struct IndexLifecycle<S, E> {
    index: VectorIndex<S, E>,
    source: PathBuf,
    chunking: ChunkConfig,
    tagger: Tagger,
    state: RwLock<State>,
}

impl<S: VectorStore, E: TextEmbedder> IndexLifecycle<S, E> {
    pub fn new(
        index: VectorIndex<S, E>,
        source: impl Into<PathBuf>,
        chunking: ChunkConfig,
    ) -> Self {
        IndexLifecycle {
            index,
            source: source.into(),
            chunking,
            tagger: Tagger::new(),
            state: RwLock::new(State::Uninitialized),
        }
    }

    /// Reuse the persisted index, or fall back to a full build from the
    /// source document. Idempotent once ready.
    pub async fn initialize(&self) -> Result<(), InitializationError> {
        let mut state = self.state.write().await;
        if matches!(*state, State::Ready) {
            return Ok(());
        }

        match self.index.load().await {
            Ok(_) => {
                *state = State::Ready;
                Ok(())
            }
            // Load failures are recoverable by construction: rebuild from the
            // source document instead of surfacing them.
            Err(e) => {
                warn!("Could not reuse persisted index ({}), rebuilding", e);
                match self.build_from_source().await {
                    Ok(()) => {
                        *state = State::Ready;
                        Ok(())
                    }
                    Err(e) => {
                        error!("Index build failed: {}", e);
                        Err(e)
                    }
                }
            }
        }
    }

    /// Delete the persisted index and rebuild it from the source document.
    ///
    /// Callable only once ready. A failed rebuild leaves the manager
    /// uninitialized rather than serving stale data.
    pub async fn rebuild(&self) -> Result<(), InitializationError> {
        let mut state = self.state.write().await;
        if matches!(*state, State::Uninitialized) {
            return Err(InitializationError::NotReady);
        }

        *state = State::Uninitialized;
        info!("Rebuilding index from {}", self.source.display());
        self.index
            .destroy()
            .await
            .map_err(|e| InitializationError::Build(e.into()))?;
        self.build_from_source().await?;
        *state = State::Ready;
        Ok(())
    }

    /// Similarity search against the managed index.
    pub async fn search(
        &self,
        text: &str,
        k: usize,
        filter: &QueryFilter,
    ) -> Result<Vec<RetrievedChunk>, QueryError> {
        let state = self.state.read().await;
        if matches!(*state, State::Uninitialized) {
            return Err(QueryError::NotReady);
        }
        self.index.search(text, k, filter).await
    }

    /// Full build pipeline: ingest, chunk, tag, embed, persist.
    async fn build_from_source(&self) -> Result<(), InitializationError> {
        let documents = document::load_source(&self.source)?;
        let chunks = chunking::split_documents(&documents, &self.chunking);
        let tagged = self.tagger.tag(chunks);
        info!(
            "Prepared {} chunks from {} pages",
            tagged.len(),
            documents.len()
        );
        self.index.build(&tagged).await?;
        Ok(())
    }
}
