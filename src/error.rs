use std::path::PathBuf;

use thiserror::Error;

use crate::embeddings::EmbeddingError;
use crate::openai::CompletionError;

/// Failures while reading the source document.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("source document not found: {0}")]
    NotFound(PathBuf),

    #[error("source document has no readable pages: {0}")]
    EmptyDocument(PathBuf),

    #[error("unsupported document format: {0}. Only text and PDF files are supported")]
    UnsupportedFormat(String),

    #[error("failed to extract text from {path}: {reason}")]
    Extraction { path: PathBuf, reason: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures while building and persisting a fresh index.
#[derive(Error, Debug)]
pub enum IndexBuildError {
    #[error("cannot build an index from zero chunks")]
    Empty,

    #[error("embedding failed during build: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store rejected the build: {0}")]
    Store(#[from] StoreError),
}

/// Failures while reusing a persisted index.
///
/// Always recoverable: the lifecycle manager responds to any variant by
/// rebuilding from the source document, so these never reach a caller.
#[derive(Error, Debug)]
pub enum IndexLoadError {
    #[error("no persisted index found")]
    Missing,

    #[error("persisted index is corrupt: {0}")]
    Corrupt(String),

    #[error("persisted index was built with embedding model {found}, expected {expected}")]
    IncompatibleModel { expected: String, found: String },

    #[error("persisted index has vector dimension {found}, expected {expected}")]
    IncompatibleDimension { expected: u64, found: u64 },

    #[error("vector store unavailable: {0}")]
    Store(#[from] StoreError),
}

/// Both the load and the fallback build failed. Fatal for the retrieval
/// subsystem, not for the process: the caller degrades to answering without
/// grounded context.
#[derive(Error, Debug)]
pub enum InitializationError {
    #[error("failed to read source document: {0}")]
    Ingest(#[from] IngestError),

    #[error("failed to build index: {0}")]
    Build(#[from] IndexBuildError),

    #[error("index is not initialized")]
    NotReady,
}

/// Failures on the read path.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("index is not initialized")]
    NotReady,

    #[error("search limit must be at least 1")]
    InvalidLimit,

    #[error("failed to embed query: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector search failed: {0}")]
    Search(#[from] StoreError),

    #[error("answer generation failed: {0}")]
    Generation(#[from] CompletionError),
}

/// Backend detail carried inside build, load and query errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("vector store backend error: {0}")]
    Backend(String),

    #[error("persisted data is malformed: {0}")]
    Malformed(String),
}
