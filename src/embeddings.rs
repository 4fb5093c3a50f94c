use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Representation of a vector embedding.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f32>,
}

/// Failures while turning text into vectors. Request timeouts surface through
/// the `Http` variant rather than hanging the caller.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("embedding response contained no vectors")]
    Empty,
}

/// Seam between the index and the embedding backend. Implemented by the
/// OpenAI client in production and by a deterministic fake in tests.
#[allow(async_fn_in_trait)]
pub trait TextEmbedder {
    /// Identifier of the model producing the vectors.
    fn model_id(&self) -> &str;

    /// Dimension of the produced vectors.
    fn dimension(&self) -> u64;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError>;

    /// Embed a batch of texts, preserving input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError>;
}
