use std::env;
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::embeddings::{Embedding, EmbeddingError, TextEmbedder};

/// Embedding model used to build and query the index.
pub const EMBEDDING_MODEL: &str = "text-embedding-3-small";
/// Vector dimension of [`EMBEDDING_MODEL`].
pub const EMBEDDING_DIMENSION: u64 = 1536;
/// Chat model used for answer synthesis.
const CHAT_MODEL: &str = "gpt-4o-mini";

/// Request timeout for embedding and completion calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Maximum number of inputs sent per embeddings request.
const EMBED_BATCH_SIZE: usize = 64;

/// Configuration for the OpenAI API.
#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
}

impl OpenAiConfig {
    /// Create a new configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = env::var("OPENAI_API_KEY")?;
        let base_url = env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        Ok(OpenAiConfig { api_key, base_url })
    }
}

/// Failures while generating an answer with the chat model.
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("completion API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("completion response contained no choices")]
    Empty,
}

/// Client for the OpenAI embeddings and chat completion endpoints.
#[derive(Clone)]
pub struct OpenAiClient {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiClient {
    /// Create a new client.
    pub fn new(config: OpenAiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to construct HTTP client");
        OpenAiClient { config, client }
    }

    /// Embed one batch of at most [`EMBED_BATCH_SIZE`] inputs.
    async fn embed_request(&self, inputs: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        #[derive(Serialize)]
        struct EmbeddingRequest<'a> {
            model: &'static str,
            input: &'a [String],
        }

        #[derive(Deserialize)]
        struct EmbeddingResponse {
            data: Vec<EmbeddingData>,
        }

        #[derive(Deserialize)]
        struct EmbeddingData {
            index: usize,
            embedding: Vec<f32>,
        }

        let request = EmbeddingRequest {
            model: EMBEDDING_MODEL,
            input: inputs,
        };

        let url = format!("{}/embeddings", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(EmbeddingError::Api { status, message });
        }

        let mut response_data: EmbeddingResponse = response.json().await?;
        if response_data.data.len() != inputs.len() {
            return Err(EmbeddingError::Empty);
        }

        // The API reports an index per input; order by it rather than trusting
        // response order.
        response_data.data.sort_by_key(|d| d.index);

        Ok(response_data
            .data
            .into_iter()
            .map(|d| Embedding {
                values: d.embedding,
            })
            .collect())
    }

    /// Generate an answer grounded in retrieved context.
    pub async fn generate_answer(
        &self,
        context: &str,
        question: &str,
    ) -> Result<String, CompletionError> {
        #[derive(Serialize)]
        struct ChatRequest {
            model: &'static str,
            messages: Vec<Message>,
            temperature: f32,
            max_tokens: u32,
        }

        #[derive(Serialize)]
        struct Message {
            role: &'static str,
            content: String,
        }

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: ResponseMessage,
        }

        #[derive(Deserialize)]
        struct ResponseMessage {
            content: Option<String>,
        }

        let request = ChatRequest {
            model: CHAT_MODEL,
            messages: vec![
                Message {
                    role: "system",
                    content: "You are a coding interview coach. Answer using only the provided \
                              context from the interview question bank. If the context does not \
                              cover the question, say so."
                        .to_string(),
                },
                Message {
                    role: "user",
                    content: format!("Context:\n{}\n\nQuestion: {}", context, question),
                },
            ],
            temperature: 0.1,
            max_tokens: 1024,
        };

        let url = format!("{}/chat/completions", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(CompletionError::Api { status, message });
        }

        let response_data: ChatResponse = response.json().await?;
        response_data
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(CompletionError::Empty)
    }
}

impl TextEmbedder for OpenAiClient {
    fn model_id(&self) -> &str {
        EMBEDDING_MODEL
    }

    fn dimension(&self) -> u64 {
        EMBEDDING_DIMENSION
    }

    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let input = [text.to_string()];
        let mut embeddings = self.embed_request(&input).await?;
        embeddings.pop().ok_or(EmbeddingError::Empty)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            debug!("Embedding batch of {} texts", batch.len());
            embeddings.extend(self.embed_request(batch).await?);
        }
        Ok(embeddings)
    }
}
