use std::collections::HashMap;
use std::env;

use log::debug;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    vectors_config, with_payload_selector, Condition, CreateCollectionBuilder, Distance, Filter,
    PointStruct, ScrollPointsBuilder, SearchPoints, UpsertPointsBuilder, Value, VectorParams,
    WithPayloadSelector,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::json;

use crate::embeddings::Embedding;
use crate::error::StoreError;
use crate::index::{EmbeddedChunk, IndexManifest, QueryFilter, RetrievedChunk, VectorStore};
use crate::metadata::{ChunkMetadata, Difficulty};

/// Configuration for Qdrant.
pub struct QdrantConfig {
    pub url: String,
    pub api_key: Option<String>,
}

impl QdrantConfig {
    /// Create a new configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let url = env::var("QDRANT_URL")?;
        let api_key = env::var("QDRANT_API_KEY").ok();

        Ok(QdrantConfig { url, api_key })
    }
}

/// Qdrant-backed persistence for the vector index. One collection per source
/// document; the embedding model id travels in every point payload so an
/// incompatible persisted index is detected on load.
pub struct QdrantStore {
    client: Qdrant,
    collection: String,
}

impl QdrantStore {
    /// Connect to Qdrant. The collection name is derived from the source file
    /// name.
    pub fn new(config: QdrantConfig, source_name: &str) -> Result<Self, StoreError> {
        let builder = Qdrant::from_url(&config.url);
        let builder = if let Some(api_key) = config.api_key {
            builder.api_key(api_key)
        } else {
            builder
        };
        let client = builder.build().map_err(backend)?;

        Ok(QdrantStore {
            client,
            collection: collection_name(source_name),
        })
    }
}

impl VectorStore for QdrantStore {
    async fn exists(&self) -> Result<bool, StoreError> {
        self.client
            .collection_exists(self.collection.as_str())
            .await
            .map_err(backend)
    }

    async fn destroy(&self) -> Result<(), StoreError> {
        if !self.exists().await? {
            return Ok(());
        }
        self.client
            .delete_collection(self.collection.clone())
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn persist(
        &self,
        manifest: &IndexManifest,
        records: Vec<EmbeddedChunk>,
    ) -> Result<(), StoreError> {
        let create_collection =
            CreateCollectionBuilder::new(self.collection.clone()).vectors_config(VectorParams {
                size: manifest.dimension,
                distance: Distance::Cosine.into(),
                ..Default::default()
            });
        self.client
            .create_collection(create_collection)
            .await
            .map_err(backend)?;

        let points: Vec<PointStruct> = records
            .iter()
            .enumerate()
            .map(|(idx, record)| {
                let payload = payload_for(record, &manifest.embedding_model)?;
                Ok(PointStruct::new(
                    idx as u64,
                    record.vector.values.clone(),
                    payload,
                ))
            })
            .collect::<Result<_, StoreError>>()?;

        debug!("Upserting {} points into {}", points.len(), self.collection);
        self.client
            .upsert_points(UpsertPointsBuilder::new(self.collection.clone(), points).build())
            .await
            .map_err(backend)?;

        Ok(())
    }

    async fn manifest(&self) -> Result<Option<IndexManifest>, StoreError> {
        if !self.exists().await? {
            return Ok(None);
        }

        let info = self
            .client
            .collection_info(self.collection.as_str())
            .await
            .map_err(backend)?;
        let info = info
            .result
            .ok_or_else(|| StoreError::Malformed("collection info missing".to_string()))?;
        let chunks = info.points_count.unwrap_or(0);
        let dimension = info
            .config
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config)
            .and_then(|c| match c {
                vectors_config::Config::Params(params) => Some(params.size),
                vectors_config::Config::ParamsMap(_) => None,
            })
            .ok_or_else(|| StoreError::Malformed("vector parameters missing".to_string()))?;

        // The model id travels in every point payload; sample one point.
        let scrolled = self
            .client
            .scroll(
                ScrollPointsBuilder::new(self.collection.clone())
                    .limit(1)
                    .with_payload(true),
            )
            .await
            .map_err(backend)?;
        let point = scrolled.result.into_iter().next().ok_or_else(|| {
            StoreError::Malformed("persisted index contains no points".to_string())
        })?;
        let embedding_model = point
            .payload
            .get("embedding_model")
            .and_then(|v| v.as_str().map(|s| s.to_string()))
            .ok_or_else(|| {
                StoreError::Malformed("point payload is missing the embedding model".to_string())
            })?;

        Ok(Some(IndexManifest {
            embedding_model,
            dimension,
            chunks,
        }))
    }

    async fn search(
        &self,
        vector: &Embedding,
        k: usize,
        filter: &QueryFilter,
    ) -> Result<Vec<RetrievedChunk>, StoreError> {
        let search_request = SearchPoints {
            collection_name: self.collection.clone(),
            vector: vector.values.clone(),
            limit: k as u64,
            filter: store_filter(filter),
            with_payload: Some(WithPayloadSelector {
                selector_options: Some(with_payload_selector::SelectorOptions::Enable(true)),
            }),
            ..Default::default()
        };

        let response = self
            .client
            .search_points(search_request)
            .await
            .map_err(backend)?;

        let results = response
            .result
            .into_iter()
            .filter_map(|point| {
                let text = point.payload.get("text")?.as_str()?.to_string();
                let metadata = metadata_from_payload(&point.payload);
                Some(RetrievedChunk {
                    text,
                    metadata,
                    score: point.score,
                })
            })
            .collect();

        Ok(results)
    }
}

fn backend(e: qdrant_client::QdrantError) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Generate a collection name from a source file name.
fn collection_name(source_name: &str) -> String {
    // Replace non-alphanumeric characters with underscores and convert to lowercase
    let name = source_name
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .to_lowercase();

    format!("rag_{}", name)
}

fn payload_for(record: &EmbeddedChunk, model: &str) -> Result<Payload, StoreError> {
    let meta = &record.chunk.metadata;
    let value = json!({
        "text": record.chunk.text,
        "company": meta.company,
        "difficulty": meta.difficulty.map(Difficulty::as_str),
        "section_type": meta.section_type,
        "topics": meta.topics,
        "page": meta.page,
        "source": meta.source,
        "embedding_model": model,
    });

    Payload::try_from(value).map_err(|e| StoreError::Backend(e.to_string()))
}

/// Store-side equality filter on company/difficulty; topic membership is
/// handled by the index wrapper after retrieval.
fn store_filter(filter: &QueryFilter) -> Option<Filter> {
    let mut conditions = Vec::new();
    if let Some(company) = &filter.company {
        conditions.push(Condition::matches("company", company.clone()));
    }
    if let Some(difficulty) = filter.difficulty {
        conditions.push(Condition::matches(
            "difficulty",
            difficulty.as_str().to_string(),
        ));
    }

    if conditions.is_empty() {
        None
    } else {
        Some(Filter::must(conditions))
    }
}

fn metadata_from_payload(payload: &HashMap<String, Value>) -> ChunkMetadata {
    let get_str =
        |key: &str| payload.get(key).and_then(|v| v.as_str()).map(|s| s.to_string());

    let topics = payload
        .get("topics")
        .and_then(|v| match &v.kind {
            Some(Kind::ListValue(list)) => Some(
                list.values
                    .iter()
                    .filter_map(|item| item.as_str().map(|s| s.to_string()))
                    .collect::<Vec<_>>(),
            ),
            _ => None,
        })
        .unwrap_or_default();

    ChunkMetadata {
        company: get_str("company"),
        difficulty: get_str("difficulty").as_deref().and_then(Difficulty::parse),
        section_type: get_str("section_type"),
        topics,
        page: payload
            .get("page")
            .and_then(|v| v.as_integer())
            .map(|p| p as u32),
        source: get_str("source"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_name_is_sanitized() {
        assert_eq!(collection_name("Interview Questions.pdf"), "rag_interview_questions_pdf");
        assert_eq!(collection_name("data.txt"), "rag_data_txt");
    }

    #[test]
    fn test_store_filter_combines_detected_signals() {
        let empty = store_filter(&QueryFilter::default());
        assert!(empty.is_none());

        let both = store_filter(&QueryFilter {
            company: Some("meta".to_string()),
            difficulty: Some(Difficulty::Easy),
            topic: None,
        })
        .expect("filter");
        assert_eq!(both.must.len(), 2);

        let single = store_filter(&QueryFilter {
            company: Some("meta".to_string()),
            ..QueryFilter::default()
        })
        .expect("filter");
        assert_eq!(single.must.len(), 1);
    }
}
