//! Text embedding for indexing and querying.
//!
//! The same embedding function must be used at ingestion and query time or
//! similarity scores are meaningless; both paths go through one [`Embedder`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::RetrievalError;
use crate::config::OpenAiConfig;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError>;
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(config: &OpenAiConfig) -> anyhow::Result<Self> {
        let api_key = config.resolve_api_key()?;
        let endpoint = format!("{}/embeddings", config.api_base);

        info!(
            "Initialized OpenAI embedder (model: {})",
            config.embedding_model
        );

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            model: config.embedding_model.clone(),
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let request = EmbeddingRequest {
            model: self.model.clone(),
            input: text.to_string(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

        if !status.is_success() {
            error!("Embedding request failed with status {}: {}", status, body);
            return Err(RetrievalError::Embedding(format!("status {}", status)));
        }

        let parsed: EmbeddingResponse = serde_json::from_str(&body)
            .map_err(|e| RetrievalError::Embedding(format!("unparsable response: {}", e)))?;

        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| RetrievalError::Embedding("response had no data".to_string()))?;

        debug!("Embedded {} chars into {} dims", text.len(), embedding.len());
        Ok(embedding)
    }
}
