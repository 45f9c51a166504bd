//! Embedding client for the Ollama embeddings endpoint.
//!
//! The model identifier and dimension are fixed in configuration; retrieval
//! and ingestion share this client so query and document vectors always come
//! from the same model.

use serde::Deserialize;
use std::time::Duration;
use tracing::{error, info};

use crate::errors::{RetrievalError, RetrievalResult};

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Clone)]
pub struct EmbeddingClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimension: usize,
}

impl EmbeddingClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            dimension,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed a single text.
    pub async fn embed(&self, text: &str) -> RetrievalResult<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "model": self.model,
                "prompt": text,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RetrievalError::Embedding(format!(
                "embedding endpoint returned status {}",
                response.status()
            )));
        }

        let body: EmbeddingResponse = response.json().await?;
        if body.embedding.len() != self.dimension {
            return Err(RetrievalError::Embedding(format!(
                "expected dimension {}, got {}",
                self.dimension,
                body.embedding.len()
            )));
        }
        Ok(body.embedding)
    }

    /// Embed texts in batches. A failing batch is replaced by zero-vectors so
    /// ids stay aligned with the input; the error count is returned alongside
    /// the vectors. Zero-vectors are valid placeholders for the vector store
    /// but are excluded from retrieval.
    pub async fn embed_batch(
        &self,
        texts: &[String],
        batch_size: usize,
    ) -> (Vec<Vec<f32>>, usize) {
        let mut embeddings = Vec::with_capacity(texts.len());
        let mut errors = 0usize;
        let batch_size = batch_size.max(1);

        for (batch_index, batch) in texts.chunks(batch_size).enumerate() {
            let mut batch_embeddings = Vec::with_capacity(batch.len());
            let mut failed = false;

            for text in batch {
                match self.embed(text).await {
                    Ok(embedding) => batch_embeddings.push(embedding),
                    Err(e) => {
                        error!("Error generating embeddings for batch {}: {}", batch_index, e);
                        failed = true;
                        break;
                    }
                }
            }

            if failed {
                embeddings.extend(batch.iter().map(|_| vec![0.0; self.dimension]));
                errors += 1;
            } else {
                embeddings.extend(batch_embeddings);
            }
        }

        info!("Generated {} embeddings ({} failed batches)", embeddings.len(), errors);
        (embeddings, errors)
    }
}
