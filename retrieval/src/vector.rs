//! Qdrant REST client and the dense retriever built on it.
//!
//! One collection per document kind, cosine metric, fixed dimension. The
//! payload carries all searchable metadata plus the `type` discriminator and
//! the deterministic `chunk_id`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use helpdesk_models::documents::{generic_text, sanitize_metadata, DocumentPayload};
use helpdesk_models::retrieval::{Collection, RetrievalSource, RetrievedDocument};

use crate::embedding::EmbeddingClient;
use crate::errors::{RetrievalError, RetrievalResult};

/// Deterministic point id for a chunk: the md5 digest of the chunk id,
/// rendered as a UUID. Re-ingesting the same chunk overwrites the same point.
pub fn point_id(chunk_id: &str) -> String {
    let digest = md5::compute(chunk_id.as_bytes());
    Uuid::from_bytes(digest.0).to_string()
}

#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct QdrantResponse<T> {
    result: Option<T>,
    #[serde(default)]
    status: Value,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    #[allow(dead_code)]
    id: Value,
    score: f32,
    payload: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct ScrollResult {
    points: Vec<ScrollPoint>,
    #[serde(default)]
    next_page_offset: Value,
}

#[derive(Debug, Deserialize)]
struct ScrollPoint {
    id: Value,
    payload: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct CollectionsResult {
    collections: Vec<CollectionDescription>,
}

#[derive(Debug, Deserialize)]
struct CollectionDescription {
    name: String,
}

#[derive(Debug, Serialize)]
struct SearchRequest {
    vector: Vec<f32>,
    limit: usize,
    with_payload: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Value>,
}

/// Qdrant REST API client.
#[derive(Clone)]
pub struct VectorStore {
    client: reqwest::Client,
    base_url: String,
}

impl VectorStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn collection_url(&self, collection: Collection, suffix: &str) -> String {
        format!(
            "{}/collections/{}{}",
            self.base_url.trim_end_matches('/'),
            collection.as_str(),
            suffix
        )
    }

    async fn check<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> RetrievalResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::VectorStore(format!(
                "Qdrant returned {}: {}",
                status, body
            )));
        }
        let body: QdrantResponse<T> = response.json().await?;
        body.result.ok_or_else(|| {
            RetrievalError::VectorStore(format!("Qdrant response without result: {}", body.status))
        })
    }

    /// List collection names; doubles as the health probe.
    pub async fn list_collections(&self) -> RetrievalResult<Vec<String>> {
        let url = format!("{}/collections", self.base_url.trim_end_matches('/'));
        let response = self.client.get(&url).send().await?;
        let result: CollectionsResult = self.check(response).await?;
        Ok(result.collections.into_iter().map(|c| c.name).collect())
    }

    /// Create the collection when missing: cosine metric, fixed dimension.
    pub async fn ensure_collection(
        &self,
        collection: Collection,
        dimension: usize,
    ) -> RetrievalResult<()> {
        let existing = self.list_collections().await?;
        if existing.iter().any(|name| name == collection.as_str()) {
            debug!("Collection '{}' already exists", collection.as_str());
            return Ok(());
        }

        let url = self.collection_url(collection, "");
        let response = self
            .client
            .put(&url)
            .json(&json!({
                "vectors": { "size": dimension, "distance": "Cosine" }
            }))
            .send()
            .await?;
        let _: bool = self.check(response).await?;

        info!(
            "Created collection '{}' with dimension {}",
            collection.as_str(),
            dimension
        );
        Ok(())
    }

    /// Upsert points in batches. Deterministic ids make this idempotent.
    pub async fn upsert(
        &self,
        collection: Collection,
        points: Vec<VectorPoint>,
        batch_size: usize,
    ) -> RetrievalResult<usize> {
        if points.is_empty() {
            return Ok(0);
        }

        let url = self.collection_url(collection, "/points?wait=true");
        let mut upserted = 0usize;

        for batch in points.chunks(batch_size.max(1)) {
            let body = json!({
                "points": batch
                    .iter()
                    .map(|p| json!({
                        "id": p.id,
                        "vector": p.vector,
                        "payload": p.payload,
                    }))
                    .collect::<Vec<_>>()
            });

            let response = self.client.put(&url).json(&body).send().await?;
            let _: Value = self.check(response).await?;
            upserted += batch.len();
        }

        debug!(
            "Upserted {} points into collection '{}'",
            upserted,
            collection.as_str()
        );
        Ok(upserted)
    }

    /// Delete all points matching an exact-match payload filter. Used to drop
    /// stale chunks before re-ingesting an entity.
    pub async fn delete_by_filter(
        &self,
        collection: Collection,
        filter: &HashMap<String, String>,
    ) -> RetrievalResult<()> {
        let url = self.collection_url(collection, "/points/delete?wait=true");
        let response = self
            .client
            .post(&url)
            .json(&json!({ "filter": build_filter(filter) }))
            .send()
            .await?;
        let _: Value = self.check(response).await?;
        Ok(())
    }

    /// Top-k cosine search with an optional conjunction of exact-match
    /// predicates.
    pub async fn search(
        &self,
        collection: Collection,
        vector: Vec<f32>,
        top_k: usize,
        metadata_filter: Option<&HashMap<String, String>>,
    ) -> RetrievalResult<Vec<(f32, Map<String, Value>)>> {
        let url = self.collection_url(collection, "/points/search");
        let request = SearchRequest {
            vector,
            limit: top_k,
            with_payload: true,
            filter: metadata_filter
                .filter(|f| !f.is_empty())
                .map(build_filter),
        };

        let response = self.client.post(&url).json(&request).send().await?;
        let hits: Vec<ScoredPoint> = self.check(response).await?;

        Ok(hits
            .into_iter()
            .map(|hit| (hit.score, hit.payload.unwrap_or_default()))
            .collect())
    }

    /// Scroll every payload in a collection; feeds the BM25 index build.
    pub async fn scroll_payloads(
        &self,
        collection: Collection,
    ) -> RetrievalResult<Vec<(String, Map<String, Value>)>> {
        let url = self.collection_url(collection, "/points/scroll");
        let mut offset = Value::Null;
        let mut all = Vec::new();

        loop {
            let mut body = json!({
                "limit": 256,
                "with_payload": true,
                "with_vector": false,
            });
            if !offset.is_null() {
                body["offset"] = offset.clone();
            }

            let response = self.client.post(&url).json(&body).send().await?;
            let result: ScrollResult = self.check(response).await?;

            for point in result.points {
                let payload = point.payload.unwrap_or_default();
                let id = payload
                    .get("chunk_id")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| point.id.to_string().trim_matches('"').to_string());
                all.push((id, payload));
            }

            if result.next_page_offset.is_null() {
                break;
            }
            offset = result.next_page_offset;
        }

        Ok(all)
    }
}

fn build_filter(filter: &HashMap<String, String>) -> Value {
    let conditions: Vec<Value> = filter
        .iter()
        .map(|(key, value)| json!({ "key": key, "match": { "value": value } }))
        .collect();
    json!({ "must": conditions })
}

/// Dense retriever: embed the query, search the vector store, materialize
/// display documents from payloads.
#[derive(Clone)]
pub struct DenseRetriever {
    embedding: EmbeddingClient,
    store: VectorStore,
}

impl DenseRetriever {
    pub fn new(embedding: EmbeddingClient, store: VectorStore) -> Self {
        Self { embedding, store }
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    pub fn embedding_client(&self) -> &EmbeddingClient {
        &self.embedding
    }

    pub async fn search(
        &self,
        query: &str,
        collection: Collection,
        top_k: usize,
        metadata_filter: Option<&HashMap<String, String>>,
    ) -> RetrievalResult<Vec<RetrievedDocument>> {
        debug!(
            "Vector search: query='{}', collection={}, top_k={}",
            query.chars().take(50).collect::<String>(),
            collection.as_str(),
            top_k
        );

        let query_vector = self.embedding.embed(query).await?;
        let hits = self
            .store
            .search(collection, query_vector, top_k, metadata_filter)
            .await?;

        let results = hits
            .into_iter()
            .filter(|(_, payload)| {
                // Zero-vector placeholders from failed embedding batches are
                // stamped in the payload; they never count as real matches.
                payload
                    .get("embedding_failed")
                    .and_then(|v| v.as_str())
                    .map_or(true, |v| v != "true")
            })
            .map(|(score, payload)| {
                let document = match DocumentPayload::from_map(&payload) {
                    Some(doc) => doc.display_text(),
                    None => generic_text(&payload),
                };
                let id = payload
                    .get("chunk_id")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                RetrievedDocument {
                    id,
                    document,
                    metadata: sanitize_metadata(&payload),
                    collection,
                    source: RetrievalSource::VectorSearch,
                    score,
                }
            })
            .collect::<Vec<_>>();

        debug!("Vector search returned {} results", results.len());
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_id_is_deterministic() {
        let a = point_id("ticket_123_header_0");
        let b = point_id("ticket_123_header_0");
        let c = point_id("ticket_123_header_1");
        assert_eq!(a, b);
        assert_ne!(a, c);
        // Valid UUID text.
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn test_build_filter() {
        let mut filter = HashMap::new();
        filter.insert("status".to_string(), "open".to_string());
        let value = build_filter(&filter);
        assert_eq!(
            value["must"][0],
            json!({ "key": "status", "match": { "value": "open" } })
        );
    }
}
