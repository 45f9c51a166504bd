//! In-memory Okapi BM25 index per collection.
//!
//! Indexes are built by scrolling payloads out of the vector store and can be
//! rebuilt one collection at a time while the process is serving. Scoring is
//! standard Okapi BM25 with k1 = 1.2 and b = 0.75, the IDF variant
//! `ln((N - df + 0.5) / (df + 0.5) + 1)`.

use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use helpdesk_models::documents::{generic_text, sanitize_metadata, DocumentPayload};
use helpdesk_models::retrieval::{Collection, RetrievalSource, RetrievedDocument};

use crate::errors::{RetrievalError, RetrievalResult};
use crate::vector::VectorStore;

const K1: f32 = 1.2;
const B: f32 = 0.75;

/// Lowercase whitespace tokenization, shared by indexing and querying.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|t| t.to_string())
        .collect()
}

struct IndexedDoc {
    id: String,
    text: String,
    payload: Map<String, Value>,
    length: u32,
}

/// BM25 index over one collection.
pub struct Bm25Index {
    docs: Vec<IndexedDoc>,
    /// term -> (doc index -> term frequency)
    postings: HashMap<String, HashMap<usize, u32>>,
    avg_doc_length: f32,
}

impl Bm25Index {
    pub fn build(documents: Vec<(String, String, Map<String, Value>)>) -> Self {
        let mut docs = Vec::with_capacity(documents.len());
        let mut postings: HashMap<String, HashMap<usize, u32>> = HashMap::new();
        let mut total_length = 0u64;

        for (doc_index, (id, text, payload)) in documents.into_iter().enumerate() {
            let tokens = tokenize(&text);
            let length = tokens.len() as u32;
            total_length += length as u64;

            for token in tokens {
                *postings.entry(token).or_default().entry(doc_index).or_insert(0) += 1;
            }

            docs.push(IndexedDoc {
                id,
                text,
                payload,
                length,
            });
        }

        let avg_doc_length = if docs.is_empty() {
            0.0
        } else {
            total_length as f32 / docs.len() as f32
        };

        Self {
            docs,
            postings,
            avg_doc_length,
        }
    }

    /// Build by scrolling a collection's payloads out of the vector store.
    pub async fn from_store(
        store: &VectorStore,
        collection: Collection,
    ) -> RetrievalResult<Self> {
        let payloads = store.scroll_payloads(collection).await?;

        let documents = payloads
            .into_iter()
            .map(|(id, payload)| {
                let text = match DocumentPayload::from_map(&payload) {
                    Some(doc) => doc.searchable_text(),
                    None => generic_text(&payload),
                };
                (id, text, payload)
            })
            .collect();

        Ok(Self::build(documents))
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    fn idf(&self, term: &str) -> f32 {
        let n = self.docs.len() as f32;
        let df = self.postings.get(term).map_or(0, |p| p.len()) as f32;
        if df == 0.0 {
            return 0.0;
        }
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// BM25 scores for all documents against the tokenized query.
    fn scores(&self, query_tokens: &[String]) -> Vec<f32> {
        let mut scores = vec![0.0f32; self.docs.len()];

        for token in query_tokens {
            let Some(posting) = self.postings.get(token) else {
                continue;
            };
            let idf = self.idf(token);

            for (&doc_index, &tf) in posting {
                let doc_length = self.docs[doc_index].length as f32;
                let tf = tf as f32;
                let norm = tf * (K1 + 1.0)
                    / (tf + K1 * (1.0 - B + B * doc_length / self.avg_doc_length.max(1.0)));
                scores[doc_index] += idf * norm;
            }
        }

        scores
    }

    /// Top-k documents with positive scores.
    pub fn search(&self, query: &str, top_k: usize, collection: Collection) -> Vec<RetrievedDocument> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() || self.docs.is_empty() {
            return Vec::new();
        }

        let scores = self.scores(&query_tokens);
        let mut ranked: Vec<(usize, f32)> = scores
            .into_iter()
            .enumerate()
            .filter(|(_, score)| *score > 0.0)
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(top_k);

        ranked
            .into_iter()
            .map(|(doc_index, score)| {
                let doc = &self.docs[doc_index];
                RetrievedDocument {
                    id: doc.id.clone(),
                    document: doc.text.clone(),
                    metadata: sanitize_metadata(&doc.payload),
                    collection,
                    source: RetrievalSource::Bm25Search,
                    score,
                }
            })
            .collect()
    }
}

/// Keyword search over all collections; one index each.
pub struct Bm25Search {
    indexes: HashMap<Collection, Bm25Index>,
}

impl Bm25Search {
    pub fn empty() -> Self {
        Self {
            indexes: HashMap::new(),
        }
    }

    /// Build indexes for all collections from the vector store's payloads.
    pub async fn build_all(store: &VectorStore) -> Self {
        info!("Initializing BM25 search...");
        let mut indexes = HashMap::new();

        for collection in Collection::all() {
            match Bm25Index::from_store(store, collection).await {
                Ok(index) => {
                    if index.is_empty() {
                        warn!("No documents in collection {}", collection.as_str());
                    } else {
                        info!(
                            "Built BM25 index for {}: {} documents",
                            collection.as_str(),
                            index.len()
                        );
                    }
                    indexes.insert(collection, index);
                }
                Err(e) => {
                    warn!(
                        "Error building BM25 index for {}: {}",
                        collection.as_str(),
                        e
                    );
                }
            }
        }

        Self { indexes }
    }

    /// Swap in a freshly built index for one collection without touching the
    /// others. Callers build the index first, then take the write lock.
    pub fn replace(&mut self, collection: Collection, index: Bm25Index) {
        info!(
            "Refreshed BM25 index for {}: {} documents",
            collection.as_str(),
            index.len()
        );
        self.indexes.insert(collection, index);
    }

    pub fn document_count(&self, collection: Collection) -> usize {
        self.indexes.get(&collection).map_or(0, |i| i.len())
    }

    pub fn search(
        &self,
        query: &str,
        collection: Collection,
        top_k: usize,
    ) -> RetrievalResult<Vec<RetrievedDocument>> {
        debug!(
            "BM25 search: query='{}', collection={}, top_k={}",
            query.chars().take(50).collect::<String>(),
            collection.as_str(),
            top_k
        );

        let index = self
            .indexes
            .get(&collection)
            .ok_or_else(|| RetrievalError::IndexMissing(collection.as_str().to_string()))?;

        let results = index.search(query, top_k, collection);
        debug!("BM25 search returned {} results", results.len());
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, text: &str) -> (String, String, Map<String, Value>) {
        let mut payload = Map::new();
        payload.insert("chunk_id".to_string(), json!(id));
        payload.insert("type".to_string(), json!("ticket"));
        (id.to_string(), text.to_string(), payload)
    }

    fn sample_index() -> Bm25Index {
        Bm25Index::build(vec![
            doc("ticket_1_header_0", "laptop start niet op blue screen"),
            doc("ticket_2_header_0", "printer geeft paper jam fout"),
            doc("ticket_3_header_0", "laptop accu leeg na update"),
        ])
    }

    #[test]
    fn test_matching_documents_rank_by_relevance() {
        let index = sample_index();
        let results = index.search("laptop start niet", 10, Collection::Tickets);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "ticket_1_header_0");
        assert!(results[0].score > results[1].score);
        assert!(results.iter().all(|r| r.score > 0.0));
    }

    #[test]
    fn test_no_match_returns_empty() {
        let index = sample_index();
        assert!(index.search("beeldscherm", 10, Collection::Tickets).is_empty());
        assert!(index.search("", 10, Collection::Tickets).is_empty());
    }

    #[test]
    fn test_rare_token_scores_above_common_token() {
        let index = sample_index();
        // "laptop" appears in two documents, "printer" in one: the rarer term
        // carries a higher IDF.
        assert!(index.idf("printer") > index.idf("laptop"));
    }

    #[test]
    fn test_top_k_truncation() {
        let index = sample_index();
        let results = index.search("laptop", 1, Collection::Tickets);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_search_without_index_errors() {
        let search = Bm25Search::empty();
        assert!(matches!(
            search.search("laptop", Collection::Tickets, 5),
            Err(RetrievalError::IndexMissing(_))
        ));
    }

    #[test]
    fn test_replace_swaps_single_collection() {
        let mut search = Bm25Search::empty();
        search.replace(Collection::Tickets, sample_index());
        assert_eq!(search.document_count(Collection::Tickets), 3);
        assert_eq!(search.document_count(Collection::KnowledgeBase), 0);

        search.replace(
            Collection::Tickets,
            Bm25Index::build(vec![doc("ticket_9_header_0", "nieuw document")]),
        );
        assert_eq!(search.document_count(Collection::Tickets), 1);
    }
}
