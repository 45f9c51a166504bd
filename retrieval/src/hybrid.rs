//! Hybrid retrieval: fan out to the enabled retrievers, deduplicate by
//! document id, min-max normalize per-method scores, and combine them with
//! configurable weights.

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use graph_rag::KnowledgeGraph;
use helpdesk_models::retrieval::{Collection, HybridResult, MethodScores, RetrievedDocument};

use crate::bm25::{Bm25Index, Bm25Search};
use crate::errors::RetrievalResult;
use crate::graph_search::GraphRetriever;
use crate::vector::DenseRetriever;

/// Relative weights of the three retrieval methods. Stored normalized to sum
/// to 1.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalWeights {
    pub vector: f32,
    pub bm25: f32,
    pub graph: f32,
}

impl Default for RetrievalWeights {
    fn default() -> Self {
        Self {
            vector: 0.5,
            bm25: 0.3,
            graph: 0.2,
        }
    }
}

impl RetrievalWeights {
    pub fn normalized(vector: f32, bm25: f32, graph: f32) -> Self {
        let total = vector + bm25 + graph;
        if total <= 0.0 {
            return Self::default();
        }
        Self {
            vector: vector / total,
            bm25: bm25 / total,
            graph: graph / total,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub top_k: usize,
    pub collection: Collection,
    pub use_vector: bool,
    pub use_bm25: bool,
    pub use_graph: bool,
    pub metadata_filter: Option<HashMap<String, String>>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: 10,
            collection: Collection::Tickets,
            use_vector: true,
            use_bm25: true,
            use_graph: true,
            metadata_filter: None,
        }
    }
}

struct Bucket {
    document: String,
    metadata: Map<String, Value>,
    collection: Collection,
    raw: MethodScores,
}

/// Hybrid retrieval over the dense, sparse, and graph retrievers.
///
/// BM25 indexes and the knowledge graph sit behind read-write locks: request
/// handlers take shared read guards, refreshes swap snapshots under the write
/// lock.
pub struct HybridRetrieval {
    dense: DenseRetriever,
    bm25: Arc<RwLock<Bm25Search>>,
    graph: Arc<RwLock<KnowledgeGraph>>,
    weights: RetrievalWeights,
}

impl HybridRetrieval {
    pub fn new(
        dense: DenseRetriever,
        bm25: Arc<RwLock<Bm25Search>>,
        graph: Arc<RwLock<KnowledgeGraph>>,
    ) -> Self {
        info!("Hybrid retrieval initialized");
        Self {
            dense,
            bm25,
            graph,
            weights: RetrievalWeights::default(),
        }
    }

    pub fn graph_handle(&self) -> Arc<RwLock<KnowledgeGraph>> {
        Arc::clone(&self.graph)
    }

    pub fn bm25_handle(&self) -> Arc<RwLock<Bm25Search>> {
        Arc::clone(&self.bm25)
    }

    pub fn dense(&self) -> &DenseRetriever {
        &self.dense
    }

    /// Replace the weights; they are renormalized to sum to 1.
    pub fn set_weights(&mut self, vector: f32, bm25: f32, graph: f32) {
        self.weights = RetrievalWeights::normalized(vector, bm25, graph);
        info!(
            "Updated weights: vector={:.2} bm25={:.2} graph={:.2}",
            self.weights.vector, self.weights.bm25, self.weights.graph
        );
    }

    /// Rebuild the BM25 index of one collection from the vector store, then
    /// swap it in under the write lock.
    pub async fn refresh_bm25(&self, collection: Collection) -> RetrievalResult<()> {
        let index = Bm25Index::from_store(self.dense.store(), collection).await?;
        self.bm25.write().replace(collection, index);
        Ok(())
    }

    /// Run the enabled retrievers with a 2x over-fetch, fuse by document id,
    /// and rank by combined score.
    pub async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> RetrievalResult<Vec<HybridResult>> {
        debug!(
            "Hybrid search: query='{}', top_k={}, vector={}, bm25={}, graph={}",
            query.chars().take(50).collect::<String>(),
            options.top_k,
            options.use_vector,
            options.use_bm25,
            options.use_graph
        );

        let fetch_k = options.top_k * 2;
        let mut buckets: IndexMap<String, Bucket> = IndexMap::new();

        if options.use_vector {
            match self
                .dense
                .search(
                    query,
                    options.collection,
                    fetch_k,
                    options.metadata_filter.as_ref(),
                )
                .await
            {
                Ok(results) => {
                    debug!("Vector search contributed {} results", results.len());
                    for result in results {
                        merge(&mut buckets, result, Method::Vector);
                    }
                }
                Err(e) => error!("Vector search failed: {}", e),
            }
        }

        if options.use_bm25 {
            let bm25_results = self.bm25.read().search(query, options.collection, fetch_k);
            match bm25_results {
                Ok(results) => {
                    debug!("BM25 search contributed {} results", results.len());
                    for result in results {
                        merge(&mut buckets, result, Method::Bm25);
                    }
                }
                Err(e) => warn!("BM25 search failed: {}", e),
            }
        }

        if options.use_graph {
            let graph = self.graph.read();
            let results = GraphRetriever::search(&graph, query, 2, fetch_k);
            debug!("Graph search contributed {} results", results.len());
            for result in results {
                merge(&mut buckets, result, Method::Graph);
            }
        }

        let mut combined = combine_scores(buckets, self.weights);
        combined.sort_by(|a, b| {
            b.combined_score
                .partial_cmp(&a.combined_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        combined.truncate(options.top_k);

        debug!("Hybrid search returned {} final results", combined.len());
        Ok(combined)
    }
}

#[derive(Clone, Copy)]
enum Method {
    Vector,
    Bm25,
    Graph,
}

fn merge(buckets: &mut IndexMap<String, Bucket>, result: RetrievedDocument, method: Method) {
    let bucket = buckets.entry(result.id.clone()).or_insert_with(|| Bucket {
        document: result.document.clone(),
        metadata: result.metadata.clone(),
        collection: result.collection,
        raw: MethodScores::default(),
    });
    match method {
        Method::Vector => bucket.raw.vector = Some(result.score),
        Method::Bm25 => bucket.raw.bm25 = Some(result.score),
        Method::Graph => bucket.raw.graph = Some(result.score),
    }
}

/// Min-max normalize each method's scores across the bucket set, then take
/// the weighted mean over the methods that contributed to each document.
/// Insertion order is preserved, which makes ties stable.
fn combine_scores(buckets: IndexMap<String, Bucket>, weights: RetrievalWeights) -> Vec<HybridResult> {
    let normalize = |values: Vec<Option<f32>>| -> Vec<Option<f32>> {
        let present: Vec<f32> = values.iter().filter_map(|v| *v).collect();
        if present.is_empty() {
            return values;
        }
        let min = present.iter().cloned().fold(f32::INFINITY, f32::min);
        let max = present.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        values
            .into_iter()
            .map(|value| {
                value.map(|s| {
                    if max > min {
                        (s - min) / (max - min)
                    } else if s > 0.0 {
                        1.0
                    } else {
                        0.0
                    }
                })
            })
            .collect()
    };

    let vector_norm = normalize(buckets.values().map(|b| b.raw.vector).collect());
    let bm25_norm = normalize(buckets.values().map(|b| b.raw.bm25).collect());
    let graph_norm = normalize(buckets.values().map(|b| b.raw.graph).collect());

    buckets
        .into_iter()
        .enumerate()
        .map(|(index, (id, bucket))| {
            let scores = MethodScores {
                vector: vector_norm[index],
                bm25: bm25_norm[index],
                graph: graph_norm[index],
            };

            let mut combined = 0.0f32;
            let mut total_weight = 0.0f32;
            if let Some(score) = scores.vector {
                combined += score * weights.vector;
                total_weight += weights.vector;
            }
            if let Some(score) = scores.bm25 {
                combined += score * weights.bm25;
                total_weight += weights.bm25;
            }
            if let Some(score) = scores.graph {
                combined += score * weights.graph;
                total_weight += weights.graph;
            }
            let combined_score = if total_weight > 0.0 {
                combined / total_weight
            } else {
                0.0
            };

            HybridResult {
                id,
                document: bucket.document,
                metadata: bucket.metadata,
                collection: bucket.collection,
                scores,
                combined_score,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn bucket(vector: Option<f32>, bm25: Option<f32>, graph: Option<f32>) -> Bucket {
        Bucket {
            document: String::new(),
            metadata: Map::new(),
            collection: Collection::Tickets,
            raw: MethodScores {
                vector,
                bm25,
                graph,
            },
        }
    }

    fn combine(entries: Vec<(&str, Bucket)>) -> Vec<HybridResult> {
        let buckets: IndexMap<String, Bucket> = entries
            .into_iter()
            .map(|(id, b)| (id.to_string(), b))
            .collect();
        combine_scores(buckets, RetrievalWeights::default())
    }

    #[test]
    fn test_min_max_normalization() {
        let results = combine(vec![
            ("a", bucket(Some(0.9), None, None)),
            ("b", bucket(Some(0.5), None, None)),
            ("c", bucket(Some(0.1), None, None)),
        ]);

        assert_eq!(results[0].scores.vector, Some(1.0));
        assert_eq!(results[1].scores.vector, Some(0.5));
        assert_eq!(results[2].scores.vector, Some(0.0));
    }

    #[test]
    fn test_degenerate_range_maps_positive_to_one() {
        let results = combine(vec![
            ("a", bucket(None, Some(3.2), None)),
            ("b", bucket(None, Some(3.2), None)),
        ]);
        assert_eq!(results[0].scores.bm25, Some(1.0));
        assert_eq!(results[1].scores.bm25, Some(1.0));

        let zero = combine(vec![("a", bucket(None, Some(0.0), None))]);
        assert_eq!(zero[0].scores.bm25, Some(0.0));
    }

    #[test]
    fn test_combined_score_is_weighted_mean_of_contributors() {
        let results = combine(vec![
            ("a", bucket(Some(0.8), Some(10.0), None)),
            ("b", bucket(Some(0.2), Some(2.0), None)),
        ]);

        // Document a: both methods normalize to 1.0, so the weighted mean is
        // 1.0 regardless of weights.
        assert!((results[0].combined_score - 1.0).abs() < 1e-6);
        // Document b: both normalize to 0.0.
        assert!(results[1].combined_score.abs() < 1e-6);

        for result in &results {
            assert!((0.0..=1.0).contains(&result.combined_score));
        }
    }

    #[test]
    fn test_single_method_equivalence() {
        // With one retriever enabled, the combined score equals that
        // retriever's normalized score.
        let results = combine(vec![
            ("a", bucket(None, None, Some(0.4))),
            ("b", bucket(None, None, Some(0.1))),
        ]);

        for result in &results {
            assert_eq!(Some(result.combined_score), result.scores.graph);
        }
    }

    #[test]
    fn test_partial_overlap_renormalizes_weights() {
        let results = combine(vec![
            ("both", bucket(Some(1.0), Some(5.0), None)),
            ("vector_only", bucket(Some(0.0), None, None)),
        ]);

        // vector_only contributes through the vector method alone, so its
        // combined score is its normalized vector score (0.0), not dragged
        // further down by absent methods.
        let vector_only = results.iter().find(|r| r.id == "vector_only").unwrap();
        assert_eq!(vector_only.combined_score, 0.0);

        let both = results.iter().find(|r| r.id == "both").unwrap();
        assert!((both.combined_score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_insertion_order_preserved_for_ties() {
        let results = combine(vec![
            ("first", bucket(Some(0.7), None, None)),
            ("second", bucket(Some(0.7), None, None)),
        ]);
        assert_eq!(results[0].id, "first");
        assert_eq!(results[1].id, "second");
        assert_eq!(results[0].combined_score, results[1].combined_score);
    }

    #[test]
    fn test_weight_renormalization() {
        let weights = RetrievalWeights::normalized(5.0, 3.0, 2.0);
        assert!((weights.vector - 0.5).abs() < 1e-6);
        assert!((weights.bm25 - 0.3).abs() < 1e-6);
        assert!((weights.graph - 0.2).abs() < 1e-6);
    }
}
