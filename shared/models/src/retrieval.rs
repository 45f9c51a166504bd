use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Vector-store collections, one per document kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Tickets,
    KnowledgeBase,
    ConfigurationItems,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Tickets => "tickets",
            Collection::KnowledgeBase => "knowledge_base",
            Collection::ConfigurationItems => "configuration_items",
        }
    }

    pub fn all() -> [Collection; 3] {
        [
            Collection::Tickets,
            Collection::KnowledgeBase,
            Collection::ConfigurationItems,
        ]
    }
}

/// Which first-stage retriever produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalSource {
    VectorSearch,
    Bm25Search,
    GraphSearch,
}

impl RetrievalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalSource::VectorSearch => "vector_search",
            RetrievalSource::Bm25Search => "bm25_search",
            RetrievalSource::GraphSearch => "graph_search",
        }
    }
}

/// A single hit from one retrieval method, before fusion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub id: String,
    pub document: String,
    /// Sanitized metadata (string values only).
    pub metadata: Map<String, Value>,
    pub collection: Collection,
    pub source: RetrievalSource,
    /// Raw method score: cosine similarity, BM25 score, or centrality.
    pub score: f32,
}

/// Per-method scores for one fused document. `None` means the method did not
/// surface the document.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MethodScores {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bm25: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph: Option<f32>,
}

impl MethodScores {
    pub fn is_empty(&self) -> bool {
        self.vector.is_none() && self.bm25.is_none() && self.graph.is_none()
    }
}

/// A deduplicated document with normalized per-method scores and the weighted
/// combination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridResult {
    pub id: String,
    pub document: String,
    pub metadata: Map<String, Value>,
    pub collection: Collection,
    pub scores: MethodScores,
    pub combined_score: f32,
}

/// The five reranking factors, each in [0, 1].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RerankScores {
    pub similarity: f32,
    pub bm25: f32,
    pub centrality: f32,
    pub recency: f32,
    pub feedback: f32,
}

/// Final-stage result with the multi-factor score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedResult {
    pub id: String,
    pub document: String,
    pub metadata: Map<String, Value>,
    pub collection: Collection,
    pub scores: MethodScores,
    pub combined_score: f32,
    pub rerank_scores: RerankScores,
    pub final_score: f32,
}
