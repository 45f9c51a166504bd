use serde::{Deserialize, Serialize};

fn default_top_k() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

/// Request body for the RAG query endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_true")]
    pub include_tickets: bool,
    #[serde(default = "default_true")]
    pub include_kb: bool,
    #[serde(default = "default_false")]
    pub include_ci: bool,
    #[serde(default = "default_true")]
    pub use_vector: bool,
    #[serde(default = "default_true")]
    pub use_bm25: bool,
    #[serde(default = "default_true")]
    pub use_graph: bool,
}

/// Source document with provenance, returned alongside the answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: Option<String>,
    pub ticket_number: Option<String>,
    pub score: f32,
    pub source_type: String,
}

/// Relationship chain from the knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipChain {
    pub source: String,
    pub target: String,
    pub relationship: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub success: bool,
    pub ai_answer: String,
    pub confidence_score: f32,
    pub sources: Vec<SourceDocument>,
    pub relationships: Vec<RelationshipChain>,
    pub uncertainties: Vec<String>,
    pub response_time: f64,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub ollama_available: bool,
    pub vector_store_available: bool,
    pub graph_available: bool,
    pub uptime_seconds: f64,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_queries: u64,
    pub successful_queries: u64,
    pub failed_queries: u64,
    pub throttled_queries: u64,
    pub cached_queries: u64,
    pub success_rate: f64,
    pub cache_hit_rate: f64,
    pub avg_response_time: f64,
    pub uptime_seconds: f64,
    pub ollama_available: bool,
    pub current_cpu_percent: f32,
    pub current_memory_percent: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let req: QueryRequest =
            serde_json::from_str(r#"{"query": "laptop start niet"}"#).unwrap();
        assert_eq!(req.top_k, 10);
        assert!(req.include_tickets);
        assert!(req.include_kb);
        assert!(!req.include_ci);
        assert!(req.use_vector && req.use_bm25 && req.use_graph);
    }
}
