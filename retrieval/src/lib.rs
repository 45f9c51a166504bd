//! Hybrid retrieval for the helpdesk RAG platform.
//!
//! Three first-stage retrievers (dense vectors, BM25, graph traversal) feed a
//! score-normalizing fusion step, followed by a multi-factor reranker.

pub mod bm25;
pub mod embedding;
pub mod errors;
pub mod graph_search;
pub mod hybrid;
pub mod rerank;
pub mod vector;

pub use bm25::{Bm25Index, Bm25Search};
pub use embedding::EmbeddingClient;
pub use errors::{RetrievalError, RetrievalResult};
pub use graph_search::GraphRetriever;
pub use hybrid::{HybridRetrieval, RetrievalWeights, SearchOptions};
pub use rerank::{Reranker, RerankWeights};
pub use vector::{DenseRetriever, VectorPoint, VectorStore};
