//! Application context threaded through every request handler.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use graph_rag::KnowledgeGraph;
use helpdesk_config::AppConfig;
use retrieval::{HybridRetrieval, Reranker, VectorStore};

use crate::services::cache::ResultCache;
use crate::services::context::ContextBuilder;
use crate::services::llm::OllamaClient;
use crate::services::rate_limiter::RateLimiter;
use crate::services::resources::ResourceMonitor;
use crate::services::stats::ServiceStats;

pub struct AppState {
    pub hybrid: HybridRetrieval,
    pub reranker: Reranker,
    pub context_builder: ContextBuilder,
    pub ollama: OllamaClient,
    pub graph: Arc<RwLock<KnowledgeGraph>>,
    pub vector_store: VectorStore,
    pub rate_limiter: RateLimiter,
    pub cache: ResultCache,
    pub stats: ServiceStats,
    pub resources: ResourceMonitor,
    pub query_semaphore: Semaphore,
}

impl AppState {
    pub fn new(config: AppConfig, hybrid: HybridRetrieval, ollama: OllamaClient) -> Self {
        let graph = hybrid.graph_handle();
        let vector_store = hybrid.dense().store().clone();

        Self {
            rate_limiter: RateLimiter::new(
                config.rate_limit.max_requests,
                Duration::from_secs(config.rate_limit.window_secs),
            ),
            cache: ResultCache::new(
                config.cache.max_entries,
                Duration::from_secs(config.cache.ttl_secs),
            ),
            stats: ServiceStats::new(),
            resources: ResourceMonitor::new(config.resources),
            query_semaphore: Semaphore::new(config.max_concurrent_queries),
            context_builder: ContextBuilder::new(config.max_context_length),
            reranker: Reranker::new(),
            graph,
            vector_store,
            hybrid,
            ollama,
        }
    }
}
