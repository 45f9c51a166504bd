use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use parking_lot::RwLock;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{info, warn};

use graph_rag::{GraphStore, KnowledgeGraph};
use helpdesk_config::AppConfig;
use helpdesk_observability::{init_tracing, TracingConfig};
use retrieval::{Bm25Search, DenseRetriever, EmbeddingClient, HybridRetrieval, VectorStore};

mod errors;
mod handlers;
mod services;
mod state;

use services::llm::OllamaClient;
use state::AppState;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let config = AppConfig::from_env();
    let _guard = init_tracing(
        TracingConfig::for_service("rag_api").with_log_dir(config.log_dir.clone()),
    );

    info!("============================================================");
    info!("Starting RAG API service");
    info!("============================================================");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Knowledge graph: load the persisted snapshot; an empty graph degrades
    // the graph retriever but does not block startup.
    let mut graph = KnowledgeGraph::with_store(GraphStore::new(pool.clone()));
    if let Err(e) = graph
        .load_from_db(None, config.min_edge_confidence)
        .await
    {
        warn!("Could not load knowledge graph: {}", e);
    }
    let graph_stats = graph.get_stats();
    info!(
        "Knowledge graph loaded: {} nodes, {} edges",
        graph_stats.total_nodes, graph_stats.total_edges
    );
    let graph = Arc::new(RwLock::new(graph));

    // Retrieval stack.
    let vector_store = VectorStore::new(&config.qdrant_url);
    let embedding = EmbeddingClient::new(
        &config.ollama.url,
        &config.ollama.embedding_model,
        config.embedding_dimension,
    );
    let dense = DenseRetriever::new(embedding, vector_store.clone());

    let bm25 = Bm25Search::build_all(&vector_store).await;
    let bm25 = Arc::new(RwLock::new(bm25));

    let hybrid = HybridRetrieval::new(dense, bm25, graph);

    // Generation.
    let ollama = OllamaClient::new(&config.ollama);
    let ollama_available = ollama.is_available().await;
    if ollama_available {
        info!("Ollama is available");
    } else {
        warn!("Ollama is not available");
    }

    let host = config.api_host.clone();
    let port = config.api_port;

    let app_state = web::Data::new(AppState::new(config, hybrid, ollama));
    app_state.stats.set_ollama_available(ollama_available);

    info!("RAG API listening on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .app_data(app_state.clone())
            .wrap(cors)
            .route("/rag_query", web::post().to(handlers::rag_query))
            .route("/health", web::get().to(handlers::health_check))
            .route("/stats", web::get().to(handlers::get_stats))
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}
