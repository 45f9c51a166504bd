//! The RAG query endpoint.
//!
//! A request moves through validation, the per-client rate limit, the
//! resource check, and the result cache before acquiring a concurrency permit
//! and running retrieval, reranking, context assembly, and generation. No
//! failure escapes as a panic or opaque 500: governance rejections map to
//! HTTP errors, and a generation failure returns a structured `success=false`
//! body in the user's language.

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use std::time::Instant;
use tracing::{info, warn};

use helpdesk_models::api::{QueryRequest, QueryResponse};
use helpdesk_models::retrieval::Collection;
use retrieval::SearchOptions;

use crate::errors::ApiError;
use crate::services::cache::ResultCache;
use crate::services::llm::LlmError;
use crate::services::postprocess::post_process;
use crate::services::prompt::generate_rag_prompt;
use crate::state::AppState;

const MAX_QUERY_LENGTH: usize = 500;
const MAX_TOP_K: usize = 50;

fn validate(request: &QueryRequest) -> Result<(), ApiError> {
    if request.query.trim().is_empty() {
        return Err(ApiError::Validation(
            "query must not be empty".to_string(),
        ));
    }
    if request.query.chars().count() > MAX_QUERY_LENGTH {
        return Err(ApiError::Validation(format!(
            "query must be at most {} characters",
            MAX_QUERY_LENGTH
        )));
    }
    if request.top_k < 1 || request.top_k > MAX_TOP_K {
        return Err(ApiError::Validation(format!(
            "top_k must be between 1 and {}",
            MAX_TOP_K
        )));
    }
    Ok(())
}

fn client_ip(http_request: &HttpRequest) -> String {
    http_request
        .connection_info()
        .realip_remote_addr()
        .map(|addr| addr.split(':').next().unwrap_or(addr).to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rag_query(
    state: web::Data<AppState>,
    request: web::Json<QueryRequest>,
    http_request: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let start = Instant::now();
    let request = request.into_inner();
    state.stats.record_query();

    let client = client_ip(&http_request);
    info!(
        "Received query from {}: '{}'",
        client,
        request.query.chars().take(100).collect::<String>()
    );

    validate(&request)?;

    // The slot guard frees the rate-limit budget again if the client
    // disconnects before the request completes.
    let Some(slot) = state.rate_limiter.try_acquire(&client) else {
        state.stats.record_throttled();
        warn!("Rate limit exceeded for {}", client);
        return Err(ApiError::RateLimited {
            max_requests: state.rate_limiter.max_requests(),
            window_secs: state.rate_limiter.window_secs(),
        });
    };

    if state.resources.overloaded() {
        state.stats.record_throttled();
        warn!("System resources exceeded threshold");
        slot.commit();
        return Err(ApiError::Overloaded);
    }

    let cache_key = ResultCache::key(&request);
    if let Some(mut cached) = state.cache.get(&cache_key) {
        state.stats.record_cached();
        info!("Returning cached response");
        cached.response_time = start.elapsed().as_secs_f64();
        slot.commit();
        return Ok(HttpResponse::Ok().json(cached));
    }

    let _permit = state
        .query_semaphore
        .acquire()
        .await
        .map_err(|_| ApiError::Internal("query gate closed".to_string()))?;

    let response = run_pipeline(&state, &request, start).await;
    slot.commit();

    // Failures are never cached; a retry should reach the pipeline again.
    if response.success {
        state.cache.put(cache_key, response.clone());
    }

    Ok(HttpResponse::Ok().json(response))
}

async fn run_pipeline(
    state: &web::Data<AppState>,
    request: &QueryRequest,
    start: Instant,
) -> QueryResponse {
    let mut collections = Vec::new();
    if request.include_tickets {
        collections.push(Collection::Tickets);
    }
    if request.include_kb {
        collections.push(Collection::KnowledgeBase);
    }
    if request.include_ci {
        collections.push(Collection::ConfigurationItems);
    }
    if collections.is_empty() {
        collections.push(Collection::Tickets);
    }

    info!("Step 1: Executing hybrid search...");
    let mut all_results = Vec::new();
    for collection in collections {
        let options = SearchOptions {
            // Over-fetch for reranking headroom.
            top_k: request.top_k * 2,
            collection,
            use_vector: request.use_vector,
            use_bm25: request.use_bm25,
            use_graph: request.use_graph,
            metadata_filter: None,
        };
        match state.hybrid.search(&request.query, &options).await {
            Ok(results) => all_results.extend(results),
            Err(e) => warn!("Search failed for collection {}: {}", collection.as_str(), e),
        }
    }
    info!("Retrieved {} results", all_results.len());

    info!("Step 2: Reranking results...");
    let reranked = state.reranker.rerank(all_results, request.top_k);

    info!("Step 3: Building context with provenance...");
    let (context, sources, relationships) =
        state.context_builder.build(&reranked, &state.graph);
    info!(
        "Built context with {} sources and {} relationships",
        sources.len(),
        relationships.len()
    );

    info!("Step 4: Generating prompt...");
    let prompt = generate_rag_prompt(&request.query, &context, &relationships);

    info!("Step 5: Querying Ollama...");
    match state.ollama.generate(&prompt).await {
        Ok(raw_answer) => {
            info!("Step 6: Post-processing response...");
            let (ai_answer, confidence_score, uncertainties) = post_process(&raw_answer, &sources);
            let response_time = start.elapsed().as_secs_f64();
            state.stats.record_success(response_time);
            info!("Query completed successfully in {:.2}s", response_time);

            QueryResponse {
                success: true,
                ai_answer,
                confidence_score,
                sources,
                relationships,
                uncertainties,
                response_time,
                timestamp: Utc::now().to_rfc3339(),
            }
        }
        Err(e) => {
            state.stats.record_failure();
            warn!("Generation failed: {}", e);

            let ai_answer = match e {
                LlmError::Timeout => {
                    "De AI-assistent reageerde niet binnen de tijdslimiet. \
                     Probeer het later opnieuw."
                }
                _ => {
                    "Er is een fout opgetreden bij het verwerken van uw vraag. \
                     Probeer het later opnieuw."
                }
            };

            QueryResponse {
                success: false,
                ai_answer: ai_answer.to_string(),
                confidence_score: 0.0,
                sources,
                relationships,
                uncertainties: vec!["Query processing failed".to_string()],
                response_time: start.elapsed().as_secs_f64(),
                timestamp: Utc::now().to_rfc3339(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::test as actix_test;
    use actix_web::App;
    use parking_lot::RwLock;
    use std::sync::Arc;

    use graph_rag::KnowledgeGraph;
    use helpdesk_config::AppConfig;
    use retrieval::{
        Bm25Search, DenseRetriever, EmbeddingClient, HybridRetrieval, VectorStore,
    };

    use crate::services::llm::OllamaClient;

    fn test_state() -> web::Data<AppState> {
        let mut config = AppConfig::from_env();
        // Keep admission deterministic on busy test machines and make sure
        // no live local Ollama can answer.
        config.resources.max_cpu_percent = 100.0;
        config.resources.max_memory_percent = 100.0;
        config.ollama.url = "http://127.0.0.1:1".to_string();
        let embedding = EmbeddingClient::new("http://127.0.0.1:1", "nomic-embed-text", 768);
        let store = VectorStore::new("http://127.0.0.1:1");
        let dense = DenseRetriever::new(embedding, store);
        let hybrid = HybridRetrieval::new(
            dense,
            Arc::new(RwLock::new(Bm25Search::empty())),
            Arc::new(RwLock::new(KnowledgeGraph::new())),
        );
        let ollama = OllamaClient::new(&config.ollama);
        web::Data::new(AppState::new(config, hybrid, ollama))
    }

    async fn post_query(
        state: &web::Data<AppState>,
        body: serde_json::Value,
    ) -> actix_web::dev::ServiceResponse {
        let app = actix_test::init_service(
            App::new()
                .app_data(state.clone())
                .route("/rag_query", web::post().to(rag_query)),
        )
        .await;

        let request = actix_test::TestRequest::post()
            .uri("/rag_query")
            .peer_addr("10.1.2.3:4000".parse().unwrap())
            .set_json(body)
            .to_request();
        actix_test::call_service(&app, request).await
    }

    #[actix_web::test]
    async fn test_empty_query_is_rejected() {
        let state = test_state();
        let response = post_query(&state, serde_json::json!({ "query": "  " })).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[actix_web::test]
    async fn test_oversized_query_is_rejected() {
        let state = test_state();
        let long_query = "a".repeat(501);
        let response = post_query(&state, serde_json::json!({ "query": long_query })).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[actix_web::test]
    async fn test_top_k_bounds() {
        let state = test_state();
        let response =
            post_query(&state, serde_json::json!({ "query": "laptop", "top_k": 0 })).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response =
            post_query(&state, serde_json::json!({ "query": "laptop", "top_k": 51 })).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[actix_web::test]
    async fn test_rate_limit_returns_429() {
        let state = test_state();

        // Exhaust the window directly, as eleven sequential requests would.
        for _ in 0..state.rate_limiter.max_requests() {
            state.rate_limiter.try_acquire("10.1.2.3").unwrap().commit();
        }

        let response = post_query(&state, serde_json::json!({ "query": "laptop" })).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(state.stats.snapshot(0.0, 0.0).throttled_queries, 1);
    }

    #[actix_web::test]
    async fn test_failed_generation_returns_structured_body() {
        // All upstreams point at closed ports: retrieval yields nothing and
        // the LLM call fails, which must still produce a well-formed
        // success=false response.
        let state = test_state();
        let response = post_query(&state, serde_json::json!({ "query": "laptop start niet" })).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body: QueryResponse = actix_test::read_body_json(response).await;
        assert!(!body.success);
        assert!(body.sources.is_empty());
        assert_eq!(body.confidence_score, 0.0);
        assert!(!body.uncertainties.is_empty());
        assert!(body.ai_answer.contains("Probeer het later opnieuw"));

        // Failures are not cached.
        let snapshot = state.stats.snapshot(0.0, 0.0);
        assert_eq!(snapshot.cached_queries, 0);
        assert_eq!(snapshot.failed_queries, 1);
    }

    #[test]
    fn test_validate_accepts_boundaries() {
        let min: QueryRequest =
            serde_json::from_value(serde_json::json!({ "query": "a", "top_k": 1 })).unwrap();
        assert!(validate(&min).is_ok());

        let max: QueryRequest = serde_json::from_value(
            serde_json::json!({ "query": "a".repeat(500), "top_k": 50 }),
        )
        .unwrap();
        assert!(validate(&max).is_ok());
    }
}
