//! Health endpoint: per-subsystem availability plus process uptime.

use actix_web::{web, HttpResponse};
use chrono::Utc;

use helpdesk_models::api::HealthResponse;

use crate::state::AppState;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let ollama_available = state.ollama.is_available().await;
    state.stats.set_ollama_available(ollama_available);

    let vector_store_available = state.vector_store.list_collections().await.is_ok();
    let graph_available = state.graph.read().node_count() > 0;

    let status = if ollama_available && vector_store_available && graph_available {
        "healthy"
    } else if vector_store_available {
        "degraded"
    } else {
        "unhealthy"
    };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        ollama_available,
        vector_store_available,
        graph_available,
        uptime_seconds: state.stats.uptime_seconds(),
        timestamp: Utc::now().to_rfc3339(),
    })
}
