//! Statistics endpoint: query counters plus a live resource sample.

use actix_web::{web, HttpResponse};

use crate::state::AppState;

pub async fn get_stats(state: web::Data<AppState>) -> HttpResponse {
    let (cpu_percent, memory_percent) = state.resources.sample();
    HttpResponse::Ok().json(state.stats.snapshot(cpu_percent, memory_percent))
}
