//! Per-process query counters and the cumulative response-time average.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use helpdesk_models::api::StatsResponse;

pub struct ServiceStats {
    total_queries: AtomicU64,
    successful_queries: AtomicU64,
    failed_queries: AtomicU64,
    throttled_queries: AtomicU64,
    cached_queries: AtomicU64,
    avg_response_time: Mutex<f64>,
    ollama_available: AtomicBool,
    started_at: DateTime<Utc>,
}

impl ServiceStats {
    pub fn new() -> Self {
        Self {
            total_queries: AtomicU64::new(0),
            successful_queries: AtomicU64::new(0),
            failed_queries: AtomicU64::new(0),
            throttled_queries: AtomicU64::new(0),
            cached_queries: AtomicU64::new(0),
            avg_response_time: Mutex::new(0.0),
            ollama_available: AtomicBool::new(false),
            started_at: Utc::now(),
        }
    }

    pub fn record_query(&self) {
        self.total_queries.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a success and fold the response time into the running average.
    pub fn record_success(&self, response_time: f64) {
        let total = self.successful_queries.fetch_add(1, Ordering::Relaxed) + 1;
        let mut avg = self.avg_response_time.lock();
        if total == 1 {
            *avg = response_time;
        } else {
            *avg = (*avg * (total - 1) as f64 + response_time) / total as f64;
        }
    }

    pub fn record_failure(&self) {
        self.failed_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_throttled(&self) {
        self.throttled_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cached(&self) {
        self.cached_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_ollama_available(&self, available: bool) {
        self.ollama_available.store(available, Ordering::Relaxed);
    }

    pub fn ollama_available(&self) -> bool {
        self.ollama_available.load(Ordering::Relaxed)
    }

    pub fn uptime_seconds(&self) -> f64 {
        (Utc::now() - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    pub fn snapshot(&self, cpu_percent: f32, memory_percent: f32) -> StatsResponse {
        let total = self.total_queries.load(Ordering::Relaxed);
        let successful = self.successful_queries.load(Ordering::Relaxed);
        let cached = self.cached_queries.load(Ordering::Relaxed);

        let success_rate = if total > 0 {
            successful as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        let cache_hit_rate = if total > 0 {
            cached as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        StatsResponse {
            total_queries: total,
            successful_queries: successful,
            failed_queries: self.failed_queries.load(Ordering::Relaxed),
            throttled_queries: self.throttled_queries.load(Ordering::Relaxed),
            cached_queries: cached,
            success_rate,
            cache_hit_rate,
            avg_response_time: *self.avg_response_time.lock(),
            uptime_seconds: self.uptime_seconds(),
            ollama_available: self.ollama_available(),
            current_cpu_percent: cpu_percent,
            current_memory_percent: memory_percent,
        }
    }
}

impl Default for ServiceStats {
    fn default() -> Self {
        Self::new()
    }
}
