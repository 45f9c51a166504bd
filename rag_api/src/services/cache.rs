//! TTL'd LRU cache for query responses.
//!
//! The key hashes the query text, top_k, and the three include flags;
//! retriever toggles are deliberately part of neither the key nor the value.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tracing::debug;

use helpdesk_models::api::{QueryRequest, QueryResponse};

struct CachedEntry {
    response: QueryResponse,
    stored_at: Instant,
}

pub struct ResultCache {
    entries: Mutex<LruCache<String, CachedEntry>>,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_entries.max(1)).unwrap();
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Cache key: md5 over the query, top_k, and include flags.
    pub fn key(request: &QueryRequest) -> String {
        let raw = format!(
            "{}_{}_{}_{}_{}",
            request.query,
            request.top_k,
            request.include_tickets,
            request.include_kb,
            request.include_ci
        );
        format!("{:x}", md5::compute(raw.as_bytes()))
    }

    pub fn get(&self, key: &str) -> Option<QueryResponse> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                debug!("Cache hit for key: {}", key);
                Some(entry.response.clone())
            }
            Some(_) => {
                debug!("Cache expired for key: {}", key);
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: String, response: QueryResponse) {
        let mut entries = self.entries.lock();
        entries.put(
            key,
            CachedEntry {
                response,
                stored_at: Instant::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(query: &str) -> QueryRequest {
        serde_json::from_str(&format!(r#"{{"query": "{}"}}"#, query)).unwrap()
    }

    fn response(answer: &str) -> QueryResponse {
        QueryResponse {
            success: true,
            ai_answer: answer.to_string(),
            confidence_score: 0.8,
            sources: Vec::new(),
            relationships: Vec::new(),
            uncertainties: Vec::new(),
            response_time: 0.1,
            timestamp: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_key_depends_on_query_and_flags() {
        let a = ResultCache::key(&request("laptop"));
        let b = ResultCache::key(&request("laptop"));
        let c = ResultCache::key(&request("printer"));
        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut with_ci = request("laptop");
        with_ci.include_ci = true;
        assert_ne!(a, ResultCache::key(&with_ci));

        // Retriever toggles are not part of the key.
        let mut no_graph = request("laptop");
        no_graph.use_graph = false;
        assert_eq!(a, ResultCache::key(&no_graph));
    }

    #[test]
    fn test_hit_returns_identical_response() {
        let cache = ResultCache::new(10, Duration::from_secs(60));
        cache.put("k".to_string(), response("antwoord"));

        let first = cache.get("k").unwrap();
        let second = cache.get("k").unwrap();
        assert_eq!(first.ai_answer, second.ai_answer);
        assert_eq!(first.ai_answer, "antwoord");
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let cache = ResultCache::new(10, Duration::from_millis(10));
        cache.put("k".to_string(), response("antwoord"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn test_lru_eviction_at_capacity() {
        let cache = ResultCache::new(2, Duration::from_secs(60));
        cache.put("a".to_string(), response("1"));
        cache.put("b".to_string(), response("2"));
        cache.put("c".to_string(), response("3"));

        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }
}
