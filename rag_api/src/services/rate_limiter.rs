//! Per-client sliding-window rate limiter.
//!
//! Each client keeps the timestamps of its requests inside the window; a
//! request is admitted when fewer than the allowed maximum remain after
//! pruning. Admission hands out a slot guard: committing it keeps the slot
//! consumed, dropping it uncommitted (client disconnected mid-request) frees
//! the slot again.

use dashmap::DashMap;
use std::time::{Duration, Instant};

pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    clients: DashMap<String, Vec<Instant>>,
}

/// An admitted request's slot in the window. Dropped without [`commit`]
/// (request cancelled), the slot is returned to the client's budget.
///
/// [`commit`]: RateLimitSlot::commit
pub struct RateLimitSlot<'a> {
    limiter: &'a RateLimiter,
    client: String,
    stamp: Instant,
    committed: bool,
}

impl RateLimitSlot<'_> {
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for RateLimitSlot<'_> {
    fn drop(&mut self) {
        if !self.committed {
            if let Some(mut timestamps) = self.limiter.clients.get_mut(&self.client) {
                if let Some(position) = timestamps.iter().position(|ts| *ts == self.stamp) {
                    timestamps.remove(position);
                }
            }
        }
    }
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: DashMap::new(),
        }
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window_secs(&self) -> u64 {
        self.window.as_secs()
    }

    /// Admit a request from `client`, consuming a slot in the window, or
    /// return `None` when the client is over its limit.
    pub fn try_acquire(&self, client: &str) -> Option<RateLimitSlot<'_>> {
        let now = Instant::now();
        let mut timestamps = self.clients.entry(client.to_string()).or_default();

        timestamps.retain(|ts| now.duration_since(*ts) < self.window);

        if timestamps.len() >= self.max_requests {
            return None;
        }

        timestamps.push(now);
        drop(timestamps);

        Some(RateLimitSlot {
            limiter: self,
            client: client.to_string(),
            stamp: now,
            committed: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admits_up_to_limit() {
        let limiter = RateLimiter::new(10, Duration::from_secs(60));

        for _ in 0..10 {
            limiter.try_acquire("10.0.0.1").unwrap().commit();
        }
        // The eleventh request in the window is rejected.
        assert!(limiter.try_acquire("10.0.0.1").is_none());
    }

    #[test]
    fn test_clients_are_independent() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));

        limiter.try_acquire("10.0.0.1").unwrap().commit();
        limiter.try_acquire("10.0.0.1").unwrap().commit();
        assert!(limiter.try_acquire("10.0.0.1").is_none());

        assert!(limiter.try_acquire("10.0.0.2").is_some());
    }

    #[test]
    fn test_window_expiry_frees_slots() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));

        limiter.try_acquire("10.0.0.1").unwrap().commit();
        assert!(limiter.try_acquire("10.0.0.1").is_none());

        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.try_acquire("10.0.0.1").is_some());
    }

    #[test]
    fn test_uncommitted_slot_is_released_on_drop() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));

        {
            let _slot = limiter.try_acquire("10.0.0.1").unwrap();
            // Cancelled before completion: the guard drops uncommitted.
        }
        assert!(limiter.try_acquire("10.0.0.1").is_some());
    }
}
