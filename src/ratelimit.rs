//! Per-client sliding-window rate limiting.
//!
//! Buckets are keyed by client identity + HTTP method so that POST (which
//! starts work) and GET (which only polls) carry independent budgets. Stale
//! hits age out lazily on each check; there is no background maintenance.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::http::Method;

#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    get_max: usize,
    post_max: usize,
    buckets: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(window: Duration, get_max: usize, post_max: usize) -> Self {
        Self {
            window,
            get_max,
            post_max,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Records a hit for this client+method, or rejects if the trailing
    /// window is already at budget.
    pub fn check(&self, client: &str, method: &Method) -> bool {
        self.check_at(client, method, Instant::now())
    }

    /// `check` with an explicit clock, so tests drive the window directly.
    pub fn check_at(&self, client: &str, method: &Method, now: Instant) -> bool {
        let budget = if method == Method::POST {
            self.post_max
        } else {
            self.get_max
        };
        let key = format!("{client}:{method}");
        let mut buckets = self.buckets.lock().unwrap();
        let bucket = buckets.entry(key).or_default();
        while bucket
            .front()
            .is_some_and(|&hit| now.duration_since(hit) > self.window)
        {
            bucket.pop_front();
        }
        if bucket.len() >= budget {
            return false;
        }
        bucket.push_back(now);
        true
    }
}
