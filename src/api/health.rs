//! Shared health counters for the /health endpoint.
//! Updated by the fetcher, the provider cache path and the refresh scheduler.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Shared health metrics. Updated by engine components, read by API.
#[derive(Default)]
pub struct HealthState {
    /// Outbound upstream calls started (retries included).
    pub upstream_calls: AtomicU64,
    /// 429 responses that were retried.
    pub upstream_retries: AtomicU64,
    /// Requests that exhausted the retry budget on 429.
    pub rate_limit_exhausted: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    /// Refresh cycles that ended with an error reported on the match status.
    pub refresh_failures: AtomicU64,
    /// Millisecond timestamp of the last outbound call start (0 = none).
    pub last_upstream_call_at_ms: AtomicU64,
}

#[derive(Debug, Serialize)]
pub struct HealthSnapshot {
    pub upstream_calls: u64,
    pub upstream_retries: u64,
    pub rate_limit_exhausted: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub refresh_failures: u64,
    pub last_upstream_call_at_ms: u64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_upstream_call(&self, at_ms: u64) {
        self.upstream_calls.fetch_add(1, Ordering::Relaxed);
        self.last_upstream_call_at_ms.store(at_ms, Ordering::Relaxed);
    }

    pub fn inc_upstream_retries(&self) {
        self.upstream_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rate_limit_exhausted(&self) {
        self.rate_limit_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_misses(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_refresh_failures(&self) {
        self.refresh_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[cfg(test)]
    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            upstream_calls: self.upstream_calls.load(Ordering::Relaxed),
            upstream_retries: self.upstream_retries.load(Ordering::Relaxed),
            rate_limit_exhausted: self.rate_limit_exhausted.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
            last_upstream_call_at_ms: self.last_upstream_call_at_ms.load(Ordering::Relaxed),
        }
    }
}
