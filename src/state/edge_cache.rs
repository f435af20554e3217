use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::clock::Clock;

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: Vec<u8>,
    expires_at: Instant,
}

/// Short-TTL response cache keyed by the canonical outbound request.
///
/// An entry is never served once `now > expires_at`. Writers for the same key
/// simply overwrite each other.
pub struct EdgeCache {
    entries: DashMap<String, CacheEntry>,
    clock: Arc<dyn Clock>,
}

impl EdgeCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = self.clock.now();
        let hit = {
            let entry = self.entries.get(key)?;
            if now > entry.expires_at {
                None
            } else {
                Some(entry.payload.clone())
            }
        };
        if hit.is_none() {
            // Expired: drop it, unless a fresh write landed in between.
            self.entries.remove_if(key, |_, e| now > e.expires_at);
        }
        hit
    }

    pub fn put(&self, key: &str, payload: Vec<u8>, ttl: Duration) {
        let expires_at = self.clock.now() + ttl;
        self.entries
            .insert(key.to_string(), CacheEntry { payload, expires_at });
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, e| now <= e.expires_at);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Canonical cache key for an outbound GET.
///
/// Scheme and host are normalised by the URL parser and query parameters are
/// sorted, so `?a=1&b=2` and `?b=2&a=1` share a slot. Unparseable input is
/// used verbatim.
pub fn cache_key(target: &str) -> String {
    let Ok(mut url) = url::Url::parse(target.trim()) else {
        return target.to_string();
    };
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.set_fragment(None);
    if pairs.is_empty() {
        url.set_query(None);
        return url.to_string();
    }
    pairs.sort();
    url.query_pairs_mut().clear().extend_pairs(pairs);
    url.to_string()
}
