// In-memory search result cache with a fixed TTL
// Repeated identical queries within the TTL skip both retrieval arms and
// the query embedding entirely.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use super::HybridSearchResults;

pub struct SearchCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, HybridSearchResults)>>,
}

impl SearchCache {
    #[inline]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch a cached result, evicting it first if it has expired.
    #[inline]
    pub fn get(&self, key: &str) -> Option<HybridSearchResults> {
        let mut entries = self.entries.lock().ok()?;

        if let Some((inserted, _)) = entries.get(key) {
            if inserted.elapsed() > self.ttl {
                entries.remove(key);
                return None;
            }
        }

        entries.get(key).map(|(_, results)| {
            debug!("Search cache hit");
            results.clone()
        })
    }

    /// Insert a result, sweeping out every expired entry first so the map
    /// never grows without bound across distinct queries.
    #[inline]
    pub fn put(&self, key: String, results: HybridSearchResults) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|_, (inserted, _)| inserted.elapsed() <= self.ttl);
            entries.insert(key, (Instant::now(), results));
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }
}
