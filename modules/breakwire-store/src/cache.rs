//! Read-side response cache with coarse wildcard-prefix invalidation.
//! Settlement invalidates `stories:*` and `leaderboards:*` rather than
//! enumerating keys. Entries are small JSON payloads with a short TTL,
//! swapped atomically so readers never block writers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use tracing::debug;

#[derive(Clone)]
struct Entry {
    value: serde_json::Value,
    expires_at: DateTime<Utc>,
}

pub struct ReadCache {
    inner: ArcSwap<HashMap<String, Entry>>,
    ttl: Duration,
}

impl ReadCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: ArcSwap::new(Arc::new(HashMap::new())),
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let map = self.inner.load();
        let entry = map.get(key)?;
        if entry.expires_at <= Utc::now() {
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn put(&self, key: &str, value: serde_json::Value) {
        let expires_at = Utc::now()
            + chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::seconds(60));
        let mut map: HashMap<String, Entry> = (**self.inner.load()).clone();
        map.insert(key.to_string(), Entry { value, expires_at });
        self.inner.store(Arc::new(map));
    }

    /// Drop every entry whose key starts with `prefix`. A trailing `*` on
    /// the prefix is accepted and ignored, so callers can pass the wire
    /// form `stories:*` directly.
    pub fn invalidate_prefix(&self, prefix: &str) {
        let prefix = prefix.trim_end_matches('*');
        let before = self.inner.load().len();
        let map: HashMap<String, Entry> = self
            .inner
            .load()
            .iter()
            .filter(|(k, _)| !k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let dropped = before - map.len();
        if dropped > 0 {
            debug!(prefix, dropped, "Cache invalidation");
        }
        self.inner.store(Arc::new(map));
    }
}
