use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Builds a cache key from a namespace and the inputs that determine the value.
///
/// The namespace is hashed together with the parts, so keys built for
/// different operations never collide.
pub fn cache_key(namespace: &str, parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    for part in parts {
        hasher.update([0x1f]);
        hasher.update(part.as_bytes());
    }
    format!("{namespace}:{}", hex::encode(hasher.finalize()))
}

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    pub written_at: Instant,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.written_at) >= self.ttl
    }
}

/// A key/value cache whose entries expire after a fixed time-to-live.
///
/// Expiry is lazy: a read that finds an expired entry removes it and reports
/// a miss. `purge_expired` can be called to drop stale entries eagerly.
#[derive(Debug)]
pub struct TtlCache<V> {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().await;
        if entries.get(key)?.is_expired(Instant::now()) {
            entries.remove(key);
            return None;
        }
        entries.get(key).map(|entry| entry.value.clone())
    }

    /// Stores `value`, replacing any previous entry for `key`.
    pub async fn insert(&self, key: String, value: V) {
        self.insert_with_ttl(key, value, self.ttl).await;
    }

    /// Like [`insert`](Self::insert), but the entry expires after `ttl`
    /// instead of the cache default.
    pub async fn insert_with_ttl(&self, key: String, value: V, ttl: Duration) {
        let entry = CacheEntry {
            key: key.clone(),
            value,
            written_at: Instant::now(),
            ttl,
        };
        self.entries.lock().await.insert(key, entry);
    }

    /// Removes every expired entry and returns how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
