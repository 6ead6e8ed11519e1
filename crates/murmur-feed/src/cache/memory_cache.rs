//! Process-local cache implementation.

use super::CacheInterface;
use async_trait::async_trait;
use murmur_core::MurmurResult;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// TTL-respecting map behind a read/write lock.
///
/// Expired entries are invisible to readers and removed lazily on write, or
/// eagerly with [`InMemoryCache::purge_expired`].
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.read().values().filter(|e| e.is_live(now)).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        before - entries.len()
    }

    fn live_value(&self, key: &str, now: Instant) -> Option<String> {
        self.entries
            .read()
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone())
    }
}

#[async_trait]
impl CacheInterface for InMemoryCache {
    fn is_enabled(&self) -> bool {
        true
    }

    fn approximate_len(&self) -> Option<u64> {
        Some(self.len() as u64)
    }

    async fn get_raw(&self, key: &str) -> MurmurResult<Option<String>> {
        Ok(self.live_value(key, Instant::now()))
    }

    async fn get_many_raw(&self, keys: &[String]) -> MurmurResult<Vec<Option<String>>> {
        let now = Instant::now();
        let entries = self.entries.read();
        Ok(keys
            .iter()
            .map(|key| entries.get(key).filter(|e| e.is_live(now)).map(|e| e.value.clone()))
            .collect())
    }

    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> MurmurResult<()> {
        let expires_at = Instant::now() + ttl;
        self.entries.write().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn set_many_raw(&self, entries: &[(String, String)], ttl: Duration) -> MurmurResult<()> {
        let now = Instant::now();
        let expires_at = now + ttl;
        let mut map = self.entries.write();
        map.retain(|_, e| e.is_live(now));
        for (key, value) in entries {
            map.insert(
                key.clone(),
                Entry {
                    value: value.clone(),
                    expires_at,
                },
            );
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> MurmurResult<bool> {
        let now = Instant::now();
        Ok(self.entries.write().remove(key).is_some_and(|e| e.is_live(now)))
    }

    async fn delete_many(&self, keys: &[String]) -> MurmurResult<u64> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let deleted = keys
            .iter()
            .filter_map(|key| entries.remove(key))
            .filter(|e| e.is_live(now))
            .count();
        Ok(deleted as u64)
    }

    async fn exists(&self, key: &str) -> MurmurResult<bool> {
        Ok(self.live_value(key, Instant::now()).is_some())
    }
}
