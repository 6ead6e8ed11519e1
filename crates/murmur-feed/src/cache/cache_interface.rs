//! Cache interface trait for abstracted caching operations.

use async_trait::async_trait;
use murmur_core::MurmurResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shaku::Interface;
use std::time::Duration;

/// Key-value cache with per-key TTL and batched operations.
///
/// Values are JSON strings so the trait stays dyn-compatible; [`CacheExt`]
/// adds the typed helpers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheInterface: Interface + Send + Sync {
    /// Get a raw JSON value from the cache.
    ///
    /// Returns `None` if the key doesn't exist or has expired.
    async fn get_raw(&self, key: &str) -> MurmurResult<Option<String>>;

    /// Get several raw values in one round trip, positionally aligned with `keys`.
    async fn get_many_raw(&self, keys: &[String]) -> MurmurResult<Vec<Option<String>>>;

    /// Set a raw JSON value in the cache with a TTL.
    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> MurmurResult<()>;

    /// Set several raw values sharing one TTL in one round trip.
    async fn set_many_raw(&self, entries: &[(String, String)], ttl: Duration) -> MurmurResult<()>;

    /// Delete a value from the cache.
    ///
    /// Returns `true` if the key existed and was deleted.
    async fn delete(&self, key: &str) -> MurmurResult<bool>;

    /// Delete several keys in one round trip. Returns the number removed.
    async fn delete_many(&self, keys: &[String]) -> MurmurResult<u64>;

    /// Check if a key exists in the cache.
    async fn exists(&self, key: &str) -> MurmurResult<bool>;

    /// Check if caching is enabled.
    fn is_enabled(&self) -> bool;

    /// Number of live entries, when the backend can count them cheaply.
    fn approximate_len(&self) -> Option<u64>;
}

/// Typed helpers over [`CacheInterface`].
#[async_trait]
pub trait CacheExt: CacheInterface {
    /// Get a typed value from the cache.
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> MurmurResult<Option<T>> {
        match self.get_raw(key).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Set a typed value in the cache.
    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> MurmurResult<()> {
        let json = serde_json::to_string(value)?;
        self.set_raw(key, &json, ttl).await
    }
}

impl<T: CacheInterface + ?Sized> CacheExt for T {}
