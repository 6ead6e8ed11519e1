//! Redis-based cache implementation.

use super::CacheInterface;
use async_trait::async_trait;
use deadpool_redis::{redis::AsyncCommands, Pool};
use murmur_config::RedisConfig;
use murmur_core::{MurmurError, MurmurResult};
use shaku::Component;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Creates a Redis connection pool from configuration.
///
/// No connection is opened here; the first cache call does that, so an
/// unreachable Redis shows up as cache errors, not as a startup failure.
pub fn create_pool(config: &RedisConfig) -> MurmurResult<Pool> {
    let mut cfg = deadpool_redis::Config::from_url(&config.url);
    let mut pool_cfg = deadpool_redis::PoolConfig::new(config.pool_size.max(1));
    pool_cfg.timeouts.wait = Some(config.connect_timeout());
    pool_cfg.timeouts.create = Some(config.connect_timeout());
    cfg.pool = Some(pool_cfg);

    cfg.create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .map_err(|e| MurmurError::Cache(format!("Failed to create Redis pool: {e}")))
}

/// Redis-based cache service.
#[derive(Component)]
#[shaku(interface = CacheInterface)]
pub struct RedisCacheService {
    /// Redis connection pool. `None` disables the cache.
    pool: Option<Arc<Pool>>,
}

impl RedisCacheService {
    /// Create a new Redis cache service.
    #[must_use]
    pub fn new(pool: Arc<Pool>) -> Self {
        Self { pool: Some(pool) }
    }

    /// Create a no-op cache service (for when Redis is disabled).
    #[must_use]
    pub fn disabled() -> Self {
        Self { pool: None }
    }

    /// Get a connection from the pool.
    async fn get_conn(&self) -> MurmurResult<deadpool_redis::Connection> {
        match &self.pool {
            Some(pool) => pool
                .get()
                .await
                .map_err(|e| MurmurError::Cache(format!("Failed to get Redis connection: {e}"))),
            None => Err(MurmurError::Cache("Cache is disabled".to_string())),
        }
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl CacheInterface for RedisCacheService {
    fn is_enabled(&self) -> bool {
        self.pool.is_some()
    }

    /// Unknown: DBSIZE counts the whole keyspace, and counting one prefix
    /// needs a SCAN.
    fn approximate_len(&self) -> Option<u64> {
        None
    }

    async fn get_raw(&self, key: &str) -> MurmurResult<Option<String>> {
        if !self.is_enabled() {
            return Ok(None);
        }

        let mut conn = self.get_conn().await?;
        let value: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| MurmurError::Cache(format!("Failed to get key '{key}': {e}")))?;

        Ok(value)
    }

    async fn get_many_raw(&self, keys: &[String]) -> MurmurResult<Vec<Option<String>>> {
        if !self.is_enabled() || keys.is_empty() {
            return Ok(vec![None; keys.len()]);
        }

        let mut conn = self.get_conn().await?;
        let values: Vec<Option<String>> = deadpool_redis::redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut conn)
            .await
            .map_err(|e| MurmurError::Cache(format!("Failed to get {} keys: {e}", keys.len())))?;

        if values.len() != keys.len() {
            return Err(MurmurError::Cache(format!(
                "MGET returned {} values for {} keys",
                values.len(),
                keys.len()
            )));
        }

        Ok(values)
    }

    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> MurmurResult<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        let mut conn = self.get_conn().await?;
        let ttl_secs = ttl_secs(ttl);

        conn.set_ex::<_, _, ()>(key, value, ttl_secs)
            .await
            .map_err(|e| MurmurError::Cache(format!("Failed to set key '{key}': {e}")))?;

        debug!(key = %key, ttl_secs, "Cached key");
        Ok(())
    }

    async fn set_many_raw(&self, entries: &[(String, String)], ttl: Duration) -> MurmurResult<()> {
        if !self.is_enabled() || entries.is_empty() {
            return Ok(());
        }

        let mut conn = self.get_conn().await?;
        let ttl_secs = ttl_secs(ttl);

        let mut pipe = deadpool_redis::redis::pipe();
        for (key, value) in entries {
            pipe.set_ex(key, value, ttl_secs).ignore();
        }

        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| MurmurError::Cache(format!("Failed to set {} keys: {e}", entries.len())))?;

        debug!(count = entries.len(), ttl_secs, "Cached keys");
        Ok(())
    }

    async fn delete(&self, key: &str) -> MurmurResult<bool> {
        if !self.is_enabled() {
            return Ok(false);
        }

        let mut conn = self.get_conn().await?;
        let deleted: i64 = conn
            .del(key)
            .await
            .map_err(|e| MurmurError::Cache(format!("Failed to delete key '{key}': {e}")))?;

        debug!(key = %key, deleted = deleted > 0, "Deleted key");
        Ok(deleted > 0)
    }

    async fn delete_many(&self, keys: &[String]) -> MurmurResult<u64> {
        if !self.is_enabled() || keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.get_conn().await?;
        let deleted: i64 = conn
            .del(keys)
            .await
            .map_err(|e| MurmurError::Cache(format!("Failed to delete {} keys: {e}", keys.len())))?;

        debug!(requested = keys.len(), deleted, "Deleted keys");
        Ok(u64::try_from(deleted).unwrap_or(0))
    }

    async fn exists(&self, key: &str) -> MurmurResult<bool> {
        if !self.is_enabled() {
            return Ok(false);
        }

        let mut conn = self.get_conn().await?;
        let exists: bool = conn
            .exists(key)
            .await
            .map_err(|e| MurmurError::Cache(format!("Failed to check key '{key}': {e}")))?;

        Ok(exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_cache() {
        let cache = RedisCacheService::disabled();
        assert!(!cache.is_enabled());
    }

    #[tokio::test]
    async fn test_disabled_cache_is_a_no_op() {
        let cache = RedisCacheService::disabled();
        assert!(cache.get_raw("k").await.unwrap().is_none());
        assert_eq!(cache.get_many_raw(&["a".into(), "b".into()]).await.unwrap(), vec![None, None]);
        cache.set_raw("k", "v", Duration::from_secs(1)).await.unwrap();
        assert_eq!(cache.delete_many(&["a".into()]).await.unwrap(), 0);
    }

    #[test]
    fn test_create_pool_rejects_bad_url() {
        let config = RedisConfig {
            url: "not a url".to_string(),
            ..RedisConfig::default()
        };
        assert!(create_pool(&config).is_err());
    }

    #[test]
    fn test_ttl_rounds_up_to_one_second() {
        assert_eq!(ttl_secs(Duration::from_millis(10)), 1);
        assert_eq!(ttl_secs(Duration::from_secs(90)), 90);
    }
}
