//! Dependency injection module using Shaku.
//!
//! Only the Redis cache backend goes through a Shaku module; the in-memory
//! and disabled backends are plain values chosen by [`resolve_cache_backend`].

use deadpool_redis::Pool;
use murmur_config::{AppConfig, CacheBackend};
use murmur_feed::cache::RedisCacheServiceParameters;
use murmur_feed::{create_pool, CacheInterface, InMemoryCache, RedisCacheService};
use shaku::{module, HasComponent};
use std::sync::Arc;
use tracing::{info, warn};

// Cache module holding the Redis-backed feed cache backend.
module! {
    pub CacheModule {
        components = [
            RedisCacheService,
        ],
        providers = [],
    }
}

/// Builds a cache module around an optional Redis pool. `None` yields a
/// disabled backend.
pub fn build_cache_module(pool: Option<Arc<Pool>>) -> Arc<CacheModule> {
    let module = CacheModule::builder()
        .with_component_parameters::<RedisCacheService>(RedisCacheServiceParameters { pool })
        .build();

    Arc::new(module)
}

/// Picks the feed cache backend for `config`.
///
/// A Redis pool that cannot be created degrades to a disabled backend: feeds
/// keep working from the source of truth, only slower.
pub fn resolve_cache_backend(config: &AppConfig) -> Arc<dyn CacheInterface> {
    if !config.cache.enabled {
        info!("Feed cache disabled by configuration");
        return Arc::new(RedisCacheService::disabled());
    }

    match config.cache.backend {
        CacheBackend::Disabled => {
            info!("Feed cache backend set to disabled");
            Arc::new(RedisCacheService::disabled())
        }
        CacheBackend::Memory => {
            info!("Using in-process feed cache");
            Arc::new(InMemoryCache::new())
        }
        CacheBackend::Redis => {
            let pool = match create_pool(&config.redis) {
                Ok(pool) => Some(Arc::new(pool)),
                Err(e) => {
                    warn!(error = %e, "Redis unavailable, running with the feed cache disabled");
                    None
                }
            };

            let module = build_cache_module(pool);
            let backend: Arc<dyn CacheInterface> = module.resolve();
            if backend.is_enabled() {
                info!(pool_size = config.redis.pool_size, "Using Redis feed cache");
            }
            backend
        }
    }
}
