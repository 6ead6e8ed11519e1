//! Cache backends behind the feed cache.
//!
//! [`CacheInterface`] stores JSON strings with a TTL. The Redis implementation
//! is the production backend; [`InMemoryCache`] serves single-node setups and
//! tests.

mod cache_interface;
pub mod cache_keys;
mod memory_cache;
mod redis_cache;

pub use cache_interface::{CacheExt, CacheInterface};
#[cfg(test)]
pub use cache_interface::MockCacheInterface;
pub use cache_keys::CacheKeys;
pub use memory_cache::InMemoryCache;
pub use redis_cache::{create_pool, RedisCacheService, RedisCacheServiceParameters};
