//! # Murmur Feed
//!
//! Feed cache and cache-aware feed reads.
//!
//! - [`FeedCacheService`]: cached feed entries (ordered post IDs plus total)
//!   and post snapshots over a [`CacheInterface`] backend, with batched
//!   invalidation and in-place engagement updates.
//! - [`FeedService`]: serves first pages from the cache when every listed
//!   post is cached, otherwise reads the repository and populates the cache
//!   in the background through a [`CachePopulator`].
//! - [`FeedInvalidator`]: hooks for post, follow and engagement mutations.
//!
//! A background write never undoes an invalidation that started after the
//! writer read the source of truth; see [`gate`].

pub mod cache;
pub mod feed_cache;
pub mod feed_service;
pub mod gate;
pub mod invalidation;
pub mod metrics;
pub mod populator;

pub use cache::{create_pool, CacheExt, CacheInterface, CacheKeys, InMemoryCache, RedisCacheService};
pub use feed_cache::{CachedFeed, CachedPosts, FeedCacheService, FeedCacheStats};
pub use feed_service::FeedService;
pub use gate::WriteTicket;
pub use invalidation::FeedInvalidator;
pub use metrics::register_metrics;
pub use populator::{CachePopulator, PopulatorStats};
