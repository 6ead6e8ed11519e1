//! Cached feed indices and post snapshots.
//!
//! A feed entry is the ordered list of post IDs on a feed's first page plus
//! the feed's total size. Posts are cached separately, keyed by ID, so one
//! post update touches one key instead of every feed containing it. The two
//! can drift apart; readers must check [`CachedPosts::missing`].
//!
//! Reads never fail: backend errors are logged and reported as misses.
//! Writes and invalidations return errors to synchronous callers.

use crate::cache::{CacheExt, CacheInterface, CacheKeys, RedisCacheService};
use crate::gate::{InvalidationGate, WriteTicket};
use crate::metrics::CacheMetrics;
use chrono::{DateTime, Utc};
use murmur_config::CacheConfig;
use murmur_core::{EngagementCounter, FeedKind, MurmurResult, Post, PostId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Cached first page of a feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedFeed {
    /// Post IDs in feed order.
    pub post_ids: Vec<PostId>,
    /// Size of the whole feed when the entry was written.
    pub total: u64,
    pub cached_at: DateTime<Utc>,
}

impl CachedFeed {
    #[must_use]
    pub fn new(post_ids: Vec<PostId>, total: u64) -> Self {
        Self {
            post_ids,
            total,
            cached_at: Utc::now(),
        }
    }
}

/// Result of a batched post lookup.
#[derive(Debug, Clone, Default)]
pub struct CachedPosts {
    /// Posts found in cache.
    pub found: HashMap<PostId, Post>,
    /// Requested IDs not found, in request order.
    pub missing: Vec<PostId>,
}

impl CachedPosts {
    /// True when every requested ID was found.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// Posts in the order of `ids`, or `None` if any of them is missing.
    #[must_use]
    pub fn into_ordered(self, ids: &[PostId]) -> Option<Vec<Post>> {
        if !self.is_complete() {
            return None;
        }
        ids.iter().map(|id| self.found.get(id).cloned()).collect()
    }
}

/// Snapshot of the cache counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedCacheStats {
    pub enabled: bool,
    pub feed_hits: u64,
    pub feed_misses: u64,
    /// Entry hits abandoned because posts were missing.
    pub partial_hits: u64,
    pub post_hits: u64,
    pub post_misses: u64,
    pub writes: u64,
    /// Writes discarded because an invalidation overtook them.
    pub stale_writes: u64,
    pub invalidations: u64,
    pub errors: u64,
    /// Live entries in the backend, posts and feed entries together. `None`
    /// when the backend cannot count them cheaply.
    pub entries: Option<u64>,
}

impl FeedCacheStats {
    /// Fraction of feed lookups served from cache.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.feed_hits + self.feed_misses;
        if lookups == 0 {
            0.0
        } else {
            self.feed_hits as f64 / lookups as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    feed_hits: AtomicU64,
    feed_misses: AtomicU64,
    partial_hits: AtomicU64,
    post_hits: AtomicU64,
    post_misses: AtomicU64,
    writes: AtomicU64,
    stale_writes: AtomicU64,
    invalidations: AtomicU64,
    errors: AtomicU64,
}

fn bump(counter: &AtomicU64, by: usize) {
    counter.fetch_add(by as u64, Ordering::Relaxed);
}

/// Feed cache over a [`CacheInterface`] backend.
pub struct FeedCacheService {
    backend: Arc<dyn CacheInterface>,
    keys: CacheKeys,
    config: CacheConfig,
    gate: InvalidationGate,
    counters: Counters,
}

impl FeedCacheService {
    pub fn new(backend: Arc<dyn CacheInterface>, keys: CacheKeys, config: CacheConfig) -> Self {
        Self {
            backend,
            keys,
            config,
            gate: InvalidationGate::default(),
            counters: Counters::default(),
        }
    }

    /// A service on which every read misses and every write is a no-op.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(
            Arc::new(RedisCacheService::disabled()),
            CacheKeys::default(),
            CacheConfig {
                enabled: false,
                ..CacheConfig::default()
            },
        )
    }

    /// Whether the cache is switched on and backed by a live backend.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled && self.backend.is_enabled()
    }

    pub fn keys(&self) -> &CacheKeys {
        &self.keys
    }

    /// Ticket to take before reading the source of truth for a later
    /// [`FeedCacheService::populate`].
    pub fn write_ticket(&self) -> WriteTicket {
        self.gate.ticket()
    }

    fn feed_ttl(&self, kind: &FeedKind) -> Duration {
        match kind {
            FeedKind::Explore => self.config.explore_ttl(),
            FeedKind::Hashtag(_) => self.config.hashtag_ttl(),
            _ => self.config.feed_ttl(),
        }
    }

    fn record_error(&self, operation: &'static str) {
        bump(&self.counters.errors, 1);
        CacheMetrics::error(operation);
    }

    // ============ Reads ============

    /// Cached entry of a feed, or `None` on miss, error, or for uncached kinds.
    pub async fn get_cached_feed(&self, kind: &FeedKind) -> Option<CachedFeed> {
        if !self.is_enabled() {
            return None;
        }
        let key = self.keys.feed(kind)?;

        match self.backend.get::<CachedFeed>(&key).await {
            Ok(Some(entry)) => {
                debug!(feed = %kind, ids = entry.post_ids.len(), "Feed cache hit");
                bump(&self.counters.feed_hits, 1);
                CacheMetrics::hit(kind.label());
                Some(entry)
            }
            Ok(None) => {
                debug!(feed = %kind, "Feed cache miss");
                bump(&self.counters.feed_misses, 1);
                CacheMetrics::miss(kind.label());
                None
            }
            Err(e) => {
                warn!(feed = %kind, error = %e, "Feed cache read failed, treating as miss");
                self.record_error("get_feed");
                bump(&self.counters.feed_misses, 1);
                CacheMetrics::miss(kind.label());
                None
            }
        }
    }

    pub async fn get_cached_home_feed(&self, user: UserId) -> Option<CachedFeed> {
        self.get_cached_feed(&FeedKind::Home(user)).await
    }

    pub async fn get_cached_explore_feed(&self) -> Option<CachedFeed> {
        self.get_cached_feed(&FeedKind::Explore).await
    }

    pub async fn get_cached_hashtag_feed(&self, tag: &str) -> Option<CachedFeed> {
        self.get_cached_feed(&FeedKind::hashtag(tag)).await
    }

    /// Looks up post snapshots in one round trip.
    ///
    /// On backend error every ID is reported missing. An entry that no longer
    /// deserializes counts as missing too.
    pub async fn get_cached_posts(&self, ids: &[PostId]) -> CachedPosts {
        if ids.is_empty() {
            return CachedPosts::default();
        }
        if !self.is_enabled() {
            return CachedPosts {
                found: HashMap::new(),
                missing: ids.to_vec(),
            };
        }

        let keys: Vec<String> = ids.iter().map(|id| self.keys.post(*id)).collect();
        let values = match self.backend.get_many_raw(&keys).await {
            Ok(values) => values,
            Err(e) => {
                warn!(count = ids.len(), error = %e, "Post cache read failed, treating as miss");
                self.record_error("get_posts");
                vec![None; ids.len()]
            }
        };

        let mut result = CachedPosts::default();
        for (id, value) in ids.iter().zip(values) {
            match value.map(|json| serde_json::from_str::<Post>(&json)) {
                Some(Ok(post)) => {
                    result.found.insert(*id, post);
                }
                Some(Err(e)) => {
                    warn!(post_id = %id, error = %e, "Discarding undecodable cached post");
                    self.record_error("decode_post");
                    result.missing.push(*id);
                }
                None => result.missing.push(*id),
            }
        }

        bump(&self.counters.post_hits, result.found.len());
        bump(&self.counters.post_misses, result.missing.len());
        CacheMetrics::post_lookup(result.found.len(), result.missing.len());
        result
    }

    pub(crate) fn record_partial_hit(&self, kind: &FeedKind) {
        bump(&self.counters.partial_hits, 1);
        CacheMetrics::partial_hit(kind.label());
    }

    // ============ Writes ============

    /// Writes post snapshots not invalidated since `ticket`. Returns how many
    /// were written.
    async fn write_posts(&self, ticket: WriteTicket, posts: &[Post]) -> MurmurResult<usize> {
        if posts.is_empty() {
            return Ok(0);
        }

        let keys: Vec<String> = posts.iter().map(|post| self.keys.post(post.id)).collect();
        let permit = self.gate.admit(ticket, &keys).await;

        let mut entries = Vec::with_capacity(posts.len());
        for (index, (key, post)) in keys.into_iter().zip(posts).enumerate() {
            if permit.is_admitted(index) {
                entries.push((key, serde_json::to_string(post)?));
            }
        }

        let discarded = posts.len() - entries.len();
        if discarded > 0 {
            debug!(discarded, "Skipping post snapshots invalidated during population");
            bump(&self.counters.stale_writes, discarded);
            CacheMetrics::stale_write("post", discarded);
        }

        if let Err(e) = self.backend.set_many_raw(&entries, self.config.post_ttl()).await {
            self.record_error("set_posts");
            return Err(e);
        }

        bump(&self.counters.writes, entries.len());
        CacheMetrics::write("post", entries.len());
        Ok(entries.len())
    }

    /// Writes a feed entry unless its key was invalidated since `ticket`.
    async fn write_feed(&self, ticket: WriteTicket, kind: &FeedKind, entry: &CachedFeed) -> MurmurResult<bool> {
        let Some(key) = self.keys.feed(kind) else {
            return Ok(false);
        };

        let keys = [key];
        let permit = self.gate.admit(ticket, &keys).await;
        if !permit.is_admitted(0) {
            debug!(feed = %kind, "Skipping feed entry invalidated during population");
            bump(&self.counters.stale_writes, 1);
            CacheMetrics::stale_write("feed", 1);
            return Ok(false);
        }

        if let Err(e) = self.backend.set(&keys[0], entry, self.feed_ttl(kind)).await {
            self.record_error("set_feed");
            return Err(e);
        }

        bump(&self.counters.writes, 1);
        CacheMetrics::write("feed", 1);
        debug!(feed = %kind, ids = entry.post_ids.len(), total = entry.total, "Cached feed entry");
        Ok(true)
    }

    /// Upserts one post snapshot.
    pub async fn cache_post(&self, post: &Post) -> MurmurResult<()> {
        self.cache_posts(std::slice::from_ref(post)).await
    }

    /// Upserts several post snapshots in one round trip.
    pub async fn cache_posts(&self, posts: &[Post]) -> MurmurResult<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.write_posts(self.gate.ticket(), posts).await.map(|_| ())
    }

    pub async fn cache_explore_feed(&self, post_ids: &[PostId], total: u64) -> MurmurResult<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        let entry = CachedFeed::new(post_ids.to_vec(), total);
        self.write_feed(self.gate.ticket(), &FeedKind::Explore, &entry)
            .await
            .map(|_| ())
    }

    pub async fn cache_hashtag_feed(&self, tag: &str, post_ids: &[PostId], total: u64) -> MurmurResult<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        let entry = CachedFeed::new(post_ids.to_vec(), total);
        self.write_feed(self.gate.ticket(), &FeedKind::hashtag(tag), &entry)
            .await
            .map(|_| ())
    }

    /// Caches a user's home feed from cold: the posts, then the entry.
    pub async fn warm_user_feed(&self, user: UserId, posts: &[Post], total: u64) -> MurmurResult<()> {
        let ticket = self.gate.ticket();
        self.populate(ticket, &FeedKind::Home(user), posts, total).await.map(|_| ())
    }

    /// Caches `posts` and the feed entry listing them in order, skipping any
    /// key invalidated after `ticket` was taken.
    ///
    /// Returns `true` when the feed entry was written.
    pub async fn populate(
        &self,
        ticket: WriteTicket,
        kind: &FeedKind,
        posts: &[Post],
        total: u64,
    ) -> MurmurResult<bool> {
        if !self.is_enabled() || !kind.is_cacheable() {
            return Ok(false);
        }

        self.write_posts(ticket, posts).await?;

        let entry = CachedFeed::new(posts.iter().map(|post| post.id).collect(), total);
        self.write_feed(ticket, kind, &entry).await
    }

    /// Adjusts one counter on a cached post in place.
    ///
    /// Returns `false` when the post is not cached, leaving the next read to
    /// load a fresh snapshot. Concurrent adjustments of the same post can lose
    /// an update; counters are display values and the snapshot expires.
    pub async fn update_post_engagement(
        &self,
        post_id: PostId,
        counter: EngagementCounter,
        delta: i64,
    ) -> MurmurResult<bool> {
        if !self.is_enabled() || delta == 0 {
            return Ok(false);
        }

        let ticket = self.gate.ticket();
        let key = self.keys.post(post_id);

        let mut post = match self.backend.get::<Post>(&key).await {
            Ok(Some(post)) => post,
            Ok(None) => return Ok(false),
            Err(e) => {
                self.record_error("get_post");
                return Err(e);
            }
        };
        post.apply_engagement(counter, delta);

        let keys = [key];
        let permit = self.gate.admit(ticket, &keys).await;
        if !permit.is_admitted(0) {
            bump(&self.counters.stale_writes, 1);
            CacheMetrics::stale_write("post", 1);
            return Ok(false);
        }

        if let Err(e) = self.backend.set(&keys[0], &post, self.config.post_ttl()).await {
            self.record_error("set_post");
            return Err(e);
        }

        bump(&self.counters.writes, 1);
        debug!(post_id = %post_id, counter = %counter, delta, "Patched cached post engagement");
        Ok(true)
    }

    // ============ Invalidation ============

    /// Deletes `keys` in chunks of `invalidation_batch_size`.
    async fn delete_keys(&self, keys: &[String], entry: &'static str) -> MurmurResult<u64> {
        let batch_size = self.config.invalidation_batch_size.max(1);
        let mut deleted = 0;

        for chunk in keys.chunks(batch_size) {
            self.gate.invalidate(chunk).await;
            match self.backend.delete_many(chunk).await {
                Ok(count) => deleted += count,
                Err(e) => {
                    self.record_error("delete");
                    return Err(e);
                }
            }
            bump(&self.counters.invalidations, chunk.len());
            CacheMetrics::invalidated(entry, chunk.len());
        }

        Ok(deleted)
    }

    /// Drops a user's home feed entry. Cached posts stay.
    pub async fn invalidate_home_feed(&self, user: UserId) -> MurmurResult<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.delete_keys(&[self.keys.home_feed(user)], "home_feed").await?;
        debug!(user_id = %user, "Invalidated home feed");
        Ok(())
    }

    /// Drops the home feed entries of many users, batched.
    ///
    /// Returns the number of entries that existed.
    pub async fn invalidate_follower_feeds(&self, followers: &[UserId]) -> MurmurResult<u64> {
        if !self.is_enabled() || followers.is_empty() {
            return Ok(0);
        }

        let keys: Vec<String> = followers.iter().map(|user| self.keys.home_feed(*user)).collect();
        let deleted = self.delete_keys(&keys, "home_feed").await?;

        info!(followers = followers.len(), deleted, "Invalidated follower home feeds");
        Ok(deleted)
    }

    /// Drops one cached post. Feed entries listing it are left for readers
    /// to detect through the missing-ID check.
    pub async fn invalidate_post(&self, post_id: PostId) -> MurmurResult<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.delete_keys(&[self.keys.post(post_id)], "post").await?;
        debug!(post_id = %post_id, "Invalidated cached post");
        Ok(())
    }

    pub async fn invalidate_explore_feed(&self) -> MurmurResult<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.delete_keys(&[self.keys.explore_feed()], "explore_feed").await?;
        Ok(())
    }

    pub async fn invalidate_hashtag_feed(&self, tag: &str) -> MurmurResult<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.delete_keys(&[self.keys.hashtag_feed(tag)], "hashtag_feed").await?;
        Ok(())
    }

    // ============ Stats ============

    pub fn get_cache_stats(&self) -> FeedCacheStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        FeedCacheStats {
            enabled: self.is_enabled(),
            feed_hits: load(&self.counters.feed_hits),
            feed_misses: load(&self.counters.feed_misses),
            partial_hits: load(&self.counters.partial_hits),
            post_hits: load(&self.counters.post_hits),
            post_misses: load(&self.counters.post_misses),
            writes: load(&self.counters.writes),
            stale_writes: load(&self.counters.stale_writes),
            invalidations: load(&self.counters.invalidations),
            errors: load(&self.counters.errors),
            entries: if self.is_enabled() {
                self.backend.approximate_len()
            } else {
                None
            },
        }
    }
}
