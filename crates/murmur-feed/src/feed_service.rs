//! Cache-aware feed reads.

use crate::feed_cache::{CachedFeed, FeedCacheService};
use crate::populator::CachePopulator;
use murmur_core::{FeedKind, FeedPage, FeedQuery, MurmurResult, PostRepository, UserId};
use std::sync::Arc;
use tracing::debug;

/// Serves feed pages, answering cacheable first pages from the feed cache.
///
/// A cached page is served only when every post it lists is cached as well;
/// otherwise the whole read goes to the repository. Successful first-page
/// reads are handed to the [`CachePopulator`] and never wait on the cache
/// write.
pub struct FeedService {
    posts: Arc<dyn PostRepository>,
    cache: Arc<FeedCacheService>,
    populator: Arc<CachePopulator>,
}

impl FeedService {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        cache: Arc<FeedCacheService>,
        populator: Arc<CachePopulator>,
    ) -> Self {
        Self {
            posts,
            cache,
            populator,
        }
    }

    pub async fn home_feed(&self, user: UserId, query: FeedQuery) -> MurmurResult<FeedPage> {
        self.get_feed(FeedKind::Home(user), query).await
    }

    pub async fn following_feed(&self, user: UserId, query: FeedQuery) -> MurmurResult<FeedPage> {
        self.get_feed(FeedKind::Following(user), query).await
    }

    pub async fn explore_feed(&self, query: FeedQuery) -> MurmurResult<FeedPage> {
        self.get_feed(FeedKind::Explore, query).await
    }

    pub async fn hashtag_feed(&self, tag: &str, query: FeedQuery) -> MurmurResult<FeedPage> {
        self.get_feed(FeedKind::hashtag(tag), query).await
    }

    pub async fn saved_feed(&self, user: UserId, query: FeedQuery) -> MurmurResult<FeedPage> {
        self.get_feed(FeedKind::Saved(user), query).await
    }

    pub async fn search(&self, term: &str, query: FeedQuery) -> MurmurResult<FeedPage> {
        self.get_feed(FeedKind::Search(term.trim().to_string()), query).await
    }

    /// Whether a read of `kind` with `query` may use the cache at all.
    fn uses_cache(&self, kind: &FeedKind, query: &FeedQuery) -> bool {
        kind.is_cacheable()
            && query.is_first_page()
            && query.filter.is_none()
            && query.limit > 0
            && self.cache.is_enabled()
    }

    /// Reads one page of a feed.
    pub async fn get_feed(&self, kind: FeedKind, query: FeedQuery) -> MurmurResult<FeedPage> {
        let cacheable = self.uses_cache(&kind, &query);

        if cacheable {
            if let Some(entry) = self.cache.get_cached_feed(&kind).await {
                if let Some(page) = self.hydrate(&kind, &entry, query.limit).await {
                    return Ok(page);
                }
            }
        }

        // Taken before the read so an invalidation racing it wins.
        let ticket = self.cache.write_ticket();
        let page = self.read_source(&kind, query).await?;

        if cacheable && !page.posts.is_empty() {
            let cache = self.cache.clone();
            let posts = page.posts.clone();
            let total = page.total;
            let label = kind.label();
            self.populator.submit(label, async move {
                cache.populate(ticket, &kind, &posts, total).await.map(|_| ())
            });
        }

        Ok(page)
    }

    /// Builds a page from a cached entry, or `None` if it cannot be served
    /// whole.
    async fn hydrate(&self, kind: &FeedKind, entry: &CachedFeed, limit: usize) -> Option<FeedPage> {
        let ids = &entry.post_ids[..entry.post_ids.len().min(limit)];

        // The entry is shorter than the page while the feed says more exist.
        if ids.len() < limit && (ids.len() as u64) < entry.total {
            debug!(feed = %kind, cached = ids.len(), total = entry.total, "Cached entry too short for page");
            self.cache.record_partial_hit(kind);
            return None;
        }

        let cached = self.cache.get_cached_posts(ids).await;
        if !cached.is_complete() {
            debug!(feed = %kind, missing = cached.missing.len(), "Cached feed references uncached posts");
            self.cache.record_partial_hit(kind);
            return None;
        }

        let posts = cached.into_ordered(ids)?;
        Some(FeedPage::new(posts, entry.total))
    }

    async fn read_source(&self, kind: &FeedKind, query: FeedQuery) -> MurmurResult<FeedPage> {
        match kind {
            FeedKind::Home(user) => self.posts.home_feed(*user, query).await,
            FeedKind::Following(user) => self.posts.following_feed(*user, query).await,
            FeedKind::Explore => self.posts.explore_feed(query).await,
            FeedKind::Hashtag(tag) => self.posts.hashtag_feed(tag.clone(), query).await,
            FeedKind::Saved(user) => self.posts.saved_feed(*user, query).await,
            FeedKind::Search(term) => self.posts.search_posts(term.clone(), query).await,
        }
    }
}
