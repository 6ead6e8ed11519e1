//! Cache invalidation triggered by post and relationship mutations.

use crate::feed_cache::FeedCacheService;
use murmur_core::{
    EngagementCounter, MurmurResult, PageRequest, PostId, RelationshipFilter, RelationshipRepository,
    UserId,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Number of followers fetched per relationship page.
pub const DEFAULT_FOLLOWER_PAGE_SIZE: usize = 500;

/// Invalidation hooks for mutation handlers.
///
/// Call these after the mutation is committed. Errors are returned so the
/// caller decides whether to log or retry; nothing here is fatal to the
/// request that triggered it.
pub struct FeedInvalidator {
    cache: Arc<FeedCacheService>,
    relationships: Arc<dyn RelationshipRepository>,
    page_size: usize,
}

impl FeedInvalidator {
    pub fn new(cache: Arc<FeedCacheService>, relationships: Arc<dyn RelationshipRepository>) -> Self {
        Self {
            cache,
            relationships,
            page_size: DEFAULT_FOLLOWER_PAGE_SIZE,
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, PageRequest::MAX_LIMIT);
        self
    }

    pub async fn on_post_created(&self, post_id: PostId, author: UserId) -> MurmurResult<u64> {
        self.on_post_changed(post_id, author, "created").await
    }

    pub async fn on_post_updated(&self, post_id: PostId, author: UserId) -> MurmurResult<u64> {
        self.on_post_changed(post_id, author, "updated").await
    }

    pub async fn on_post_deleted(&self, post_id: PostId, author: UserId) -> MurmurResult<u64> {
        self.on_post_changed(post_id, author, "deleted").await
    }

    /// Drops the post and the home feeds of its author and every accepted
    /// follower. Returns the number of home feeds invalidated.
    async fn on_post_changed(&self, post_id: PostId, author: UserId, change: &'static str) -> MurmurResult<u64> {
        if !self.cache.is_enabled() {
            return Ok(0);
        }

        self.cache.invalidate_post(post_id).await?;
        self.cache.invalidate_home_feed(author).await?;

        let mut invalidated = 1;
        let mut request = PageRequest::first(self.page_size);
        loop {
            let page = self
                .relationships
                .list_relationships(author, RelationshipFilter::followers(), request)
                .await?;

            if !page.is_empty() {
                self.cache.invalidate_follower_feeds(&page.content).await?;
                invalidated += page.len() as u64;
            }

            if !page.has_next() {
                break;
            }
            request = request.next();
        }

        info!(post_id = %post_id, author_id = %author, change, home_feeds = invalidated, "Invalidated feeds for post change");
        Ok(invalidated)
    }

    /// The acting user's home feed composition changed.
    pub async fn on_follow_changed(&self, actor: UserId) -> MurmurResult<()> {
        self.cache.invalidate_home_feed(actor).await?;
        debug!(user_id = %actor, "Invalidated home feed after follow change");
        Ok(())
    }

    /// Likes, comments, shares and views patch the cached post in place.
    pub async fn on_engagement(&self, post_id: PostId, counter: EngagementCounter, delta: i64) -> MurmurResult<bool> {
        self.cache.update_post_engagement(post_id, counter, delta).await
    }
}
