//! In-memory collaborator implementations for tests.
//!
//! Enabled with the `testing` feature. Every fake counts its calls and can be
//! switched into a failing mode to exercise fallback paths.

use crate::{
    FeedKind, FeedPage, FeedQuery, MessageRepository, MurmurError, MurmurResult,
    NotificationRepository, Page, PageRequest, Post, PostRepository, RelationshipDirection,
    RelationshipFilter, RelationshipKind, RelationshipRepository, StatusRepository, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// Post store holding one ordered post list per feed.
#[derive(Default)]
pub struct InMemoryPostRepository {
    feeds: RwLock<HashMap<FeedKind, Vec<Post>>>,
    calls: RwLock<HashMap<&'static str, usize>>,
    failing: AtomicBool,
}

impl InMemoryPostRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the ordered contents of a feed.
    pub fn set_feed(&self, kind: FeedKind, posts: Vec<Post>) {
        self.feeds.write().insert(kind, posts);
    }

    /// Replaces a post wherever it appears.
    pub fn update_post(&self, post: &Post) {
        for posts in self.feeds.write().values_mut() {
            for existing in posts.iter_mut().filter(|p| p.id == post.id) {
                *existing = post.clone();
            }
        }
    }

    /// Makes every read fail with a database error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of reads served for a feed label ("home", "explore", ...).
    #[must_use]
    pub fn calls(&self, label: &str) -> usize {
        self.calls.read().get(label).copied().unwrap_or(0)
    }

    /// Number of reads served across all feeds.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.calls.read().values().sum()
    }

    fn read(&self, kind: &FeedKind, query: &FeedQuery) -> MurmurResult<FeedPage> {
        *self.calls.write().entry(kind.label()).or_insert(0) += 1;

        if self.failing.load(Ordering::SeqCst) {
            return Err(MurmurError::database("post store unavailable"));
        }

        let feeds = self.feeds.read();
        let posts = feeds.get(kind).map(Vec::as_slice).unwrap_or_default();
        let page = posts
            .iter()
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect();

        Ok(FeedPage::new(page, posts.len() as u64))
    }
}

#[async_trait]
impl PostRepository for InMemoryPostRepository {
    async fn home_feed(&self, user: UserId, query: FeedQuery) -> MurmurResult<FeedPage> {
        self.read(&FeedKind::Home(user), &query)
    }

    async fn following_feed(&self, user: UserId, query: FeedQuery) -> MurmurResult<FeedPage> {
        self.read(&FeedKind::Following(user), &query)
    }

    async fn explore_feed(&self, query: FeedQuery) -> MurmurResult<FeedPage> {
        self.read(&FeedKind::Explore, &query)
    }

    async fn hashtag_feed(&self, tag: String, query: FeedQuery) -> MurmurResult<FeedPage> {
        self.read(&FeedKind::Hashtag(tag), &query)
    }

    async fn saved_feed(&self, user: UserId, query: FeedQuery) -> MurmurResult<FeedPage> {
        self.read(&FeedKind::Saved(user), &query)
    }

    async fn search_posts(&self, term: String, query: FeedQuery) -> MurmurResult<FeedPage> {
        self.read(&FeedKind::Search(term), &query)
    }
}

/// Follow graph kept as `followee -> followers`.
#[derive(Default)]
pub struct InMemoryRelationshipRepository {
    followers: RwLock<HashMap<UserId, Vec<UserId>>>,
    page_calls: AtomicUsize,
}

impl InMemoryRelationshipRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `follower` follows `user`.
    pub fn add_follower(&self, user: UserId, follower: UserId) {
        self.followers.write().entry(user).or_default().push(follower);
    }

    /// Number of pages served so far.
    #[must_use]
    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelationshipRepository for InMemoryRelationshipRepository {
    async fn list_relationships(
        &self,
        user: UserId,
        filter: RelationshipFilter,
        page: PageRequest,
    ) -> MurmurResult<Page<UserId>> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);

        if filter.kind != RelationshipKind::Follow {
            return Ok(Page::empty(page));
        }

        let graph = self.followers.read();
        let ids: Vec<UserId> = match filter.direction {
            RelationshipDirection::Incoming => graph.get(&user).cloned().unwrap_or_default(),
            RelationshipDirection::Outgoing => graph
                .iter()
                .filter(|(_, followers)| followers.contains(&user))
                .map(|(followee, _)| *followee)
                .collect(),
        };

        let total = ids.len() as u64;
        let content = ids.into_iter().skip(page.offset).take(page.limit).collect();
        Ok(Page::new(content, page, total))
    }
}

/// Cleanup repository that reports a fixed number of deleted rows.
///
/// Implements every cleanup trait so one instance can back all maintenance
/// jobs. The first `failures` calls fail with a database error.
#[derive(Default)]
pub struct CountingCleanupRepository {
    deleted_per_call: u64,
    failures: AtomicU64,
    calls: AtomicUsize,
    last_cutoff: RwLock<Option<DateTime<Utc>>>,
}

impl CountingCleanupRepository {
    #[must_use]
    pub fn new(deleted_per_call: u64) -> Self {
        Self {
            deleted_per_call,
            ..Self::default()
        }
    }

    /// Fails the next `count` calls.
    #[must_use]
    pub fn failing_first(self, count: u64) -> Self {
        self.failures.store(count, Ordering::SeqCst);
        self
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The cutoff passed to the most recent call.
    #[must_use]
    pub fn last_cutoff(&self) -> Option<DateTime<Utc>> {
        *self.last_cutoff.read()
    }

    fn cleanup(&self, cutoff: DateTime<Utc>) -> MurmurResult<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_cutoff.write() = Some(cutoff);

        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(MurmurError::database("cleanup failed"));
        }
        Ok(self.deleted_per_call)
    }
}

#[async_trait]
impl NotificationRepository for CountingCleanupRepository {
    async fn delete_read_before(&self, cutoff: DateTime<Utc>) -> MurmurResult<u64> {
        self.cleanup(cutoff)
    }
}

#[async_trait]
impl MessageRepository for CountingCleanupRepository {
    async fn delete_expired(&self, now: DateTime<Utc>) -> MurmurResult<u64> {
        self.cleanup(now)
    }
}

#[async_trait]
impl StatusRepository for CountingCleanupRepository {
    async fn delete_expired(&self, now: DateTime<Utc>) -> MurmurResult<u64> {
        self.cleanup(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PostAuthor;

    fn post(n: u32) -> Post {
        Post::new(
            PostAuthor {
                id: UserId::new(),
                username: format!("user{n}"),
                display_name: None,
                avatar_url: None,
            },
            format!("post {n}"),
        )
    }

    #[tokio::test]
    async fn test_post_repository_pages() {
        let repo = InMemoryPostRepository::new();
        repo.set_feed(FeedKind::Explore, (0..5).map(post).collect());

        let page = repo
            .explore_feed(FeedQuery::first_page(None, 2).with_offset(2))
            .await
            .unwrap();

        assert_eq!(page.total, 5);
        assert_eq!(page.posts.len(), 2);
        assert_eq!(page.posts[0].content, "post 2");
        assert_eq!(repo.calls("explore"), 1);
    }

    #[tokio::test]
    async fn test_relationship_directions() {
        let repo = InMemoryRelationshipRepository::new();
        let (alice, bob) = (UserId::new(), UserId::new());
        repo.add_follower(alice, bob);

        let followers = repo
            .list_relationships(alice, RelationshipFilter::followers(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(followers.content, vec![bob]);

        let following = repo
            .list_relationships(bob, RelationshipFilter::following(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(following.content, vec![alice]);
    }

    #[tokio::test]
    async fn test_cleanup_fails_first_calls() {
        let repo = CountingCleanupRepository::new(7).failing_first(1);
        assert!(NotificationRepository::delete_read_before(&repo, Utc::now()).await.is_err());
        assert_eq!(NotificationRepository::delete_read_before(&repo, Utc::now()).await.unwrap(), 7);
        assert_eq!(repo.calls(), 2);
    }
}
