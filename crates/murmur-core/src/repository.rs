//! Collaborator traits implemented outside the feed engine.
//!
//! The SQL repositories live in the surrounding application; the engine only
//! depends on these capabilities.

use crate::{FeedPage, FeedQuery, MurmurResult, Page, PageRequest, RelationshipFilter, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shaku::Interface;

/// Source of truth for feed reads.
#[async_trait]
pub trait PostRepository: Interface + Send + Sync {
    /// Ranked home timeline for `user`.
    async fn home_feed(&self, user: UserId, query: FeedQuery) -> MurmurResult<FeedPage>;

    /// Chronological posts from accounts `user` follows.
    async fn following_feed(&self, user: UserId, query: FeedQuery) -> MurmurResult<FeedPage>;

    /// Global trending feed.
    async fn explore_feed(&self, query: FeedQuery) -> MurmurResult<FeedPage>;

    /// Posts tagged with a normalized hashtag.
    async fn hashtag_feed(&self, tag: String, query: FeedQuery) -> MurmurResult<FeedPage>;

    /// Posts bookmarked by `user`.
    async fn saved_feed(&self, user: UserId, query: FeedQuery) -> MurmurResult<FeedPage>;

    /// Full-text search over posts.
    async fn search_posts(&self, term: String, query: FeedQuery) -> MurmurResult<FeedPage>;
}

/// Follower graph access.
#[async_trait]
pub trait RelationshipRepository: Interface + Send + Sync {
    /// Lists the counterpart user IDs of `user`'s relationships.
    async fn list_relationships(
        &self,
        user: UserId,
        filter: RelationshipFilter,
        page: PageRequest,
    ) -> MurmurResult<Page<UserId>>;
}

/// Notification storage cleanup.
#[async_trait]
pub trait NotificationRepository: Interface + Send + Sync {
    /// Deletes read notifications created before `cutoff`. Idempotent.
    async fn delete_read_before(&self, cutoff: DateTime<Utc>) -> MurmurResult<u64>;
}

/// Direct message storage cleanup.
#[async_trait]
pub trait MessageRepository: Interface + Send + Sync {
    /// Deletes disappearing messages whose expiry is before `now`. Idempotent.
    async fn delete_expired(&self, now: DateTime<Utc>) -> MurmurResult<u64>;
}

/// Ephemeral status (story) storage cleanup.
#[async_trait]
pub trait StatusRepository: Interface + Send + Sync {
    /// Deletes statuses whose expiry is before `now`. Idempotent.
    async fn delete_expired(&self, now: DateTime<Utc>) -> MurmurResult<u64>;
}
