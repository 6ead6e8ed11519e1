use crate::{Post, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The feeds a viewer can read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FeedKind {
    /// Personalized home timeline of a user.
    Home(UserId),
    /// Posts from accounts a user follows, unranked.
    Following(UserId),
    /// Global trending feed.
    Explore,
    /// Posts carrying a hashtag.
    Hashtag(String),
    /// Posts a user bookmarked.
    Saved(UserId),
    /// Full-text search results.
    Search(String),
}

impl FeedKind {
    /// Creates a hashtag feed kind with a normalized tag.
    #[must_use]
    pub fn hashtag(tag: &str) -> Self {
        Self::Hashtag(normalize_hashtag(tag))
    }

    /// Whether first pages of this feed are kept in the feed cache.
    #[must_use]
    pub const fn is_cacheable(&self) -> bool {
        matches!(self, Self::Home(_) | Self::Explore | Self::Hashtag(_))
    }

    /// Short label used in logs and metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Home(_) => "home",
            Self::Following(_) => "following",
            Self::Explore => "explore",
            Self::Hashtag(_) => "hashtag",
            Self::Saved(_) => "saved",
            Self::Search(_) => "search",
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Home(user) => write!(f, "home:{user}"),
            Self::Following(user) => write!(f, "following:{user}"),
            Self::Explore => write!(f, "explore"),
            Self::Hashtag(tag) => write!(f, "hashtag:{tag}"),
            Self::Saved(user) => write!(f, "saved:{user}"),
            Self::Search(term) => write!(f, "search:{term}"),
        }
    }
}

/// Strips a leading `#`, trims and lowercases a hashtag.
#[must_use]
pub fn normalize_hashtag(tag: &str) -> String {
    tag.trim().trim_start_matches('#').to_lowercase()
}

/// Parameters of a feed read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedQuery {
    /// The user reading the feed, if authenticated.
    pub viewer: Option<UserId>,
    pub limit: usize,
    pub offset: usize,
    /// Optional content filter (e.g. "media"), interpreted by the repository.
    pub filter: Option<String>,
}

impl FeedQuery {
    /// Creates a query for the first page.
    #[must_use]
    pub const fn first_page(viewer: Option<UserId>, limit: usize) -> Self {
        Self {
            viewer,
            limit,
            offset: 0,
            filter: None,
        }
    }

    #[must_use]
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// True for the head of the result set, the only page eligible for caching.
    #[must_use]
    pub const fn is_first_page(&self) -> bool {
        self.offset == 0
    }
}

/// A page of feed posts plus the total size of the feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedPage {
    pub posts: Vec<Post>,
    pub total: u64,
}

impl FeedPage {
    #[must_use]
    pub const fn new(posts: Vec<Post>, total: u64) -> Self {
        Self { posts, total }
    }
}
