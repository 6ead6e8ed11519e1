use crate::{PostId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Author details denormalized into a post snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostAuthor {
    pub id: UserId,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Denormalized post snapshot.
///
/// Carries everything needed to render a feed item without touching the
/// relational store, which is why it is the unit stored in the post cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub author: PostAuthor,
    pub content: String,
    #[serde(default)]
    pub media_urls: Vec<String>,
    #[serde(default)]
    pub hashtags: Vec<String>,
    pub like_count: u64,
    pub comment_count: u64,
    pub share_count: u64,
    pub view_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    /// Creates a post with zeroed counters.
    #[must_use]
    pub fn new(author: PostAuthor, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: PostId::new(),
            author,
            content: content.into(),
            media_urls: Vec::new(),
            hashtags: Vec::new(),
            like_count: 0,
            comment_count: 0,
            share_count: 0,
            view_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the current value of an engagement counter.
    #[must_use]
    pub const fn counter(&self, counter: EngagementCounter) -> u64 {
        match counter {
            EngagementCounter::Likes => self.like_count,
            EngagementCounter::Comments => self.comment_count,
            EngagementCounter::Shares => self.share_count,
            EngagementCounter::Views => self.view_count,
        }
    }

    /// Adjusts an engagement counter by `delta`, saturating at zero.
    pub fn apply_engagement(&mut self, counter: EngagementCounter, delta: i64) {
        let slot = match counter {
            EngagementCounter::Likes => &mut self.like_count,
            EngagementCounter::Comments => &mut self.comment_count,
            EngagementCounter::Shares => &mut self.share_count,
            EngagementCounter::Views => &mut self.view_count,
        };
        *slot = if delta >= 0 {
            slot.saturating_add(delta.unsigned_abs())
        } else {
            slot.saturating_sub(delta.unsigned_abs())
        };
    }
}

/// Engagement counters that can be patched in place on a cached post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementCounter {
    Likes,
    Comments,
    Shares,
    Views,
}

impl fmt::Display for EngagementCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Likes => write!(f, "likes"),
            Self::Comments => write!(f, "comments"),
            Self::Shares => write!(f, "shares"),
            Self::Views => write!(f, "views"),
        }
    }
}
