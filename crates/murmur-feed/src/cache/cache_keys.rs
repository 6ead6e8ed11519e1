//! Cache key generators for consistent key naming.

use murmur_core::{normalize_hashtag, FeedKind, PostId, UserId};

/// Builds namespaced cache keys.
///
/// Every key starts with the configured prefix followed by `:feed` or
/// `:post`, so one Redis instance can be shared between environments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeys {
    prefix: String,
}

impl Default for CacheKeys {
    fn default() -> Self {
        Self::new("murmur")
    }
}

impl CacheKeys {
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    /// Key of a user's home feed entry.
    #[must_use]
    pub fn home_feed(&self, user: UserId) -> String {
        format!("{}:feed:home:{}", self.prefix, user)
    }

    /// Key of the explore feed entry.
    #[must_use]
    pub fn explore_feed(&self) -> String {
        format!("{}:feed:explore", self.prefix)
    }

    /// Key of a hashtag feed entry. The tag is normalized first.
    #[must_use]
    pub fn hashtag_feed(&self, tag: &str) -> String {
        format!("{}:feed:hashtag:{}", self.prefix, normalize_hashtag(tag))
    }

    /// Key of a feed entry, or `None` for feeds that are never cached.
    #[must_use]
    pub fn feed(&self, kind: &FeedKind) -> Option<String> {
        match kind {
            FeedKind::Home(user) => Some(self.home_feed(*user)),
            FeedKind::Explore => Some(self.explore_feed()),
            FeedKind::Hashtag(tag) => Some(self.hashtag_feed(tag)),
            FeedKind::Following(_) | FeedKind::Saved(_) | FeedKind::Search(_) => None,
        }
    }

    /// Key of a cached post snapshot.
    #[must_use]
    pub fn post(&self, id: PostId) -> String {
        format!("{}:post:{}", self.prefix, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_home_feed_key() {
        let keys = CacheKeys::new("test");
        let user = UserId::new();
        assert_eq!(keys.home_feed(user), format!("test:feed:home:{user}"));
    }

    #[test]
    fn test_hashtag_key_is_normalized() {
        let keys = CacheKeys::default();
        assert_eq!(keys.hashtag_feed("#RustLang"), "murmur:feed:hashtag:rustlang");
        assert_eq!(keys.hashtag_feed("rustlang"), keys.hashtag_feed(" #RUSTLANG"));
    }

    #[test]
    fn test_uncached_feeds_have_no_key() {
        let keys = CacheKeys::default();
        assert!(keys.feed(&FeedKind::Saved(UserId::new())).is_none());
        assert!(keys.feed(&FeedKind::Search("rust".into())).is_none());
        assert_eq!(keys.feed(&FeedKind::Explore), Some("murmur:feed:explore".to_string()));
    }

    #[test]
    fn test_post_key() {
        let keys = CacheKeys::default();
        let id = PostId::new();
        assert!(keys.post(id).starts_with("murmur:post:"));
        assert!(keys.post(id).ends_with(&id.to_string()));
    }
}
