use murmur_config::CacheConfig;
use murmur_core::testing::{InMemoryPostRepository, InMemoryRelationshipRepository};
use murmur_core::{EngagementCounter, FeedKind, FeedQuery, Post, PostAuthor, UserId};
use murmur_feed::{CacheKeys, CachePopulator, FeedCacheService, FeedInvalidator, FeedService, InMemoryCache};
use std::sync::Arc;

fn cache() -> Arc<FeedCacheService> {
    Arc::new(FeedCacheService::new(
        Arc::new(InMemoryCache::new()),
        CacheKeys::new("test"),
        CacheConfig::default(),
    ))
}

fn post_by(author: UserId) -> Post {
    Post::new(
        PostAuthor {
            id: author,
            username: "ada".into(),
            display_name: None,
            avatar_url: None,
        },
        "hello",
    )
}

#[tokio::test]
async fn new_post_clears_home_feeds_of_all_followers() {
    let cache = cache();
    let relationships = Arc::new(InMemoryRelationshipRepository::new());
    let author = UserId::new();
    let existing = post_by(author);

    let followers: Vec<UserId> = (0..1500).map(|_| UserId::new()).collect();
    for follower in &followers {
        relationships.add_follower(author, *follower);
        cache.warm_user_feed(*follower, std::slice::from_ref(&existing), 1).await.unwrap();
    }
    cache.warm_user_feed(author, std::slice::from_ref(&existing), 1).await.unwrap();

    let invalidator = FeedInvalidator::new(cache.clone(), relationships.clone()).with_page_size(500);
    let invalidated = invalidator.on_post_created(post_by(author).id, author).await.unwrap();

    assert_eq!(invalidated, 1501);
    assert_eq!(relationships.page_calls(), 3);
    assert!(cache.get_cached_home_feed(author).await.is_none());
    for follower in &followers {
        assert!(cache.get_cached_home_feed(*follower).await.is_none());
    }
}

#[tokio::test]
async fn unrelated_home_feeds_survive_post_changes() {
    let cache = cache();
    let relationships = Arc::new(InMemoryRelationshipRepository::new());
    let (author, follower, stranger) = (UserId::new(), UserId::new(), UserId::new());
    relationships.add_follower(author, follower);

    let post = post_by(author);
    for user in [follower, stranger] {
        cache.warm_user_feed(user, std::slice::from_ref(&post), 1).await.unwrap();
    }

    let invalidator = FeedInvalidator::new(cache.clone(), relationships);
    invalidator.on_post_updated(post.id, author).await.unwrap();

    assert!(cache.get_cached_home_feed(follower).await.is_none());
    assert!(cache.get_cached_home_feed(stranger).await.is_some());
}

#[tokio::test]
async fn deleted_post_is_reported_missing() {
    let cache = cache();
    let author = UserId::new();
    let post = post_by(author);
    cache.cache_post(&post).await.unwrap();

    let invalidator = FeedInvalidator::new(cache.clone(), Arc::new(InMemoryRelationshipRepository::new()));
    let invalidated = invalidator.on_post_deleted(post.id, author).await.unwrap();

    assert_eq!(invalidated, 1);
    assert_eq!(cache.get_cached_posts(&[post.id]).await.missing, vec![post.id]);
}

#[tokio::test]
async fn follow_change_clears_only_the_actor() {
    let cache = cache();
    let (actor, other) = (UserId::new(), UserId::new());
    let post = post_by(other);
    for user in [actor, other] {
        cache.warm_user_feed(user, std::slice::from_ref(&post), 1).await.unwrap();
    }

    let invalidator = FeedInvalidator::new(cache.clone(), Arc::new(InMemoryRelationshipRepository::new()));
    invalidator.on_follow_changed(actor).await.unwrap();

    assert!(cache.get_cached_home_feed(actor).await.is_none());
    assert!(cache.get_cached_home_feed(other).await.is_some());
}

#[tokio::test]
async fn engagement_patches_cached_post_only_when_present() {
    let cache = cache();
    let post = post_by(UserId::new());
    let invalidator = FeedInvalidator::new(cache.clone(), Arc::new(InMemoryRelationshipRepository::new()));

    assert!(!invalidator.on_engagement(post.id, EngagementCounter::Comments, 1).await.unwrap());

    cache.cache_post(&post).await.unwrap();
    assert!(invalidator.on_engagement(post.id, EngagementCounter::Comments, 2).await.unwrap());
    assert!(invalidator.on_engagement(post.id, EngagementCounter::Comments, -5).await.unwrap());

    let cached = cache.get_cached_posts(&[post.id]).await;
    assert_eq!(cached.found[&post.id].comment_count, 0);
}

#[tokio::test]
async fn read_after_invalidation_reflects_new_post() {
    let cache = cache();
    let repo = Arc::new(InMemoryPostRepository::new());
    let relationships = Arc::new(InMemoryRelationshipRepository::new());
    let populator = Arc::new(CachePopulator::new(1, 16));
    let service = FeedService::new(repo.clone(), cache.clone(), populator.clone());
    let invalidator = FeedInvalidator::new(cache.clone(), relationships.clone());

    let (author, viewer) = (UserId::new(), UserId::new());
    relationships.add_follower(author, viewer);
    let old = post_by(author);
    repo.set_feed(FeedKind::Home(viewer), vec![old.clone()]);

    let query = FeedQuery::first_page(Some(viewer), 10);
    service.home_feed(viewer, query.clone()).await.unwrap();
    populator.wait_idle().await;

    let new = post_by(author);
    repo.set_feed(FeedKind::Home(viewer), vec![new.clone(), old.clone()]);
    invalidator.on_post_created(new.id, author).await.unwrap();

    let page = service.home_feed(viewer, query).await.unwrap();
    assert_eq!(page.posts[0].id, new.id);
    assert_eq!(page.total, 2);
    assert_eq!(repo.calls("home"), 2);
}

#[tokio::test]
async fn disabled_cache_skips_follower_lookup() {
    let relationships = Arc::new(InMemoryRelationshipRepository::new());
    let author = UserId::new();
    relationships.add_follower(author, UserId::new());

    let invalidator = FeedInvalidator::new(Arc::new(FeedCacheService::disabled()), relationships.clone());
    let invalidated = invalidator.on_post_created(post_by(author).id, author).await.unwrap();

    assert_eq!(invalidated, 0);
    assert_eq!(relationships.page_calls(), 0);
}
