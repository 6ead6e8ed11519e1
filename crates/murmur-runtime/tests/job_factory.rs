use chrono::Utc;
use murmur_config::{CacheConfig, MaintenanceConfig, SchedulerConfig};
use murmur_core::testing::{CountingCleanupRepository, InMemoryPostRepository, InMemoryRelationshipRepository};
use murmur_core::{FeedKind, Post, PostAuthor, UserId};
use murmur_feed::{CacheKeys, FeedCacheService, InMemoryCache};
use murmur_jobs::{JobError, JobState, Scheduler};
use murmur_runtime::{JobFactory, Repositories};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

struct Fixture {
    posts: Arc<InMemoryPostRepository>,
    notifications: Arc<CountingCleanupRepository>,
    messages: Arc<CountingCleanupRepository>,
    cache: Arc<FeedCacheService>,
}

impl Fixture {
    fn new(cache: FeedCacheService) -> Self {
        Self {
            posts: Arc::new(InMemoryPostRepository::new()),
            notifications: Arc::new(CountingCleanupRepository::new(7).failing_first(1)),
            messages: Arc::new(CountingCleanupRepository::new(3)),
            cache: Arc::new(cache),
        }
    }

    fn with_memory_cache() -> Self {
        Self::new(FeedCacheService::new(
            Arc::new(InMemoryCache::new()),
            CacheKeys::new("jobs"),
            CacheConfig::default(),
        ))
    }

    fn repositories(&self) -> Repositories {
        Repositories {
            posts: self.posts.clone(),
            relationships: Arc::new(InMemoryRelationshipRepository::new()),
            notifications: self.notifications.clone(),
            messages: self.messages.clone(),
            statuses: Arc::new(CountingCleanupRepository::new(0)),
        }
    }

    fn factory(&self, config: MaintenanceConfig) -> JobFactory {
        JobFactory::new(self.repositories(), self.cache.clone(), config)
            .with_retry_delay(Duration::from_millis(10))
    }
}

fn posts(count: usize) -> Vec<Post> {
    let author = PostAuthor {
        id: UserId::new(),
        username: "linus".into(),
        display_name: None,
        avatar_url: None,
    };
    (0..count).map(|n| Post::new(author.clone(), format!("post {n}"))).collect()
}

fn job_names(scheduler: &Scheduler) -> Vec<String> {
    let mut names: Vec<String> = scheduler.list_jobs().into_iter().map(|job| job.name).collect();
    names.sort();
    names
}

#[tokio::test]
async fn registers_every_enabled_job() {
    let fixture = Fixture::with_memory_cache();
    let scheduler = Scheduler::new(SchedulerConfig::default());

    let registered = assert_ok!(fixture.factory(MaintenanceConfig::default()).register_all(&scheduler));

    assert_eq!(registered, 5);
    assert_eq!(
        job_names(&scheduler),
        vec![
            "explore_feed_warming",
            "hashtag_feed_warming",
            "message_cleanup",
            "notification_cleanup",
            "status_cleanup",
        ]
    );
    let status = scheduler.job_info("status_cleanup").unwrap();
    assert!(status.run_on_start);
    assert_eq!(status.interval, Duration::from_secs(3600));
    assert_eq!(status.max_attempts, 3);
}

#[tokio::test]
async fn disabled_jobs_and_warming_without_cache_are_skipped() {
    let fixture = Fixture::new(FeedCacheService::disabled());
    let scheduler = Scheduler::new(SchedulerConfig::default());
    let mut config = MaintenanceConfig::default();
    config.message_cleanup.enabled = false;

    let registered = assert_ok!(fixture.factory(config).register_all(&scheduler));

    assert_eq!(registered, 2);
    assert_eq!(job_names(&scheduler), vec!["notification_cleanup", "status_cleanup"]);
}

#[tokio::test]
async fn notification_cleanup_retries_and_uses_retention_cutoff() {
    let fixture = Fixture::with_memory_cache();
    let scheduler = Scheduler::new(SchedulerConfig::default());
    fixture.factory(MaintenanceConfig::default()).register_all(&scheduler).unwrap();

    let before = Utc::now();
    assert_ok!(scheduler.trigger_job("notification_cleanup").await);

    assert_eq!(fixture.notifications.calls(), 2);
    let cutoff = fixture.notifications.last_cutoff().unwrap();
    let age = before - cutoff;
    assert!(age >= chrono::Duration::days(30) - chrono::Duration::seconds(5));
    assert!(age <= chrono::Duration::days(30) + chrono::Duration::seconds(5));

    let info = scheduler.job_info("notification_cleanup").unwrap();
    assert_eq!(info.state, JobState::Succeeded);
}

#[tokio::test]
async fn message_cleanup_deletes_expired() {
    let fixture = Fixture::with_memory_cache();
    let scheduler = Scheduler::new(SchedulerConfig::default());
    fixture.factory(MaintenanceConfig::default()).register_all(&scheduler).unwrap();

    assert_ok!(scheduler.trigger_job("message_cleanup").await);
    assert_ok!(scheduler.trigger_job("message_cleanup").await);

    assert_eq!(fixture.messages.calls(), 2);
}

#[tokio::test]
async fn explore_warming_populates_cache() {
    let fixture = Fixture::with_memory_cache();
    let source = posts(30);
    fixture.posts.set_feed(FeedKind::Explore, source.clone());

    let scheduler = Scheduler::new(SchedulerConfig::default());
    let config = MaintenanceConfig {
        warm_page_size: 10,
        ..MaintenanceConfig::default()
    };
    fixture.factory(config).register_all(&scheduler).unwrap();

    assert_ok!(scheduler.trigger_job("explore_feed_warming").await);

    let entry = fixture.cache.get_cached_explore_feed().await.unwrap();
    let expected: Vec<_> = source[..10].iter().map(|p| p.id).collect();
    assert_eq!(entry.post_ids, expected);
    assert_eq!(entry.total, 30);
    assert!(fixture.cache.get_cached_posts(&expected).await.is_complete());
}

#[tokio::test]
async fn hashtag_warming_covers_configured_tags() {
    let fixture = Fixture::with_memory_cache();
    fixture.posts.set_feed(FeedKind::hashtag("rust"), posts(3));
    fixture.posts.set_feed(FeedKind::hashtag("tokio"), posts(2));

    let scheduler = Scheduler::new(SchedulerConfig::default());
    let config = MaintenanceConfig {
        warm_hashtags: vec!["#Rust".into(), "tokio".into(), "   ".into()],
        ..MaintenanceConfig::default()
    };
    fixture.factory(config).register_all(&scheduler).unwrap();

    assert_ok!(scheduler.trigger_job("hashtag_feed_warming").await);

    assert_eq!(fixture.cache.get_cached_hashtag_feed("rust").await.unwrap().post_ids.len(), 3);
    assert_eq!(fixture.cache.get_cached_hashtag_feed("tokio").await.unwrap().post_ids.len(), 2);
    assert_eq!(fixture.posts.calls("hashtag"), 2);
}

#[tokio::test]
async fn warming_failure_is_reported_after_retries() {
    let fixture = Fixture::with_memory_cache();
    fixture.posts.set_failing(true);

    let scheduler = Scheduler::new(SchedulerConfig::default());
    let config = MaintenanceConfig {
        warm_hashtags: vec!["rust".into()],
        ..MaintenanceConfig::default()
    };
    fixture.factory(config).register_all(&scheduler).unwrap();

    let result = scheduler.trigger_job("hashtag_feed_warming").await;

    assert!(matches!(result, Err(JobError::ExecutionFailed(_))));
    assert_eq!(fixture.posts.calls("hashtag"), 3);
    let info = scheduler.job_info("hashtag_feed_warming").unwrap();
    assert_eq!(info.state, JobState::Failed);
    assert!(info.last_error.unwrap().contains("1 of 1"));
}
