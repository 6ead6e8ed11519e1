//! Maintenance jobs registered with the scheduler.
//!
//! | Job                    | Work                                              |
//! |------------------------|---------------------------------------------------|
//! | `notification_cleanup` | delete read notifications past the retention      |
//! | `message_cleanup`      | delete expired messages                           |
//! | `status_cleanup`       | delete expired statuses                           |
//! | `explore_feed_warming` | read the explore feed and populate the cache      |
//! | `hashtag_feed_warming` | same for every configured hashtag                 |

use crate::runtime::Repositories;
use chrono::Utc;
use murmur_config::{JobSchedule, MaintenanceConfig};
use murmur_core::{normalize_hashtag, FeedKind, FeedQuery, MurmurResult, PostRepository};
use murmur_feed::FeedCacheService;
use murmur_jobs::{JobError, JobResult, ScheduledJob, Scheduler};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Delay between retries when none is configured.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Builds the maintenance jobs from injected collaborators.
pub struct JobFactory {
    repositories: Repositories,
    cache: Arc<FeedCacheService>,
    config: MaintenanceConfig,
    retry_delay: Duration,
}

impl JobFactory {
    pub fn new(repositories: Repositories, cache: Arc<FeedCacheService>, config: MaintenanceConfig) -> Self {
        Self {
            repositories,
            cache,
            config,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Registers every enabled job. Warming jobs are skipped while the feed
    /// cache is disabled. Returns the number of jobs registered.
    pub fn register_all(&self, scheduler: &Scheduler) -> JobResult<usize> {
        let mut registered = 0;

        for (name, schedule) in self.config.schedules() {
            if !schedule.enabled {
                info!(job_name = name, "Maintenance job disabled by configuration");
                continue;
            }

            let job = match name {
                "notification_cleanup" => self.notification_cleanup(schedule),
                "message_cleanup" => self.message_cleanup(schedule),
                "status_cleanup" => self.status_cleanup(schedule),
                "explore_feed_warming" | "hashtag_feed_warming" if !self.cache.is_enabled() => {
                    info!(job_name = name, "Feed cache disabled, skipping warming job");
                    continue;
                }
                "explore_feed_warming" => self.explore_feed_warming(schedule),
                "hashtag_feed_warming" => self.hashtag_feed_warming(schedule),
                other => {
                    return Err(JobError::Configuration(format!("Unknown maintenance job: {other}")));
                }
            };

            scheduler.register_job(job)?;
            registered += 1;
        }

        info!(jobs = registered, "Registered maintenance jobs");
        Ok(registered)
    }

    fn schedule(&self, job: ScheduledJob, schedule: &JobSchedule) -> ScheduledJob {
        job.retry(schedule.retry_count, self.retry_delay)
            .run_on_start(schedule.run_on_start)
    }

    fn notification_cleanup(&self, schedule: &JobSchedule) -> ScheduledJob {
        let repo = self.repositories.notifications.clone();
        let retention = chrono::Duration::days(i64::from(self.config.notification_retention_days));

        let job = ScheduledJob::new("notification_cleanup", schedule.interval(), move |token| {
            let repo = repo.clone();
            async move {
                let cutoff = Utc::now() - retention;
                let deleted = cancellable(&token, repo.delete_read_before(cutoff)).await?;
                info!(deleted, cutoff = %cutoff, "Deleted read notifications");
                Ok(())
            }
        });
        self.schedule(job, schedule)
    }

    fn message_cleanup(&self, schedule: &JobSchedule) -> ScheduledJob {
        let repo = self.repositories.messages.clone();

        let job = ScheduledJob::new("message_cleanup", schedule.interval(), move |token| {
            let repo = repo.clone();
            async move {
                let deleted = cancellable(&token, repo.delete_expired(Utc::now())).await?;
                info!(deleted, "Deleted expired messages");
                Ok(())
            }
        });
        self.schedule(job, schedule)
    }

    fn status_cleanup(&self, schedule: &JobSchedule) -> ScheduledJob {
        let repo = self.repositories.statuses.clone();

        let job = ScheduledJob::new("status_cleanup", schedule.interval(), move |token| {
            let repo = repo.clone();
            async move {
                let deleted = cancellable(&token, repo.delete_expired(Utc::now())).await?;
                info!(deleted, "Deleted expired statuses");
                Ok(())
            }
        });
        self.schedule(job, schedule)
    }

    fn explore_feed_warming(&self, schedule: &JobSchedule) -> ScheduledJob {
        let posts = self.repositories.posts.clone();
        let cache = self.cache.clone();
        let page_size = self.config.warm_page_size;

        let job = ScheduledJob::new("explore_feed_warming", schedule.interval(), move |token| {
            let posts = posts.clone();
            let cache = cache.clone();
            async move {
                let written = warm_feed(&token, &*posts, &cache, FeedKind::Explore, page_size).await?;
                info!(written, "Warmed explore feed");
                Ok(())
            }
        });
        self.schedule(job, schedule)
    }

    fn hashtag_feed_warming(&self, schedule: &JobSchedule) -> ScheduledJob {
        let posts = self.repositories.posts.clone();
        let cache = self.cache.clone();
        let page_size = self.config.warm_page_size;
        let tags: Arc<Vec<String>> = Arc::new(
            self.config
                .warm_hashtags
                .iter()
                .map(|tag| normalize_hashtag(tag))
                .filter(|tag| !tag.is_empty())
                .collect(),
        );

        let job = ScheduledJob::new("hashtag_feed_warming", schedule.interval(), move |token| {
            let posts = posts.clone();
            let cache = cache.clone();
            let tags = tags.clone();
            async move {
                let mut failed = 0;
                for tag in tags.iter() {
                    match warm_feed(&token, &*posts, &cache, FeedKind::Hashtag(tag.clone()), page_size).await {
                        Ok(written) => debug!(hashtag = %tag, written, "Warmed hashtag feed"),
                        Err(JobError::Cancelled) => return Err(JobError::Cancelled),
                        Err(e) => {
                            warn!(hashtag = %tag, error = %e, "Failed to warm hashtag feed");
                            failed += 1;
                        }
                    }
                }

                if failed > 0 {
                    return Err(JobError::ExecutionFailed(format!(
                        "{failed} of {} hashtag feeds failed to warm",
                        tags.len()
                    )));
                }
                info!(hashtags = tags.len(), "Warmed hashtag feeds");
                Ok(())
            }
        });
        self.schedule(job, schedule)
    }
}

/// Reads the first page of `kind` and writes it to the cache. Returns whether
/// the feed entry was written.
async fn warm_feed(
    token: &CancellationToken,
    posts: &dyn PostRepository,
    cache: &FeedCacheService,
    kind: FeedKind,
    page_size: usize,
) -> JobResult<bool> {
    let ticket = cache.write_ticket();
    let query = FeedQuery::first_page(None, page_size);

    let page = match &kind {
        FeedKind::Hashtag(tag) => cancellable(token, posts.hashtag_feed(tag.clone(), query)).await?,
        _ => cancellable(token, posts.explore_feed(query)).await?,
    };

    if page.posts.is_empty() {
        debug!(feed = %kind, "Nothing to warm");
        return Ok(false);
    }

    Ok(cache.populate(ticket, &kind, &page.posts, page.total).await?)
}

/// Runs a collaborator call unless the job token fires first.
async fn cancellable<T, F>(token: &CancellationToken, call: F) -> JobResult<T>
where
    F: Future<Output = MurmurResult<T>>,
{
    tokio::select! {
        biased;
        () = token.cancelled() => Err(JobError::Cancelled),
        result = call => Ok(result?),
    }
}
