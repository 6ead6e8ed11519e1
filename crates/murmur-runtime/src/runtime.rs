//! Runtime assembly and lifecycle.

use crate::di::resolve_cache_backend;
use crate::job_factory::JobFactory;
use murmur_config::{AppConfig, ConfigValidator};
use murmur_core::{
    MessageRepository, MurmurError, MurmurResult, NotificationRepository, PostRepository,
    RelationshipRepository, StatusRepository,
};
use murmur_feed::{CacheKeys, CachePopulator, FeedCacheService, FeedInvalidator, FeedService};
use murmur_jobs::{InMemoryQueueProvider, QueueProvider, QueueWorkerPool, Scheduler, WorkerPoolConfig};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Collaborators implemented outside the workspace.
#[derive(Clone)]
pub struct Repositories {
    pub posts: Arc<dyn PostRepository>,
    pub relationships: Arc<dyn RelationshipRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub statuses: Arc<dyn StatusRepository>,
}

/// Every long-lived component of the feed engine, wired from configuration.
///
/// Build it inside a Tokio runtime: the cache populator spawns its workers
/// on construction.
pub struct Runtime {
    config: AppConfig,
    cache: Arc<FeedCacheService>,
    populator: Arc<CachePopulator>,
    feeds: Arc<FeedService>,
    invalidator: Arc<FeedInvalidator>,
    queue: Arc<InMemoryQueueProvider>,
    scheduler: Arc<Scheduler>,
    worker_pools: Mutex<Vec<Arc<QueueWorkerPool>>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl Runtime {
    /// Validates `config` and wires every component. Maintenance jobs are
    /// registered but nothing runs until [`Runtime::start`].
    pub fn build(config: AppConfig, repositories: Repositories) -> MurmurResult<Self> {
        ConfigValidator::validate(&config).map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            MurmurError::Configuration(messages.join("; "))
        })?;

        let backend = resolve_cache_backend(&config);
        let cache = Arc::new(FeedCacheService::new(
            backend,
            CacheKeys::new(config.redis.key_prefix.clone()),
            config.cache.clone(),
        ));
        let populator = Arc::new(CachePopulator::from_config(&config.cache));
        let feeds = Arc::new(FeedService::new(
            repositories.posts.clone(),
            cache.clone(),
            populator.clone(),
        ));
        let invalidator = Arc::new(
            FeedInvalidator::new(cache.clone(), repositories.relationships.clone())
                .with_page_size(config.cache.invalidation_batch_size),
        );
        let queue = Arc::new(InMemoryQueueProvider::from_config(&config.queue));
        let scheduler = Arc::new(Scheduler::new(config.scheduler.clone()));

        JobFactory::new(repositories, cache.clone(), config.maintenance.clone())
            .with_retry_delay(config.scheduler.default_retry_delay())
            .register_all(&scheduler)
            .map_err(|e| MurmurError::Configuration(e.to_string()))?;

        info!(
            app = %config.app.name,
            cache_enabled = cache.is_enabled(),
            jobs = scheduler.list_jobs().len(),
            "Runtime assembled"
        );

        Ok(Self {
            config,
            cache,
            populator,
            feeds,
            invalidator,
            queue,
            scheduler,
            worker_pools: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    /// Starts the scheduler unless it is disabled by configuration.
    pub fn start(&self) -> MurmurResult<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(MurmurError::Internal("Runtime is shut down".to_string()));
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(MurmurError::Internal("Runtime already started".to_string()));
        }

        if self.config.scheduler.enabled {
            self.scheduler
                .start()
                .map_err(|e| MurmurError::Internal(e.to_string()))?;
        } else {
            warn!("Scheduler disabled by configuration, maintenance jobs will not run");
        }

        info!("Runtime started");
        Ok(())
    }

    /// Creates a consumer pool on the runtime's queue provider. Register
    /// handlers, then call [`QueueWorkerPool::start`]; the runtime stops the
    /// pool on shutdown.
    pub fn worker_pool(&self, queue: &str) -> Arc<QueueWorkerPool> {
        let provider: Arc<dyn QueueProvider> = self.queue.clone();
        let pool = Arc::new(QueueWorkerPool::new(
            provider,
            queue,
            WorkerPoolConfig::from(&self.config.queue),
        ));
        self.worker_pools.lock().push(pool.clone());
        pool
    }

    /// Stops the scheduler, then the queue consumers, drains the populator
    /// and closes the queue provider. Idempotent.
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down runtime...");

        self.scheduler.shutdown().await;

        let pools: Vec<_> = self.worker_pools.lock().drain(..).collect();
        for pool in pools {
            pool.shutdown().await;
        }

        self.populator.shutdown(self.shutdown_timeout()).await;

        if let Err(e) = self.queue.close().await {
            warn!(error = %e, "Failed to close queue provider");
        }

        info!("Runtime shutdown complete");
    }

    fn shutdown_timeout(&self) -> Duration {
        self.config.scheduler.shutdown_timeout()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<FeedCacheService> {
        &self.cache
    }

    pub fn populator(&self) -> &Arc<CachePopulator> {
        &self.populator
    }

    pub fn feeds(&self) -> &Arc<FeedService> {
        &self.feeds
    }

    pub fn invalidator(&self) -> &Arc<FeedInvalidator> {
        &self.invalidator
    }

    pub fn queue(&self) -> &Arc<InMemoryQueueProvider> {
        &self.queue
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.stopped.load(Ordering::SeqCst)
    }
}
